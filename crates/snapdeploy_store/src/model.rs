//! Shapes exchanged between the deployment engine and the live store.
//!
//! The live store is a richly typed graph. The engine only cares about a
//! closed set of export-relevant shapes ([`NodeKind`]); everything else a
//! node carries travels in its attribute bag.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute bag for declared dynamic fields.
pub type Attributes = BTreeMap<String, Value>;

/// Identifier of a node, principal or record in the live store.
///
/// Identifiers are not stable across environments; the engine only
/// preserves them when re-creating exported nodes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Creates an identifier from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The export-relevant node shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A page (structural content).
    Page,
    /// A shared component reused by pages.
    SharedComponent,
    /// A markup template.
    Template,
    /// A binary file.
    File,
    /// A folder in the virtual file system.
    Folder,
    /// A site grouping pages under a hostname.
    Site,
    /// A routing path pointing at a page.
    PagePath,
    /// A parameter mapping of an event action.
    ParameterMapping,
    /// An event action mapping.
    ActionMapping,
    /// A reusable widget.
    Widget,
    /// A localized string.
    Localization,
    /// A mail template.
    MailTemplate,
    /// Arbitrary application configuration data.
    ApplicationConfigurationData,
    /// A CORS rule.
    CorsSetting,
    /// A resource access grant.
    ResourceAccess,
    /// A schema-level permission grant.
    SchemaGrant,
}

impl NodeKind {
    /// Every kind, in a stable order.
    pub const ALL: [NodeKind; 16] = [
        NodeKind::Page,
        NodeKind::SharedComponent,
        NodeKind::Template,
        NodeKind::File,
        NodeKind::Folder,
        NodeKind::Site,
        NodeKind::PagePath,
        NodeKind::ParameterMapping,
        NodeKind::ActionMapping,
        NodeKind::Widget,
        NodeKind::Localization,
        NodeKind::MailTemplate,
        NodeKind::ApplicationConfigurationData,
        NodeKind::CorsSetting,
        NodeKind::ResourceAccess,
        NodeKind::SchemaGrant,
    ];

    /// The attribute holding the natural lookup key of this kind.
    #[must_use]
    pub fn key_attribute(self) -> &'static str {
        match self {
            NodeKind::File | NodeKind::Folder => "path",
            NodeKind::ResourceAccess => "signature",
            NodeKind::CorsSetting => "requestUri",
            NodeKind::SchemaGrant => "schemaType",
            NodeKind::ApplicationConfigurationData => "configName",
            _ => "name",
        }
    }

    /// Returns true for pages, shared components and templates.
    #[must_use]
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            NodeKind::Page | NodeKind::SharedComponent | NodeKind::Template
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Visibility flags carried by every node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visibility {
    /// Visible to anonymous users.
    pub public: bool,
    /// Visible to authenticated users.
    pub authenticated: bool,
}

impl Visibility {
    /// Creates a visibility value.
    #[must_use]
    pub const fn new(public: bool, authenticated: bool) -> Self {
        Self {
            public,
            authenticated,
        }
    }
}

/// An action a grantee may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    /// Read access.
    Read,
    /// Write access.
    Write,
    /// Delete access.
    Delete,
    /// Permission to change access control.
    AccessControl,
}

impl Permission {
    /// Returns the wire name of the permission.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Delete => "delete",
            Permission::AccessControl => "accessControl",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(Permission::Read),
            "write" => Some(Permission::Write),
            "delete" => Some(Permission::Delete),
            "accessControl" => Some(Permission::AccessControl),
            _ => None,
        }
    }
}

/// A permission grant on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// The principal receiving the grant.
    pub principal: NodeId,
    /// The allowed actions.
    pub permissions: Vec<Permission>,
}

/// Whether a principal is a user or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalKind {
    /// A single user.
    User,
    /// A group of users.
    Group,
}

/// An identity able to own content or receive grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Identifier in the live store.
    pub id: NodeId,
    /// Name; the only cross-environment portable key.
    pub name: String,
    /// User or group.
    pub kind: PrincipalKind,
}

/// A node as read from the live store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNode {
    /// Identifier.
    pub id: NodeId,
    /// Shape of the node.
    pub kind: NodeKind,
    /// Visibility flags.
    pub visibility: Visibility,
    /// Owning principal, if any.
    pub owner: Option<NodeId>,
    /// Permission grants.
    pub grants: Vec<Grant>,
    /// Dynamic attributes.
    pub attributes: Attributes,
    /// Side-car content (markup, template body, mail body).
    pub body: Option<String>,
}

impl StoredNode {
    /// Returns a string attribute.
    #[must_use]
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Returns the natural key of this node (name, path, ...).
    #[must_use]
    pub fn natural_key(&self) -> Option<&str> {
        self.attr_str(self.kind.key_attribute())
    }
}

/// Payload for creating or updating a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    /// Identifier to preserve; the store assigns one when absent.
    pub id: Option<NodeId>,
    /// Shape of the node.
    pub kind: NodeKind,
    /// Visibility flags.
    pub visibility: Visibility,
    /// Owning principal.
    pub owner: Option<NodeId>,
    /// Permission grants.
    pub grants: Vec<Grant>,
    /// Dynamic attributes.
    pub attributes: Attributes,
    /// Side-car content.
    pub body: Option<String>,
}

impl NewNode {
    /// Creates an empty payload of the given kind.
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: None,
            kind,
            visibility: Visibility::default(),
            owner: None,
            grants: Vec::new(),
            attributes: Attributes::new(),
            body: None,
        }
    }

    /// Sets the identifier to preserve.
    #[must_use]
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Sets the visibility flags.
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: NodeId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Adds a grant.
    #[must_use]
    pub fn with_grant(mut self, principal: NodeId, permissions: Vec<Permission>) -> Self {
        self.grants.push(Grant {
            principal,
            permissions,
        });
        self
    }

    /// Sets the side-car body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A record of an arbitrary user-defined type (data-only deployments).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Identifier.
    pub id: NodeId,
    /// Declared type name.
    pub type_name: String,
    /// Declared properties.
    pub attributes: Attributes,
}

/// A typed, directed relationship between two nodes or records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    /// Source identifier.
    pub source_id: NodeId,
    /// Target identifier.
    pub target_id: NodeId,
    /// Relationship type.
    pub rel_type: String,
    /// Relationship properties.
    pub properties: Attributes,
}

impl RelationshipRecord {
    /// Creates a relationship without properties.
    pub fn new(source_id: NodeId, target_id: NodeId, rel_type: impl Into<String>) -> Self {
        Self {
            source_id,
            target_id,
            rel_type: rel_type.into(),
            properties: Attributes::new(),
        }
    }
}

/// Whether an upsert created or updated a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    /// A new record was created.
    Created,
    /// An existing record was updated.
    Updated,
}

/// Flags forwarded to every transaction the engine opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    /// Run per-node lifecycle callbacks inside the transaction.
    pub inner_callbacks: bool,
    /// Run callbacks after commit.
    pub outer_callbacks: bool,
    /// Delete dependent nodes when deleting.
    pub cascading_delete: bool,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            inner_callbacks: true,
            outer_callbacks: false,
            cascading_delete: false,
        }
    }
}

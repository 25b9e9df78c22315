//! Export entries: the portable JSON form of one stored node.
//!
//! An entry is the node's attribute bag plus a fixed set of reserved keys:
//!
//! | key | value |
//! |-----|-------|
//! | `id` | identifier |
//! | `visibleToPublicUsers` | bool |
//! | `visibleToAuthenticatedUsers` | bool |
//! | `owner` | `{"name": ..}` or `null` |
//! | `grantees` | `[{"name": .., "allowed": [..]}]` sorted by name |
//!
//! Principals travel by name because identifiers differ between
//! environments; they are resolved again on import.

use crate::legacy;
use crate::ledger::WarningLedger;
use crate::principal::resolve_or_record;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use snapdeploy_store::{
    Grant, GraphStore, NewNode, NodeId, NodeKind, Permission, StoreResult, StoredNode,
    Visibility,
};
use std::cmp::Ordering;

/// Identifier key.
pub const KEY_ID: &str = "id";
/// Public visibility key.
pub const KEY_PUBLIC: &str = "visibleToPublicUsers";
/// Authenticated visibility key.
pub const KEY_AUTHENTICATED: &str = "visibleToAuthenticatedUsers";
/// Owner reference key.
pub const KEY_OWNER: &str = "owner";
/// Grantee list key.
pub const KEY_GRANTEES: &str = "grantees";

/// Side-car file name of a content unit, relative to its directory.
pub const KEY_CONTENT_FILE: &str = "contentFile";
/// Page name or file path a content unit links to.
pub const KEY_LINK_TARGET: &str = "linkTarget";
/// Page names of a site.
pub const KEY_PAGES: &str = "pages";
/// Page name of a page path.
pub const KEY_PAGE: &str = "page";

/// Relationship from a site to each of its pages.
pub const SITE_PAGE_REL: &str = "CONTAINS_PAGE";
/// Relationship from a page path to its page.
pub const PATH_PAGE_REL: &str = "ROUTES_TO";

const RESERVED: [&str; 5] = [KEY_ID, KEY_PUBLIC, KEY_AUTHENTICATED, KEY_OWNER, KEY_GRANTEES];

/// Sorted key/value attribute set of one exported object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportEntry(Map<String, Value>);

impl ExportEntry {
    /// Creates an empty entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the entry of a stored node, naming its owner and grantees.
    pub fn from_node(store: &dyn GraphStore, node: &StoredNode) -> StoreResult<Self> {
        let mut fields = Map::new();
        for (key, value) in &node.attributes {
            if !RESERVED.contains(&key.as_str()) {
                fields.insert(key.clone(), value.clone());
            }
        }
        fields.insert(KEY_ID.into(), Value::String(node.id.to_string()));
        fields.insert(KEY_PUBLIC.into(), Value::Bool(node.visibility.public));
        fields.insert(
            KEY_AUTHENTICATED.into(),
            Value::Bool(node.visibility.authenticated),
        );

        let owner = match &node.owner {
            Some(id) => store
                .principal(id)?
                .map(|p| json!({ "name": p.name }))
                .unwrap_or(Value::Null),
            None => Value::Null,
        };
        fields.insert(KEY_OWNER.into(), owner);

        let mut grantees = Vec::new();
        for grant in &node.grants {
            if let Some(principal) = store.principal(&grant.principal)? {
                grantees.push((principal.name, permission_names(&grant.permissions)));
            }
        }
        grantees.sort();
        fields.insert(
            KEY_GRANTEES.into(),
            Value::Array(
                grantees
                    .into_iter()
                    .map(|(name, allowed)| json!({ "name": name, "allowed": allowed }))
                    .collect(),
            ),
        );

        Ok(Self(fields))
    }

    /// Returns a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a string field.
    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Sets a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Removes and returns a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Removes a field and returns it if it is a string.
    pub fn take_str(&mut self, key: &str) -> Option<String> {
        match self.0.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns true if the entry has a field.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Identifier of the exported node.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.str(KEY_ID)
    }

    /// Borrow the underlying map.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Converts the entry back into a node payload of `kind`.
    ///
    /// Owner and grantee names are resolved against the live store.
    /// Unresolvable names are counted in the ledger and the reference is
    /// stripped. With `legacy_dom_visibility`, structural entries carrying
    /// `hidden: true` become invisible to everyone.
    pub fn into_new_node(
        mut self,
        kind: NodeKind,
        store: &dyn GraphStore,
        ledger: &mut WarningLedger,
        legacy_dom_visibility: bool,
    ) -> StoreResult<NewNode> {
        if legacy_dom_visibility && kind.is_structural() {
            legacy::apply_hidden_flag(&mut self);
        }

        let mut node = NewNode::new(kind);
        if let Some(id) = self.take_str(KEY_ID).filter(|s| !s.is_empty()) {
            node.id = Some(NodeId::new(id));
        }
        node.visibility = Visibility::new(
            take_bool(&mut self, KEY_PUBLIC),
            take_bool(&mut self, KEY_AUTHENTICATED),
        );

        if let Some(name) = self.remove(KEY_OWNER).as_ref().and_then(reference_name) {
            if let Some(principal) = resolve_or_record(store, &name, ledger)? {
                node.owner = Some(principal.id);
            }
        }

        if let Some(Value::Array(grantees)) = self.remove(KEY_GRANTEES) {
            for grantee in &grantees {
                let Some(name) = reference_name(grantee) else {
                    continue;
                };
                if let Some(principal) = resolve_or_record(store, &name, ledger)? {
                    node.grants.push(Grant {
                        principal: principal.id,
                        permissions: parse_permissions(grantee.get("allowed")),
                    });
                }
            }
        }

        node.attributes = self.0.into_iter().collect();
        Ok(node)
    }
}

impl From<Map<String, Value>> for ExportEntry {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Creates or updates a node, reconciling by identifier first and by
/// natural key second.
pub fn upsert_node(store: &dyn GraphStore, node: NewNode) -> StoreResult<NodeId> {
    if let Some(id) = &node.id {
        if store.node(id)?.is_some_and(|existing| existing.kind == node.kind) {
            let id = id.clone();
            store.update_node(&id, node)?;
            return Ok(id);
        }
    }
    let key = node
        .attributes
        .get(node.kind.key_attribute())
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(key) = key {
        let mut hits = store.find_by_key(node.kind, &key)?;
        if hits.len() == 1 {
            let id = hits.remove(0).id;
            store.update_node(&id, node)?;
            return Ok(id);
        }
    }
    store.create_node(node)
}

/// Sorts entries by natural key, then identifier.
pub fn sort_entries(entries: &mut [ExportEntry], key: &str) {
    entries.sort_by(|a, b| compare(a, b, key));
}

fn compare(a: &ExportEntry, b: &ExportEntry, key: &str) -> Ordering {
    a.str(key)
        .cmp(&b.str(key))
        .then_with(|| a.id().cmp(&b.id()))
}

/// Wire names of a permission list.
#[must_use]
pub fn permission_names(permissions: &[Permission]) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = permissions.iter().map(|p| p.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Parses a list of permission names, skipping unknown ones.
#[must_use]
pub fn parse_permissions(value: Option<&Value>) -> Vec<Permission> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(Permission::parse)
                .collect()
        })
        .unwrap_or_default()
}

/// Extracts the `name` of an owner/grantee/principal reference.
#[must_use]
pub fn reference_name(value: &Value) -> Option<String> {
    value
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn take_bool(entry: &mut ExportEntry, key: &str) -> bool {
    entry
        .remove(key)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapdeploy_store::{InMemoryStore, PrincipalKind};

    #[test]
    fn owner_and_grantees_travel_by_name() {
        let store = InMemoryStore::new();
        let alice = store.add_principal("alice", PrincipalKind::User);
        let editors = store.add_principal("editors", PrincipalKind::Group);
        let id = store
            .create_node(
                NewNode::new(NodeKind::Page)
                    .with_attr("name", "index")
                    .with_owner(alice)
                    .with_grant(editors, vec![Permission::Write, Permission::Read]),
            )
            .unwrap();
        let node = store.node(&id).unwrap().unwrap();

        let entry = ExportEntry::from_node(&store, &node).unwrap();
        assert_eq!(entry.get(KEY_OWNER), Some(&json!({"name": "alice"})));
        assert_eq!(
            entry.get(KEY_GRANTEES),
            Some(&json!([{"name": "editors", "allowed": ["read", "write"]}]))
        );
        assert_eq!(entry.id(), Some(id.as_str()));
    }

    #[test]
    fn unresolvable_owner_is_stripped() {
        let store = InMemoryStore::new();
        let mut entry = ExportEntry::new();
        entry.insert(KEY_ID, "p1");
        entry.insert("name", "index");
        entry.insert(KEY_OWNER, json!({"name": "ghost"}));
        entry.insert(KEY_GRANTEES, json!([{"name": "ghost", "allowed": ["read"]}]));

        let mut ledger = WarningLedger::new();
        let node = entry
            .into_new_node(NodeKind::Page, &store, &mut ledger, false)
            .unwrap();

        assert!(node.owner.is_none());
        assert!(node.grants.is_empty());
        assert_eq!(ledger.missing_principal_count("ghost"), 2);
        assert_eq!(node.id, Some(NodeId::new("p1")));
        assert!(!node.attributes.contains_key(KEY_OWNER));
        assert_eq!(node.attributes.get("name"), Some(&json!("index")));
    }

    #[test]
    fn legacy_hidden_flag_hides_structural_entries() {
        let store = InMemoryStore::new();
        let mut entry = ExportEntry::new();
        entry.insert("name", "secret");
        entry.insert(KEY_PUBLIC, true);
        entry.insert(KEY_AUTHENTICATED, true);
        entry.insert("hidden", true);

        let node = entry
            .into_new_node(NodeKind::Page, &store, &mut WarningLedger::new(), true)
            .unwrap();
        assert_eq!(node.visibility, Visibility::new(false, false));
        assert!(!node.attributes.contains_key("hidden"));
    }

    #[test]
    fn upsert_matches_id_then_key() {
        let store = InMemoryStore::new();
        let id = store
            .create_node(NewNode::new(NodeKind::Folder).with_attr("path", "/img"))
            .unwrap();

        let same_id = NewNode::new(NodeKind::Folder)
            .with_id(id.clone())
            .with_attr("path", "/images");
        assert_eq!(upsert_node(&store, same_id).unwrap(), id);

        let same_key = NewNode::new(NodeKind::Folder)
            .with_id(NodeId::new("elsewhere"))
            .with_attr("path", "/images")
            .with_attr("note", "x");
        assert_eq!(upsert_node(&store, same_key).unwrap(), id);
        assert_eq!(store.node_count(NodeKind::Folder), 1);

        let fresh = NewNode::new(NodeKind::Folder).with_attr("path", "/docs");
        assert_ne!(upsert_node(&store, fresh).unwrap(), id);
        assert_eq!(store.node_count(NodeKind::Folder), 2);
    }

    #[test]
    fn entries_sort_by_key_then_id() {
        let mut a = ExportEntry::new();
        a.insert("name", "b");
        a.insert(KEY_ID, "1");
        let mut b = ExportEntry::new();
        b.insert("name", "a");
        b.insert(KEY_ID, "2");
        let mut c = ExportEntry::new();
        c.insert("name", "a");
        c.insert(KEY_ID, "1");

        let mut entries = vec![a, b, c];
        sort_entries(&mut entries, "name");
        let ids: Vec<_> = entries.iter().map(|e| e.id().unwrap().to_string()).collect();
        assert_eq!(ids, vec!["1", "2", "1"]);
        assert_eq!(entries[0].str("name"), Some("a"));
    }
}

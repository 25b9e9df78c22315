//! Collaborator traits for the live application store.

use crate::error::StoreResult;
use crate::model::{
    DataRecord, NewNode, NodeId, NodeKind, Principal, RelationshipRecord, StoredNode, TxOptions,
    UpsertKind,
};
use serde_json::Value;

/// The graph query/transaction engine of the live application.
///
/// The deployment engine never holds a transaction across stages or chunks:
/// every call to [`GraphStore::transaction`] is expected to commit (or roll
/// back) before it returns.
///
/// # Invariants
///
/// - `find_by_key` is an exact match on the kind's natural key attribute
/// - `find_principals` is an exact name match and may return several hits
/// - `create_relationship` fails with `StoreError::MissingEndpoint` when
///   either end does not exist
pub trait GraphStore: Send + Sync {
    /// Runs `work` inside one commit boundary.
    ///
    /// All mutations made by `work` are committed when it returns `Ok`, and
    /// rolled back when it returns `Err`.
    fn transaction(
        &self,
        options: TxOptions,
        work: &mut dyn FnMut() -> StoreResult<()>,
    ) -> StoreResult<()>;

    /// Lists all nodes of a kind.
    fn nodes(&self, kind: NodeKind) -> StoreResult<Vec<StoredNode>>;

    /// Looks up a node by identifier.
    fn node(&self, id: &NodeId) -> StoreResult<Option<StoredNode>>;

    /// Looks up nodes of a kind by natural key.
    fn find_by_key(&self, kind: NodeKind, key: &str) -> StoreResult<Vec<StoredNode>>;

    /// Creates a node and returns its identifier.
    fn create_node(&self, node: NewNode) -> StoreResult<NodeId>;

    /// Replaces the attributes, flags and body of an existing node.
    fn update_node(&self, id: &NodeId, node: NewNode) -> StoreResult<()>;

    /// Deletes every node of a kind, returning how many were removed.
    fn delete_nodes(&self, kind: NodeKind) -> StoreResult<usize>;

    /// Returns true if the node is in the trash or no longer exists.
    fn is_trashed(&self, id: &NodeId) -> StoreResult<bool>;

    /// Finds principals by exact name.
    fn find_principals(&self, name: &str) -> StoreResult<Vec<Principal>>;

    /// Looks up a principal by identifier.
    fn principal(&self, id: &NodeId) -> StoreResult<Option<Principal>>;

    /// Counts records of a user-defined type.
    fn count_records(&self, type_name: &str) -> StoreResult<u64>;

    /// Returns one page of records of a type, ordered by identifier.
    fn records(&self, type_name: &str, offset: u64, limit: usize) -> StoreResult<Vec<DataRecord>>;

    /// Creates or updates a record.
    fn upsert_record(&self, record: DataRecord) -> StoreResult<UpsertKind>;

    /// Returns true if a node or record with this identifier exists.
    fn exists(&self, id: &NodeId) -> StoreResult<bool>;

    /// Lists relationships leaving a node or record.
    fn outgoing_relationships(&self, source: &NodeId) -> StoreResult<Vec<RelationshipRecord>>;

    /// Creates a relationship.
    fn create_relationship(&self, relationship: &RelationshipRecord) -> StoreResult<()>;

    /// Deletes every relationship of a type, returning how many were removed.
    fn delete_relationships(&self, rel_type: &str) -> StoreResult<usize>;
}

/// The binary content storage provider.
pub trait ContentStorage: Send + Sync {
    /// Reads the content of a file node.
    fn read(&self, id: &NodeId) -> StoreResult<Vec<u8>>;

    /// Replaces the content of a file node.
    fn write(&self, id: &NodeId, data: &[u8]) -> StoreResult<()>;

    /// Returns the stored checksum of a file node, if it has content.
    fn checksum(&self, id: &NodeId) -> StoreResult<Option<String>>;
}

/// The dynamic schema/type system.
pub trait SchemaRegistry: Send + Sync {
    /// Returns the full schema document.
    ///
    /// The document is an object with a `types` array (each type an object
    /// with a `name` and optional `methods`) and an optional `methods` array
    /// of global functions.
    fn export_schema(&self) -> StoreResult<Value>;

    /// Applies a schema document, replacing or extending the current one.
    fn import_schema(&self, document: &Value, extend_existing: bool) -> StoreResult<()>;

    /// Runs the post-import schema migration hook.
    fn migrate(&self) -> StoreResult<()>;
}

/// The scripting engine running pre/post hooks.
pub trait ScriptHost: Send + Sync {
    /// Runs a script; `name` identifies it in diagnostics.
    fn run(&self, name: &str, source: &str) -> StoreResult<()>;
}

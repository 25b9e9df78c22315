//! In-memory live store for tests, tooling and the CLI.

use crate::backend::{ContentStorage, GraphStore};
use crate::checksum::content_checksum;
use crate::error::{Endpoint, StoreError, StoreResult};
use crate::model::{
    DataRecord, NewNode, NodeId, NodeKind, Principal, PrincipalKind, RelationshipRecord,
    StoredNode, TxOptions, UpsertKind,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// How freshly generated identifiers are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdFormat {
    /// 32 hex characters, no dashes.
    #[default]
    Compact,
    /// Canonical hyphenated UUID form.
    Hyphenated,
}

/// The full contents of an [`InMemoryStore`].
///
/// This is also the on-disk image format used by the command-line tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreImage {
    /// Export-relevant nodes.
    pub nodes: BTreeMap<NodeId, StoredNode>,
    /// Identifiers of nodes moved to the trash.
    #[serde(default)]
    pub trashed: BTreeSet<NodeId>,
    /// Users and groups.
    #[serde(default)]
    pub principals: BTreeMap<NodeId, Principal>,
    /// Records of user-defined types.
    #[serde(default)]
    pub records: BTreeMap<NodeId, DataRecord>,
    /// All relationships.
    #[serde(default)]
    pub relationships: Vec<RelationshipRecord>,
    /// Binary content of file nodes.
    #[serde(default)]
    pub content: BTreeMap<NodeId, Vec<u8>>,
}

/// An in-memory live store.
///
/// Transactions are emulated by snapshotting the image before running the
/// work closure and restoring it on failure.
///
/// # Thread Safety
///
/// All state sits behind locks; the store can be shared across threads.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    image: RwLock<StoreImage>,
    id_format: IdFormat,
    commits: AtomicU64,
    depth: AtomicUsize,
    tx_options: Mutex<Vec<TxOptions>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store generating identifiers in the given format.
    #[must_use]
    pub fn with_id_format(id_format: IdFormat) -> Self {
        Self {
            id_format,
            ..Self::default()
        }
    }

    /// Creates a store from an existing image.
    #[must_use]
    pub fn from_image(image: StoreImage) -> Self {
        Self {
            image: RwLock::new(image),
            ..Self::default()
        }
    }

    /// Loads a store image from a JSON file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let data = fs::read(path)?;
        let image: StoreImage = serde_json::from_slice(&data)?;
        Ok(Self::from_image(image))
    }

    /// Saves the store image as JSON.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let data = serde_json::to_vec_pretty(&*self.image.read())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }

    /// Returns a copy of the current image.
    #[must_use]
    pub fn image(&self) -> StoreImage {
        self.image.read().clone()
    }

    /// Returns how many transactions have committed.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Returns the options of every top-level transaction, oldest first.
    #[must_use]
    pub fn transaction_options(&self) -> Vec<TxOptions> {
        self.tx_options.lock().clone()
    }

    /// Adds a principal and returns its identifier.
    pub fn add_principal(&self, name: &str, kind: PrincipalKind) -> NodeId {
        let id = self.generate_id();
        self.image.write().principals.insert(
            id.clone(),
            Principal {
                id: id.clone(),
                name: name.to_string(),
                kind,
            },
        );
        id
    }

    /// Moves a node to the trash.
    pub fn trash(&self, id: &NodeId) {
        self.image.write().trashed.insert(id.clone());
    }

    /// Returns the number of nodes of a kind.
    #[must_use]
    pub fn node_count(&self, kind: NodeKind) -> usize {
        self.image
            .read()
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .count()
    }

    /// Returns every relationship of a type.
    #[must_use]
    pub fn relationships_of_type(&self, rel_type: &str) -> Vec<RelationshipRecord> {
        self.image
            .read()
            .relationships
            .iter()
            .filter(|r| r.rel_type == rel_type)
            .cloned()
            .collect()
    }

    fn generate_id(&self) -> NodeId {
        let uuid = uuid::Uuid::new_v4();
        match self.id_format {
            IdFormat::Compact => NodeId(uuid.simple().to_string()),
            IdFormat::Hyphenated => NodeId(uuid.hyphenated().to_string()),
        }
    }
}

impl GraphStore for InMemoryStore {
    fn transaction(
        &self,
        options: TxOptions,
        work: &mut dyn FnMut() -> StoreResult<()>,
    ) -> StoreResult<()> {
        let outermost = self.depth.fetch_add(1, Ordering::SeqCst) == 0;
        let before = if outermost {
            self.tx_options.lock().push(options);
            Some(self.image.read().clone())
        } else {
            None
        };

        let result = work();
        self.depth.fetch_sub(1, Ordering::SeqCst);

        match (result, before) {
            (Ok(()), Some(_)) => {
                self.commits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            (Ok(()), None) => Ok(()),
            (Err(e), Some(snapshot)) => {
                *self.image.write() = snapshot;
                Err(e)
            }
            (Err(e), None) => Err(e),
        }
    }

    fn nodes(&self, kind: NodeKind) -> StoreResult<Vec<StoredNode>> {
        Ok(self
            .image
            .read()
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect())
    }

    fn node(&self, id: &NodeId) -> StoreResult<Option<StoredNode>> {
        Ok(self.image.read().nodes.get(id).cloned())
    }

    fn find_by_key(&self, kind: NodeKind, key: &str) -> StoreResult<Vec<StoredNode>> {
        Ok(self
            .image
            .read()
            .nodes
            .values()
            .filter(|n| n.kind == kind && n.natural_key() == Some(key))
            .cloned()
            .collect())
    }

    fn create_node(&self, node: NewNode) -> StoreResult<NodeId> {
        let id = node.id.clone().unwrap_or_else(|| self.generate_id());
        let stored = StoredNode {
            id: id.clone(),
            kind: node.kind,
            visibility: node.visibility,
            owner: node.owner,
            grants: node.grants,
            attributes: node.attributes,
            body: node.body,
        };
        let mut image = self.image.write();
        image.trashed.remove(&id);
        image.nodes.insert(id.clone(), stored);
        Ok(id)
    }

    fn update_node(&self, id: &NodeId, node: NewNode) -> StoreResult<()> {
        let mut image = self.image.write();
        let existing = image
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
        existing.visibility = node.visibility;
        existing.owner = node.owner;
        existing.grants = node.grants;
        existing.attributes = node.attributes;
        existing.body = node.body;
        Ok(())
    }

    fn delete_nodes(&self, kind: NodeKind) -> StoreResult<usize> {
        let mut image = self.image.write();
        let doomed: BTreeSet<NodeId> = image
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .map(|n| n.id.clone())
            .collect();
        image.nodes.retain(|id, _| !doomed.contains(id));
        image.content.retain(|id, _| !doomed.contains(id));
        image.trashed.retain(|id| !doomed.contains(id));
        image
            .relationships
            .retain(|r| !doomed.contains(&r.source_id) && !doomed.contains(&r.target_id));
        Ok(doomed.len())
    }

    fn is_trashed(&self, id: &NodeId) -> StoreResult<bool> {
        let image = self.image.read();
        Ok(image.trashed.contains(id) || !image.nodes.contains_key(id))
    }

    fn find_principals(&self, name: &str) -> StoreResult<Vec<Principal>> {
        Ok(self
            .image
            .read()
            .principals
            .values()
            .filter(|p| p.name == name)
            .cloned()
            .collect())
    }

    fn principal(&self, id: &NodeId) -> StoreResult<Option<Principal>> {
        Ok(self.image.read().principals.get(id).cloned())
    }

    fn count_records(&self, type_name: &str) -> StoreResult<u64> {
        Ok(self
            .image
            .read()
            .records
            .values()
            .filter(|r| r.type_name == type_name)
            .count() as u64)
    }

    fn records(&self, type_name: &str, offset: u64, limit: usize) -> StoreResult<Vec<DataRecord>> {
        Ok(self
            .image
            .read()
            .records
            .values()
            .filter(|r| r.type_name == type_name)
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    fn upsert_record(&self, record: DataRecord) -> StoreResult<UpsertKind> {
        if record.id.as_str().is_empty() {
            return Err(StoreError::invalid_record("record without identifier"));
        }
        let mut image = self.image.write();
        match image.records.insert(record.id.clone(), record) {
            Some(_) => Ok(UpsertKind::Updated),
            None => Ok(UpsertKind::Created),
        }
    }

    fn exists(&self, id: &NodeId) -> StoreResult<bool> {
        let image = self.image.read();
        Ok(image.nodes.contains_key(id)
            || image.records.contains_key(id)
            || image.principals.contains_key(id))
    }

    fn outgoing_relationships(&self, source: &NodeId) -> StoreResult<Vec<RelationshipRecord>> {
        Ok(self
            .image
            .read()
            .relationships
            .iter()
            .filter(|r| &r.source_id == source)
            .cloned()
            .collect())
    }

    fn create_relationship(&self, relationship: &RelationshipRecord) -> StoreResult<()> {
        if !self.exists(&relationship.source_id)? {
            return Err(StoreError::MissingEndpoint {
                rel_type: relationship.rel_type.clone(),
                endpoint: Endpoint::Source,
                id: relationship.source_id.clone(),
            });
        }
        if !self.exists(&relationship.target_id)? {
            return Err(StoreError::MissingEndpoint {
                rel_type: relationship.rel_type.clone(),
                endpoint: Endpoint::Target,
                id: relationship.target_id.clone(),
            });
        }
        let mut image = self.image.write();
        if !image.relationships.contains(relationship) {
            image.relationships.push(relationship.clone());
        }
        Ok(())
    }

    fn delete_relationships(&self, rel_type: &str) -> StoreResult<usize> {
        let mut image = self.image.write();
        let before = image.relationships.len();
        image.relationships.retain(|r| r.rel_type != rel_type);
        Ok(before - image.relationships.len())
    }
}

impl ContentStorage for InMemoryStore {
    fn read(&self, id: &NodeId) -> StoreResult<Vec<u8>> {
        self.image
            .read()
            .content
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))
    }

    fn write(&self, id: &NodeId, data: &[u8]) -> StoreResult<()> {
        let mut image = self.image.write();
        if !image.nodes.contains_key(id) {
            return Err(StoreError::NodeNotFound(id.clone()));
        }
        image.content.insert(id.clone(), data.to_vec());
        Ok(())
    }

    fn checksum(&self, id: &NodeId) -> StoreResult<Option<String>> {
        Ok(self
            .image
            .read()
            .content
            .get(id)
            .map(|data| content_checksum(data)))
    }
}

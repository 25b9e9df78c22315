//! Deferred reference resolution.
//!
//! Content imported early may point at content imported later. Such links
//! are recorded as `(source, target name or path)` while importing and
//! materialized in one final pass once all structural content exists.

use crate::ledger::WarningLedger;
use snapdeploy_store::{
    GraphStore, NodeId, NodeKind, RelationshipRecord, StoreResult, StoredNode, TxOptions,
};
use tracing::debug;

/// Relationship type of a materialized content link.
pub const LINK_REL: &str = "LINKS_TO";

/// Kinds a deferred link may point at, in lookup order.
const LINKABLE: [NodeKind; 2] = [NodeKind::Page, NodeKind::File];

/// One recorded forward reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLink {
    /// Node the link starts at.
    pub source: NodeId,
    /// Page name or file path of the link target.
    pub target: String,
}

/// Outcome of the resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Links materialized.
    pub resolved: usize,
    /// Links dropped because the target does not exist.
    pub broken: usize,
}

/// Queue of forward references recorded during one import.
#[derive(Debug, Clone, Default)]
pub struct DeferredLinks {
    pending: Vec<PendingLink>,
}

impl DeferredLinks {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a link to be resolved later.
    pub fn record(&mut self, source: NodeId, target: impl Into<String>) {
        self.pending.push(PendingLink {
            source,
            target: target.into(),
        });
    }

    /// Number of pending links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops all pending links.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Materializes every pending link whose target exists.
    ///
    /// Unresolvable links are recorded as broken and dropped. The queue is
    /// empty afterwards, also when the store fails.
    pub fn resolve(
        &mut self,
        store: &dyn GraphStore,
        ledger: &mut WarningLedger,
    ) -> StoreResult<LinkStats> {
        let pending = std::mem::take(&mut self.pending);
        let mut stats = LinkStats::default();

        store.transaction(TxOptions::default(), &mut || {
            for link in &pending {
                match find_target(store, &link.target)? {
                    Some(target) => {
                        store.create_relationship(&RelationshipRecord::new(
                            link.source.clone(),
                            target.id,
                            LINK_REL,
                        ))?;
                        stats.resolved += 1;
                    }
                    None => {
                        ledger.broken_link(format!(
                            "Link from {} to '{}' dropped, target not found",
                            link.source, link.target
                        ));
                        stats.broken += 1;
                    }
                }
            }
            Ok(())
        })?;

        debug!(
            resolved = stats.resolved,
            broken = stats.broken,
            "Deferred links resolved"
        );
        Ok(stats)
    }
}

/// Looks up a link target among linkable content.
pub fn find_target(store: &dyn GraphStore, target: &str) -> StoreResult<Option<StoredNode>> {
    for kind in LINKABLE {
        let mut hits = store.find_by_key(kind, target)?;
        if !hits.is_empty() {
            hits.sort_by(|a, b| a.id.cmp(&b.id));
            return Ok(hits.into_iter().next());
        }
    }
    Ok(None)
}

/// Natural key a stored link target is exported under.
#[must_use]
pub fn target_key(node: &StoredNode) -> Option<String> {
    if LINKABLE.contains(&node.kind) {
        node.natural_key().map(str::to_string)
    } else {
        None
    }
}

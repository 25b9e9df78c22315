//! Chunked bulk transfer.
//!
//! Large record and relationship sets are moved in bounded chunks. Each chunk
//! runs inside its own transaction, so no single transaction stays open for a
//! whole transfer, and every committed chunk emits a progress event.

use crate::context::{millis, RunContext};
use crate::error::{DeployError, DeployResult};
use crate::ledger::WarningLedger;
use crate::progress::ProgressEvent;
use snapdeploy_store::{GraphStore, StoreResult, TxOptions};
use std::time::Instant;
use tracing::debug;

/// Number of chunks needed for `total` items.
///
/// Never produces a trailing empty chunk.
#[must_use]
pub fn chunk_count(total: u64, chunk_size: usize) -> u64 {
    let size = chunk_size.max(1) as u64;
    total.div_ceil(size)
}

/// Outcome of one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Chunks committed.
    pub chunks: u64,
    /// Items handed to the processor.
    pub processed: u64,
    /// Mean chunk duration.
    pub mean_chunk_duration_ms: u64,
}

/// Paginated, committed-per-chunk iteration over one type.
pub struct ChunkedTransfer<'s> {
    store: &'s dyn GraphStore,
    options: TxOptions,
    chunk_size: usize,
}

impl<'s> ChunkedTransfer<'s> {
    /// Creates a transfer with default transaction options.
    pub fn new(store: &'s dyn GraphStore, chunk_size: usize) -> Self {
        Self {
            store,
            options: TxOptions::default(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Sets the options forwarded to every chunk transaction.
    #[must_use]
    pub fn with_options(mut self, options: TxOptions) -> Self {
        self.options = options;
        self
    }

    /// Transfers `total` items read page by page through `fetch`.
    ///
    /// `fetch(offset, limit)` returns the next page. `process` handles one
    /// item; it records recoverable item problems in the ledger itself and
    /// returns `Err` only for failures that must abort the run, which rolls
    /// back the current chunk.
    pub fn run<T, F, P>(
        &self,
        ctx: &mut RunContext<'_>,
        type_name: &str,
        total: u64,
        mut fetch: F,
        mut process: P,
    ) -> DeployResult<TransferReport>
    where
        F: FnMut(u64, usize) -> StoreResult<Vec<T>>,
        P: FnMut(T, &mut WarningLedger) -> StoreResult<()>,
    {
        let mut report = TransferReport::default();
        let mut total_ms = 0u64;
        let mut offset = 0u64;

        while offset < total {
            ctx.check_cancelled()?;
            let started = Instant::now();
            let mut fetched = 0usize;
            let chunk_size = self.chunk_size;
            let ledger = &mut ctx.ledger;

            self.store
                .transaction(self.options, &mut || {
                    let batch = fetch(offset, chunk_size)?;
                    fetched = batch.len();
                    for item in batch {
                        process(item, ledger)?;
                    }
                    Ok(())
                })
                .map_err(|e| DeployError::stage("chunked transfer", e))?;

            if fetched == 0 {
                debug!(type_name, offset, total, "Source exhausted before total");
                break;
            }

            offset += fetched as u64;
            report.chunks += 1;
            report.processed = offset;

            let chunk_ms = millis(started.elapsed());
            total_ms = total_ms.saturating_add(chunk_ms);
            report.mean_chunk_duration_ms = total_ms / report.chunks;

            ctx.publish(&ProgressEvent::Chunk {
                operation: ctx.operation(),
                type_name: type_name.to_string(),
                processed: offset,
                total,
                chunk_duration_ms: chunk_ms,
                mean_chunk_duration_ms: report.mean_chunk_duration_ms,
            });
        }

        Ok(report)
    }

    /// Transfers an in-memory list of items.
    pub fn run_items<T, P>(
        &self,
        ctx: &mut RunContext<'_>,
        type_name: &str,
        items: Vec<T>,
        process: P,
    ) -> DeployResult<TransferReport>
    where
        P: FnMut(T, &mut WarningLedger) -> StoreResult<()>,
    {
        let total = items.len() as u64;
        let mut source = items.into_iter();
        self.run(
            ctx,
            type_name,
            total,
            |_, limit| Ok(source.by_ref().take(limit).collect()),
            process,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CancelHandle, Phase};
    use crate::progress::{MemoryProgress, Operation};
    use parking_lot::RwLock;
    use proptest::prelude::*;
    use snapdeploy_store::{InMemoryStore, StoreError};
    use std::path::Path;

    fn transfer(total: usize, chunk_size: usize) -> (Vec<ProgressEvent>, TransferReport, u64) {
        let store = InMemoryStore::new();
        let sink = MemoryProgress::new();
        let cancel = CancelHandle::new();
        let phase = RwLock::new(Phase::Idle);
        let mut ctx =
            RunContext::begin(Operation::ImportData, Path::new("/x"), &sink, &cancel, &phase);

        let report = ChunkedTransfer::new(&store, chunk_size)
            .run_items(&mut ctx, "Item", (0..total).collect(), |_, _| Ok(()))
            .unwrap();
        (sink.chunks(), report, store.commit_count())
    }

    #[test]
    fn exact_chunk_size_is_one_chunk() {
        let (chunks, report, commits) = transfer(10, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(report.chunks, 1);
        assert_eq!(commits, 1);
    }

    #[test]
    fn one_over_chunk_size_is_two_chunks() {
        let (chunks, report, _) = transfer(11, 10);
        assert_eq!(report.chunks, 2);
        match &chunks[1] {
            ProgressEvent::Chunk {
                processed, total, ..
            } => {
                assert_eq!(*processed, 11);
                assert_eq!(*total, 11);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &chunks[0] {
            ProgressEvent::Chunk { processed, .. } => assert_eq!(*processed, 10),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn empty_source_emits_nothing() {
        let (chunks, report, commits) = transfer(0, 10);
        assert!(chunks.is_empty());
        assert_eq!(report, TransferReport::default());
        assert_eq!(commits, 0);
    }

    #[test]
    fn item_failures_do_not_stop_the_job() {
        let store = InMemoryStore::new();
        let sink = MemoryProgress::new();
        let cancel = CancelHandle::new();
        let phase = RwLock::new(Phase::Idle);
        let mut ctx =
            RunContext::begin(Operation::ImportData, Path::new("/x"), &sink, &cancel, &phase);

        let report = ChunkedTransfer::new(&store, 2)
            .run_items(&mut ctx, "Item", vec![1, 2, 3, 4, 5], |n, ledger| {
                if n % 2 == 0 {
                    ledger.item_failure("Item", "even");
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(report.processed, 5);
        assert_eq!(ctx.ledger.item_failures("Item"), 2);
    }

    #[test]
    fn fatal_item_error_aborts() {
        let store = InMemoryStore::new();
        let sink = MemoryProgress::new();
        let cancel = CancelHandle::new();
        let phase = RwLock::new(Phase::Idle);
        let mut ctx =
            RunContext::begin(Operation::ImportData, Path::new("/x"), &sink, &cancel, &phase);

        let err = ChunkedTransfer::new(&store, 2)
            .run_items(&mut ctx, "Item", vec![1, 2, 3], |n, _| {
                if n == 3 {
                    Err(StoreError::invalid_record("boom"))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(matches!(err, DeployError::Stage { .. }));
        assert_eq!(sink.chunks().len(), 1);
    }

    #[test]
    fn cancel_stops_between_chunks() {
        let store = InMemoryStore::new();
        let sink = MemoryProgress::new();
        let cancel = CancelHandle::new();
        let phase = RwLock::new(Phase::Idle);
        let mut ctx =
            RunContext::begin(Operation::ImportData, Path::new("/x"), &sink, &cancel, &phase);

        let err = ChunkedTransfer::new(&store, 2)
            .run_items(&mut ctx, "Item", vec![1, 2, 3, 4], |n, _| {
                if n == 2 {
                    cancel.cancel();
                }
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, DeployError::Cancelled));
        assert_eq!(sink.chunks().len(), 1);
    }

    proptest! {
        #[test]
        fn chunk_events_match_arithmetic(total in 0usize..60, size in 1usize..12) {
            let (chunks, report, _) = transfer(total, size);
            prop_assert_eq!(chunks.len() as u64, chunk_count(total as u64, size));
            prop_assert_eq!(report.processed, total as u64);
        }

        #[test]
        fn no_trailing_empty_chunk(chunks in 1u64..1000, size in 1usize..500) {
            prop_assert_eq!(chunk_count(chunks * size as u64, size), chunks);
            prop_assert_eq!(chunk_count(chunks * size as u64 + 1, size), chunks + 1);
        }
    }
}

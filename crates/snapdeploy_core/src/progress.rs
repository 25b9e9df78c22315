//! Progress telemetry published to an external pub-sub collaborator.

use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// The externally invocable deployment operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Full application export.
    Export,
    /// Full application import.
    Import,
    /// Data-only export.
    ExportData,
    /// Data-only import.
    ImportData,
}

impl Operation {
    /// Channel name the progress stream of this operation is keyed by.
    #[must_use]
    pub fn channel(self) -> &'static str {
        match self {
            Operation::Export => "DEPLOYMENT_EXPORT_STATUS",
            Operation::Import => "DEPLOYMENT_IMPORT_STATUS",
            Operation::ExportData => "DEPLOYMENT_DATA_EXPORT_STATUS",
            Operation::ImportData => "DEPLOYMENT_DATA_IMPORT_STATUS",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Export => "export",
            Operation::Import => "import",
            Operation::ExportData => "data export",
            Operation::ImportData => "data import",
        };
        f.write_str(name)
    }
}

/// One event of the progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The operation started.
    Begin {
        /// Operation.
        operation: Operation,
        /// Snapshot directory.
        path: PathBuf,
    },
    /// A named stage is about to run.
    Step {
        /// Operation.
        operation: Operation,
        /// Human-readable stage name.
        step: String,
    },
    /// A bulk-transfer chunk committed.
    Chunk {
        /// Operation.
        operation: Operation,
        /// Type being transferred.
        type_name: String,
        /// Items processed so far for this type.
        processed: u64,
        /// Total items of this type.
        total: u64,
        /// Duration of this chunk.
        chunk_duration_ms: u64,
        /// Running mean chunk duration.
        mean_chunk_duration_ms: u64,
    },
    /// An aggregated reconciliation warning.
    Warning {
        /// Operation.
        operation: Operation,
        /// Short title.
        title: String,
        /// Details.
        message: String,
    },
    /// The operation finished.
    End {
        /// Operation.
        operation: Operation,
        /// Total duration.
        duration_ms: u64,
        /// Number of warning entries flushed.
        warnings: usize,
    },
}

impl ProgressEvent {
    /// Operation this event belongs to.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            ProgressEvent::Begin { operation, .. }
            | ProgressEvent::Step { operation, .. }
            | ProgressEvent::Chunk { operation, .. }
            | ProgressEvent::Warning { operation, .. }
            | ProgressEvent::End { operation, .. } => *operation,
        }
    }
}

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
    /// Publishes one event on the operation's channel.
    fn publish(&self, event: &ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn publish(&self, _event: &ProgressEvent) {}
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn publish(&self, event: &ProgressEvent) {
        let channel = event.operation().channel();
        match event {
            ProgressEvent::Begin { operation, path } => {
                info!(channel, "{} started: {}", operation, path.display());
            }
            ProgressEvent::Step { step, .. } => info!(channel, "{step}"),
            ProgressEvent::Chunk {
                type_name,
                processed,
                total,
                chunk_duration_ms,
                mean_chunk_duration_ms,
                ..
            } => info!(
                channel,
                "{type_name}: {processed}/{total} ({chunk_duration_ms} ms, mean {mean_chunk_duration_ms} ms)"
            ),
            ProgressEvent::Warning { title, message, .. } => warn!(channel, "{title}: {message}"),
            ProgressEvent::End {
                operation,
                duration_ms,
                warnings,
            } => info!(
                channel,
                "{} finished in {} ms with {} warning(s)", operation, duration_ms, warnings
            ),
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemoryProgress {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all events so far.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    /// Returns the names of all `Step` events so far.
    #[must_use]
    pub fn steps(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Step { step, .. } => Some(step.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns all `Chunk` events so far.
    #[must_use]
    pub fn chunks(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Chunk { .. }))
            .cloned()
            .collect()
    }

    /// Returns `(title, message)` of all `Warning` events so far.
    #[must_use]
    pub fn warnings(&self) -> Vec<(String, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Warning { title, message, .. } => {
                    Some((title.clone(), message.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Drops all collected events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ProgressSink for MemoryProgress {
    fn publish(&self, event: &ProgressEvent) {
        self.events.lock().push(event.clone());
    }
}

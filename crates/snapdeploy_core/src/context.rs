//! Run context threaded through every stage of one operation.

use crate::deferred::DeferredLinks;
use crate::error::{DeployError, DeployResult};
use crate::ledger::{WarningLedger, WarningSummary};
use crate::progress::{Operation, ProgressEvent, ProgressSink};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Stage of a running export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    /// Not started.
    Idle,
    /// Creating directories, default hooks and the manifest.
    Preparing,
    /// Writing the ordered export stages.
    Exporting,
    /// Flushing warnings and emitting the summary.
    Finalizing,
}

/// Stage of a running import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    /// Not started.
    Idle,
    /// Checking preconditions and the version/format gate.
    Validating,
    /// Running the pre-deploy hook.
    PreHook,
    /// Reading the ordered import stages.
    Importing,
    /// Resolving recorded forward references.
    DeferredLinking,
    /// Running the post-deploy hook.
    PostHook,
    /// Running the schema migration hook.
    Migrating,
    /// Flushing warnings and emitting the summary.
    Reporting,
}

/// What the deployment service is doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// No operation is running.
    #[default]
    Idle,
    /// An export (full or data-only) is running.
    Export(ExportPhase),
    /// An import (full or data-only) is running.
    Import(ImportPhase),
}

impl Phase {
    /// Returns true if no operation is running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            Phase::Idle | Phase::Export(ExportPhase::Idle) | Phase::Import(ImportPhase::Idle)
        )
    }
}

/// Shareable handle that requests cooperative cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Creates a handle that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; the run stops at the next stage or chunk boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clears a pending request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Wall-clock timing of one job.
#[derive(Debug, Clone, Copy)]
pub struct JobTimer {
    started: Instant,
}

impl JobTimer {
    /// Starts timing now.
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time since start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Milliseconds since start.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        millis(self.elapsed())
    }
}

/// Converts a duration to whole milliseconds, saturating.
#[must_use]
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Total duration.
    pub duration_ms: u64,
    /// Gate advisories surfaced before the run.
    pub advisories: Vec<String>,
    /// Aggregated reconciliation warnings.
    pub warnings: WarningSummary,
}

/// State of one running operation.
///
/// Created when the operation starts, passed by `&mut` through every stage
/// and consumed by [`RunContext::finish`].
pub struct RunContext<'a> {
    operation: Operation,
    progress: &'a dyn ProgressSink,
    cancel: &'a CancelHandle,
    phase: &'a RwLock<Phase>,
    timer: JobTimer,
    legacy_dom_visibility: bool,
    /// Reconciliation warnings of this run.
    pub ledger: WarningLedger,
    /// Forward references recorded during this run.
    pub deferred: DeferredLinks,
}

impl<'a> RunContext<'a> {
    /// Starts a run and publishes its `Begin` event.
    pub fn begin(
        operation: Operation,
        path: &Path,
        progress: &'a dyn ProgressSink,
        cancel: &'a CancelHandle,
        phase: &'a RwLock<Phase>,
    ) -> Self {
        progress.publish(&ProgressEvent::Begin {
            operation,
            path: path.to_path_buf(),
        });
        Self {
            operation,
            progress,
            cancel,
            phase,
            timer: JobTimer::start(),
            legacy_dom_visibility: false,
            ledger: WarningLedger::new(),
            deferred: DeferredLinks::new(),
        }
    }

    /// The running operation.
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The progress sink of this run.
    #[must_use]
    pub fn progress(&self) -> &'a dyn ProgressSink {
        self.progress
    }

    /// Timer started with the run.
    #[must_use]
    pub fn timer(&self) -> JobTimer {
        self.timer
    }

    /// Moves the service to a new phase.
    pub fn enter(&self, phase: Phase) {
        debug!(?phase, "Entering phase");
        *self.phase.write() = phase;
    }

    /// Announces a named stage, failing if cancellation was requested.
    pub fn step(&self, step: impl Into<String>) -> DeployResult<()> {
        self.check_cancelled()?;
        self.progress.publish(&ProgressEvent::Step {
            operation: self.operation,
            step: step.into(),
        });
        Ok(())
    }

    /// Fails with [`DeployError::Cancelled`] if cancellation was requested.
    pub fn check_cancelled(&self) -> DeployResult<()> {
        if self.cancel.is_cancelled() {
            Err(DeployError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Publishes an event on this run's channel.
    pub fn publish(&self, event: &ProgressEvent) {
        self.progress.publish(event);
    }

    /// Marks the snapshot as using the legacy DOM visibility convention.
    pub fn set_legacy_dom_visibility(&mut self, legacy: bool) {
        self.legacy_dom_visibility = legacy;
    }

    /// Returns true if structural entries use the legacy `hidden` flag.
    #[must_use]
    pub fn legacy_dom_visibility(&self) -> bool {
        self.legacy_dom_visibility
    }

    /// Flushes the ledger, publishes `End` and returns the summary.
    ///
    /// Pending deferred links that were never resolved are dropped.
    pub fn finish(mut self, advisories: Vec<String>) -> RunSummary {
        self.deferred.clear();
        let warnings = self.ledger.flush(self.operation, self.progress);
        let duration_ms = self.timer.elapsed_ms();
        self.progress.publish(&ProgressEvent::End {
            operation: self.operation,
            duration_ms,
            warnings: warnings.len(),
        });
        RunSummary {
            duration_ms,
            advisories,
            warnings,
        }
    }
}

impl std::fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("operation", &self.operation)
            .field("legacy_dom_visibility", &self.legacy_dom_visibility)
            .field("ledger", &self.ledger)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

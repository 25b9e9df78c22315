//! The operation contract: export, import, data export and data import.

use crate::config::{DataImportOptions, DeployConfig};
use crate::context::{CancelHandle, Phase, RunContext, RunSummary};
use crate::data::{parse_types, DataDeployment};
use crate::error::{DeployError, DeployResult};
use crate::guard::ExclusivityGuard;
use crate::layout::SnapshotLayout;
use crate::module::DeploymentModule;
use crate::progress::{Operation, ProgressSink, TracingProgress};
use crate::reader::SnapshotReader;
use crate::writer::SnapshotWriter;
use parking_lot::RwLock;
use snapdeploy_store::{ContentStorage, GraphStore, SchemaRegistry, ScriptHost};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Status code of a successful operation.
pub const STATUS_OK: u16 = 200;

/// What an operation reports to its caller.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    /// HTTP-style status code.
    pub status: u16,
    /// Short title; empty on success.
    pub title: String,
    /// Human-readable message.
    pub message: String,
    /// Run summary of a successful operation.
    pub summary: Option<RunSummary>,
}

impl OperationOutcome {
    fn success(operation: Operation, path: &Path, summary: RunSummary) -> Self {
        Self {
            status: STATUS_OK,
            title: String::new(),
            message: format!(
                "Deployment {operation} {} {} done in {} ms ({} warnings)",
                if matches!(operation, Operation::Export | Operation::ExportData) {
                    "to"
                } else {
                    "from"
                },
                path.display(),
                summary.duration_ms,
                summary.warnings.len()
            ),
            summary: Some(summary),
        }
    }

    fn failure(error: &DeployError) -> Self {
        Self {
            status: error.status_code(),
            title: error.title().to_string(),
            message: error.to_string(),
            summary: None,
        }
    }

    /// Returns true if the operation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Entry point of the deployment engine.
///
/// Holds the live-store collaborators and runs one operation at a time,
/// enforced by an [`ExclusivityGuard`] shared by every service in the
/// process unless another guard is supplied.
///
/// # Example
///
/// ```rust
/// use snapdeploy_core::DeploymentService;
/// use snapdeploy_store::{InMemorySchema, InMemoryStore, RecordingScriptHost};
/// use std::sync::Arc;
///
/// let store = Arc::new(InMemoryStore::new());
/// let service = DeploymentService::new(
///     store.clone(),
///     store,
///     Arc::new(InMemorySchema::default()),
///     Arc::new(RecordingScriptHost::new()),
/// );
/// let outcome = service.export(std::path::Path::new("relative/dir"));
/// assert_eq!(outcome.status, 400);
/// ```
pub struct DeploymentService {
    store: Arc<dyn GraphStore>,
    content: Arc<dyn ContentStorage>,
    schema: Arc<dyn SchemaRegistry>,
    scripts: Arc<dyn ScriptHost>,
    progress: Arc<dyn ProgressSink>,
    config: DeployConfig,
    modules: Vec<Arc<dyn DeploymentModule>>,
    guard: Arc<ExclusivityGuard>,
    cancel: CancelHandle,
    phase: RwLock<Phase>,
}

impl DeploymentService {
    /// Creates a service with default configuration and tracing progress.
    pub fn new(
        store: Arc<dyn GraphStore>,
        content: Arc<dyn ContentStorage>,
        schema: Arc<dyn SchemaRegistry>,
        scripts: Arc<dyn ScriptHost>,
    ) -> Self {
        Self {
            store,
            content,
            schema,
            scripts,
            progress: Arc::new(TracingProgress),
            config: DeployConfig::default(),
            modules: Vec::new(),
            guard: ExclusivityGuard::global(),
            cancel: CancelHandle::new(),
            phase: RwLock::new(Phase::Idle),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: DeployConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Uses a private exclusivity guard instead of the process-wide one.
    #[must_use]
    pub fn with_guard(mut self, guard: Arc<ExclusivityGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Registers an extension module.
    #[must_use]
    pub fn with_module(mut self, module: Arc<dyn DeploymentModule>) -> Self {
        self.modules.push(module);
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Requests cancellation of the running operation.
    ///
    /// The run stops at the next stage or chunk boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle that cancels this service's running operation.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// The current phase; [`Phase::Idle`] between operations.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }

    /// Exports the application into `target`.
    pub fn export(&self, target: &Path) -> OperationOutcome {
        outcome(Operation::Export, target, self.run_export(target))
    }

    /// Imports the application from `source`.
    pub fn import(&self, source: &Path, extend_existing: bool) -> OperationOutcome {
        outcome(
            Operation::Import,
            source,
            self.run_import(source, extend_existing),
        )
    }

    /// Exports the records of the comma-separated `types` into `target`.
    pub fn export_data(&self, target: &Path, types: &str) -> OperationOutcome {
        outcome(
            Operation::ExportData,
            target,
            self.run_export_data(target, types),
        )
    }

    /// Imports records and relationships from `source`.
    pub fn import_data(&self, source: &Path, options: DataImportOptions) -> OperationOutcome {
        outcome(
            Operation::ImportData,
            source,
            self.run_import_data(source, options),
        )
    }

    /// Like [`export`](Self::export), returning the typed result.
    pub fn run_export(&self, target: &Path) -> DeployResult<RunSummary> {
        self.run(Operation::Export, target, false, |layout, ctx| {
            SnapshotWriter::new(
                self.store.as_ref(),
                self.content.as_ref(),
                self.schema.as_ref(),
                &self.config,
            )
            .with_modules(&self.modules)
            .write(layout, ctx)?;
            Ok(Vec::new())
        })
    }

    /// Like [`import`](Self::import), returning the typed result.
    pub fn run_import(&self, source: &Path, extend_existing: bool) -> DeployResult<RunSummary> {
        self.run(Operation::Import, source, true, |layout, ctx| {
            SnapshotReader::new(
                self.store.as_ref(),
                self.content.as_ref(),
                self.schema.as_ref(),
                self.scripts.as_ref(),
                &self.config,
            )
            .with_modules(&self.modules)
            .extend_existing(extend_existing)
            .read(layout, ctx)
        })
    }

    /// Like [`export_data`](Self::export_data), returning the typed result.
    pub fn run_export_data(&self, target: &Path, types: &str) -> DeployResult<RunSummary> {
        let types = parse_types(types);
        if types.is_empty() {
            return Err(DeployError::NoTypes);
        }
        self.run(Operation::ExportData, target, false, |layout, ctx| {
            self.data().export(layout, &types, ctx)?;
            Ok(Vec::new())
        })
    }

    /// Like [`import_data`](Self::import_data), returning the typed result.
    pub fn run_import_data(
        &self,
        source: &Path,
        options: DataImportOptions,
    ) -> DeployResult<RunSummary> {
        self.run(Operation::ImportData, source, true, |layout, ctx| {
            self.data().import(layout, options, ctx)
        })
    }

    fn data(&self) -> DataDeployment<'_> {
        DataDeployment::new(self.store.as_ref(), self.content.as_ref(), &self.config)
    }

    fn run<F>(
        &self,
        operation: Operation,
        path: &Path,
        must_exist: bool,
        work: F,
    ) -> DeployResult<RunSummary>
    where
        F: FnOnce(&SnapshotLayout, &mut RunContext<'_>) -> DeployResult<Vec<String>>,
    {
        check_path(path, must_exist)?;
        let _permit = self
            .guard
            .try_acquire()
            .ok_or(DeployError::DeploymentActive)?;
        self.cancel.reset();

        let layout = SnapshotLayout::new(path);
        let mut ctx = RunContext::begin(
            operation,
            path,
            self.progress.as_ref(),
            &self.cancel,
            &self.phase,
        );
        let result = work(&layout, &mut ctx);
        *self.phase.write() = Phase::Idle;

        match result {
            Ok(advisories) => {
                let summary = ctx.finish(advisories);
                info!(
                    %operation,
                    duration_ms = summary.duration_ms,
                    warnings = summary.warnings.len(),
                    "Deployment finished"
                );
                Ok(summary)
            }
            Err(e) => {
                ctx.finish(Vec::new());
                warn!(%operation, error = %e, "Deployment failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for DeploymentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentService")
            .field("config", &self.config)
            .field("modules", &self.modules.len())
            .field("phase", &self.phase())
            .finish()
    }
}

fn check_path(path: &Path, must_exist: bool) -> DeployResult<()> {
    if path.as_os_str().is_empty() {
        return Err(DeployError::MissingPath);
    }
    if !path.is_absolute() {
        return Err(DeployError::RelativePath {
            path: path.to_path_buf(),
        });
    }
    if must_exist && !path.is_dir() {
        return Err(DeployError::SourceMissing {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn outcome(operation: Operation, path: &Path, result: DeployResult<RunSummary>) -> OperationOutcome {
    match result {
        Ok(summary) => OperationOutcome::success(operation, path, summary),
        Err(e) => OperationOutcome::failure(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MemoryProgress;
    use snapdeploy_store::{InMemorySchema, InMemoryStore, RecordingScriptHost};
    use std::path::PathBuf;

    fn service() -> DeploymentService {
        let store = Arc::new(InMemoryStore::new());
        DeploymentService::new(
            store.clone(),
            store,
            Arc::new(InMemorySchema::default()),
            Arc::new(RecordingScriptHost::new()),
        )
        .with_guard(Arc::new(ExclusivityGuard::new()))
    }

    #[test]
    fn relative_path_is_rejected() {
        let outcome = service().export(Path::new("snapshots/app"));
        assert_eq!(outcome.status, 400);
        assert!(!outcome.is_success());
        assert_eq!(outcome.title, "Invalid deployment path");
    }

    #[test]
    fn empty_path_is_missing() {
        let err = service().run_export(Path::new("")).unwrap_err();
        assert!(matches!(err, DeployError::MissingPath));
    }

    #[test]
    fn import_needs_existing_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing: PathBuf = dir.path().join("absent");
        let err = service().run_import(&missing, false).unwrap_err();
        assert!(matches!(err, DeployError::SourceMissing { .. }));
    }

    #[test]
    fn held_guard_refuses_second_operation() {
        let guard = Arc::new(ExclusivityGuard::new());
        let sink = Arc::new(MemoryProgress::new());
        let svc = service()
            .with_guard(Arc::clone(&guard))
            .with_progress(sink.clone());
        let dir = tempfile::tempdir().unwrap();

        let _held = guard.try_acquire().unwrap();
        let outcome = svc.export(dir.path());
        assert_eq!(outcome.status, 409);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn empty_type_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = service().export_data(dir.path(), " , ");
        assert_eq!(outcome.status, 400);
        assert_eq!(outcome.title, "Missing type list");
    }

    #[test]
    fn phase_returns_to_idle_after_export() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service();
        let outcome = svc.export(dir.path());
        assert!(outcome.is_success(), "{}", outcome.message);
        assert!(svc.phase().is_idle());
        assert!(outcome.message.contains("export to"));
    }
}

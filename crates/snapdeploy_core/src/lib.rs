//! # snapdeploy Core
//!
//! Snapshot/restore engine for graph-structured application stores.
//!
//! A full export serializes an application (pages, components, templates,
//! files, schema, security grants, routing and mapping configuration) into a
//! directory of canonical JSON files plus side-car content files. Importing
//! the directory reconstructs the application in another instance. A data
//! deployment moves caller-selected record types and their relationships in
//! chunked transactions.
//!
//! This crate provides:
//! - [`DeploymentService`] - the four operations and their contract
//! - [`SnapshotWriter`] / [`SnapshotReader`] - full export and import
//! - [`DataDeployment`] - data-only export and import
//! - [`ChunkedTransfer`] - bounded, committed-per-chunk bulk transfer
//! - [`FileSync`] - checksum-driven file export and import
//! - [`DeferredLinks`] - two-phase resolution of forward references
//! - [`WarningLedger`] - non-fatal reconciliation warnings
//! - [`ExclusivityGuard`] - one deployment at a time
//!
//! ## Example
//!
//! ```rust
//! use snapdeploy_core::{DeployConfig, DeploymentService};
//! use snapdeploy_store::{InMemorySchema, InMemoryStore, RecordingScriptHost};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let service = DeploymentService::new(
//!     store.clone(),
//!     store,
//!     Arc::new(InMemorySchema::default()),
//!     Arc::new(RecordingScriptHost::new()),
//! )
//! .with_config(DeployConfig::new().with_chunk_size(500));
//!
//! let dir = std::env::temp_dir().join("snapdeploy-doc-example");
//! let outcome = service.export(&dir);
//! assert!(outcome.is_success(), "{}", outcome.message);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunk;
mod config;
mod context;
mod data;
mod deferred;
mod entry;
mod error;
mod file_sync;
mod gate;
mod guard;
mod hooks;
mod json;
mod layout;
mod ledger;
mod legacy;
mod manifest;
mod module;
mod principal;
mod progress;
mod reader;
mod schema;
mod service;
mod writer;

pub use chunk::{chunk_count, ChunkedTransfer, TransferReport};
pub use config::{
    DataImportOptions, DeployConfig, SchemaLayout, UuidFormat, DEFAULT_CHUNK_SIZE,
    DOM_VISIBILITY_CONVENTION,
};
pub use context::{
    CancelHandle, ExportPhase, ImportPhase, JobTimer, Phase, RunContext, RunSummary,
};
pub use data::{parse_types, DataDeployment, DataExportStats};
pub use deferred::{DeferredLinks, LinkStats, PendingLink, LINK_REL};
pub use error::{DeployError, DeployResult};
pub use file_sync::{FileSelection, FileSync, FileSyncStats};
pub use gate::{version_ordinal, GateVerdict};
pub use guard::{ExclusivityGuard, GuardPermit};
pub use layout::{escape_file_name, unescape_file_name, SnapshotLayout};
pub use ledger::{LedgerEntry, RelationshipFailures, WarningLedger, WarningSummary};
pub use manifest::DeploymentManifest;
pub use module::DeploymentModule;
pub use principal::Resolution;
pub use progress::{
    MemoryProgress, NullProgress, Operation, ProgressEvent, ProgressSink, TracingProgress,
};
pub use reader::SnapshotReader;
pub use service::{DeploymentService, OperationOutcome, STATUS_OK};
pub use writer::SnapshotWriter;

/// Crate version, written as the product version of new snapshots.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Snapshot directory entry names.
pub mod files {
    pub use crate::layout::{
        ACTION_MAPPING_FILE, APP_CONFIG_FILE, COMPONENTS_DIR, COMPONENTS_FILE, CORS_FILE,
        FILES_DIR, FILES_FILE, FOLDERS_FILE, GRANTS_FILE, LOCALIZATIONS_FILE,
        MAIL_TEMPLATES_DIR, MAIL_TEMPLATES_FILE, MANIFEST_FILE, MODULES_DIR, NODES_DIR,
        PAGES_DIR, PAGES_FILE, PAGE_PATHS_FILE, PARAMETER_MAPPING_FILE, POST_HOOK_FILE,
        PRE_HOOK_FILE, RELATIONSHIPS_DIR, SCHEMA_DIR, SCHEMA_GRANTS_FILE, SITES_FILE, TEMPLATES_DIR,
        TEMPLATES_FILE, WIDGETS_FILE,
    };
}

/// Evaluates a snapshot manifest against a configuration without importing.
pub fn check_manifest(
    manifest: Option<&DeploymentManifest>,
    config: &DeployConfig,
) -> DeployResult<GateVerdict> {
    gate::check(manifest, config)
}

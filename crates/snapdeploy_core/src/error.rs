//! Error types for deployment operations.
//!
//! Only fatal conditions are errors. Reconciliation problems (unknown
//! principals, missing side-car files, broken links) are recorded in the
//! [`WarningLedger`](crate::WarningLedger) and never abort a run.

use snapdeploy_store::StoreError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Fatal errors that abort a deployment run.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The caller supplied a relative path.
    #[error("path must be absolute: {}", path.display())]
    RelativePath {
        /// The offending path.
        path: PathBuf,
    },

    /// No path was supplied.
    #[error("no path given")]
    MissingPath,

    /// A data export was requested without any type names.
    #[error("no types given for data export")]
    NoTypes,

    /// The source directory does not exist.
    #[error("source path does not exist: {}", path.display())]
    SourceMissing {
        /// The missing directory.
        path: PathBuf,
    },

    /// The source directory contains nothing the importer recognizes.
    #[error("source path does not contain any deployment files: {}", path.display())]
    NoDeploymentFiles {
        /// The inspected directory.
        path: PathBuf,
    },

    /// The snapshot was exported by a newer version.
    #[error("snapshot was exported from a newer version ({snapshot}) than this one ({running})")]
    NewerVersion {
        /// Version recorded in the snapshot.
        snapshot: String,
        /// Version of the running instance.
        running: String,
    },

    /// The snapshot uses an incompatible identifier representation.
    #[error("incompatible identifier representation: snapshot uses {snapshot}, instance uses {running}")]
    UuidFormatMismatch {
        /// Representation recorded in the snapshot.
        snapshot: String,
        /// Representation of the running instance.
        running: String,
    },

    /// Another deployment operation holds the exclusivity guard.
    #[error("another deployment is currently active")]
    DeploymentActive,

    /// The run was cancelled between stages or chunks.
    #[error("deployment cancelled")]
    Cancelled,

    /// A hook script failed before any mutation.
    #[error("hook {name} failed: {message}")]
    HookFailed {
        /// Hook file name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// A structural import/export stage failed.
    #[error("{stage} failed: {source}")]
    Stage {
        /// The stage name.
        stage: &'static str,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// The snapshot is malformed.
    #[error("invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Description of the problem.
        message: String,
    },

    /// Live-store error outside a named stage.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    /// Creates an invalid snapshot error.
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }

    /// Wraps a store error with the name of the stage it came from.
    pub fn stage(stage: &'static str, source: StoreError) -> Self {
        Self::Stage { stage, source }
    }

    /// Creates a hook failure.
    pub fn hook_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookFailed {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Short title surfaced to the caller together with the message.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            DeployError::RelativePath { .. }
            | DeployError::MissingPath
            | DeployError::SourceMissing { .. }
            | DeployError::NoDeploymentFiles { .. } => "Invalid deployment path",
            DeployError::NoTypes => "Missing type list",
            DeployError::NewerVersion { .. } | DeployError::UuidFormatMismatch { .. } => {
                "Incompatible deployment snapshot"
            }
            DeployError::DeploymentActive => "Deployment already running",
            DeployError::Cancelled => "Deployment cancelled",
            DeployError::HookFailed { .. } => "Deployment hook failed",
            DeployError::InvalidSnapshot { .. } => "Invalid deployment snapshot",
            DeployError::Stage { .. }
            | DeployError::Store(_)
            | DeployError::Io(_)
            | DeployError::Json(_) => "Deployment failed",
        }
    }

    /// Status code reported by the operation contract.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            DeployError::RelativePath { .. }
            | DeployError::MissingPath
            | DeployError::SourceMissing { .. }
            | DeployError::NoDeploymentFiles { .. }
            | DeployError::NoTypes => 400,
            DeployError::DeploymentActive => 409,
            DeployError::NewerVersion { .. }
            | DeployError::UuidFormatMismatch { .. }
            | DeployError::InvalidSnapshot { .. } => 422,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_errors_are_client_errors() {
        let err = DeployError::RelativePath {
            path: PathBuf::from("rel/dir"),
        };
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("rel/dir"));
    }

    #[test]
    fn gate_errors_share_a_title() {
        let newer = DeployError::NewerVersion {
            snapshot: "9.9".into(),
            running: "0.5".into(),
        };
        let uuid = DeployError::UuidFormatMismatch {
            snapshot: "withDashes".into(),
            running: "withoutDashes".into(),
        };
        assert_eq!(newer.title(), uuid.title());
        assert_eq!(newer.status_code(), 422);
    }

    #[test]
    fn active_deployment_message() {
        let err = DeployError::DeploymentActive;
        assert_eq!(err.to_string(), "another deployment is currently active");
        assert_eq!(err.status_code(), 409);
    }
}

//! Version/format gate.
//!
//! Rejects snapshots that cannot be imported safely before anything in the
//! live store is touched. The verdict is binary: either the import may
//! proceed (possibly with advisories) or it fails with a fatal error.

use crate::config::{DeployConfig, UuidFormat};
use crate::error::{DeployError, DeployResult};
use crate::manifest::DeploymentManifest;

/// Identifier representation assumed for snapshots that do not record one.
const LEGACY_UUID_FORMAT: UuidFormat = UuidFormat::WithoutDashes;

/// Reduces a version string to a two-digit ordinal.
///
/// Takes the leading whitespace-delimited token, drops every non-digit and
/// keeps the first two digits: `"5.1.0 (build 7)"` becomes `51`, `"4"`
/// becomes `4`. A string without digits yields `0`.
#[must_use]
pub fn version_ordinal(version: &str) -> u32 {
    let token = version.split_whitespace().next().unwrap_or("");
    token
        .chars()
        .filter(char::is_ascii_digit)
        .take(2)
        .fold(0, |acc, c| acc * 10 + c.to_digit(10).unwrap_or(0))
}

/// Outcome of a passed gate check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateVerdict {
    /// Informational notes and warnings to surface to the operator.
    pub advisories: Vec<String>,
}

impl GateVerdict {
    /// Returns true if nothing noteworthy was found.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.advisories.is_empty()
    }
}

/// Checks a snapshot manifest against the running instance.
///
/// An absent manifest is the permissive default of a legacy snapshot.
///
/// # Errors
///
/// - [`DeployError::NewerVersion`] if the snapshot ordinal is higher than the
///   running ordinal
/// - [`DeployError::UuidFormatMismatch`] if the identifier representations
///   differ and the running instance does not accept both
pub fn check(manifest: Option<&DeploymentManifest>, config: &DeployConfig) -> DeployResult<GateVerdict> {
    let mut verdict = GateVerdict::default();
    let legacy = DeploymentManifest::default();
    let manifest = match manifest {
        Some(m) => m,
        None => {
            verdict
                .advisories
                .push("Snapshot has no manifest, treating it as a legacy export.".to_string());
            &legacy
        }
    };

    match manifest.product_version.as_deref() {
        None => verdict.advisories.push(
            "Snapshot does not record the version it was exported from; importing it anyway."
                .to_string(),
        ),
        Some(snapshot_version) => {
            let snapshot = version_ordinal(snapshot_version);
            let running = version_ordinal(&config.product_version);
            if snapshot > running {
                return Err(DeployError::NewerVersion {
                    snapshot: snapshot_version.to_string(),
                    running: config.product_version.clone(),
                });
            }
        }
    }

    let snapshot_tag = match manifest.uuid_representation_tag.as_deref() {
        Some(tag) => tag.to_string(),
        None => {
            verdict.advisories.push(format!(
                "Snapshot does not record its identifier representation; assuming {}.",
                LEGACY_UUID_FORMAT.tag()
            ));
            LEGACY_UUID_FORMAT.tag().to_string()
        }
    };
    let running_tag = config.uuid_format.tag();

    if snapshot_tag != running_tag {
        if config.uuid_format == UuidFormat::Both {
            verdict.advisories.push(format!(
                "Snapshot uses {snapshot_tag} identifiers and this instance accepts both \
                 representations. This is meant as a temporary migration state."
            ));
        } else {
            return Err(DeployError::UuidFormatMismatch {
                snapshot: snapshot_tag,
                running: running_tag.to_string(),
            });
        }
    }

    Ok(verdict)
}

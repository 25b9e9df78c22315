//! Pluggable extension modules.
//!
//! A module owns `modules/<name>/` inside a snapshot. The engine creates the
//! directory on export and calls the module's own hooks; it never looks at
//! the directory's contents.

use crate::error::DeployResult;
use snapdeploy_store::GraphStore;
use std::path::Path;

/// An extension taking part in full exports and imports.
pub trait DeploymentModule: Send + Sync {
    /// Directory name below `modules/`.
    fn name(&self) -> &str;

    /// Writes the module's state into `dir`, which already exists.
    fn export_into(&self, store: &dyn GraphStore, dir: &Path) -> DeployResult<()>;

    /// Reads the module's state from `dir`.
    ///
    /// Only called when the directory exists in the snapshot.
    fn import_from(&self, store: &dyn GraphStore, dir: &Path) -> DeployResult<()>;
}

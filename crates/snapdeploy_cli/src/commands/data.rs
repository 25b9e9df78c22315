//! Data export and import commands.

use super::session::{report, Session};
use snapdeploy_core::DataImportOptions;
use std::path::Path;

/// Runs the export-data command.
pub fn export(store: &Path, dir: &Path, types: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !store.exists() {
        return Err(format!("No store image found at {:?}", store).into());
    }
    let session = Session::open(store, None)?;
    report(&session.service().export_data(dir, types))
}

/// Runs the import-data command and saves the store.
///
/// Committed chunks stay committed when the import fails part-way, so the
/// store is saved either way.
pub fn import(
    store: &Path,
    dir: &Path,
    options: DataImportOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(store, None)?;
    let result = report(&session.service().import_data(dir, options));
    session.save()?;
    result
}

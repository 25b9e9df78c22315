//! Import command implementation.

use super::session::{report, Session};
use std::path::Path;

/// Runs the import command and saves the store on success.
pub fn run(
    store: &Path,
    schema: Option<&Path>,
    dir: &Path,
    extend_existing: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(store, schema)?;
    report(&session.service().import(dir, extend_existing))?;
    session.save()
}

//! Export command implementation.

use super::session::{report, Session};
use std::path::Path;

/// Runs the export command.
pub fn run(
    store: &Path,
    schema: Option<&Path>,
    dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if !store.exists() {
        return Err(format!("No store image found at {:?}", store).into());
    }
    let session = Session::open(store, schema)?;
    report(&session.service().export(dir))
}

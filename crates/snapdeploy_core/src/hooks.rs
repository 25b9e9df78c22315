//! Pre/post deployment hook scripts.

use crate::layout::{SnapshotLayout, POST_HOOK_FILE, PRE_HOOK_FILE};
use snapdeploy_store::{ScriptHost, StoreResult};
use std::fs;
use std::io;
use tracing::info;

/// Default body of `pre-deploy.conf`.
pub const DEFAULT_PRE_HOOK: &str = "\
# Script run before the snapshot is imported.
#
# Lines starting with '#' are ignored. Any other content is handed to the
# scripting engine; it is wrapped in ${{ ... }} automatically unless it
# already uses the ${ ... } form. A failing pre-deploy script aborts the
# import before anything is changed.
";

/// Default body of `post-deploy.conf`.
pub const DEFAULT_POST_HOOK: &str = "\
# Script run after the snapshot was imported.
#
# Lines starting with '#' are ignored. Any other content is handed to the
# scripting engine; it is wrapped in ${{ ... }} automatically unless it
# already uses the ${ ... } form. A failing post-deploy script is reported
# as a warning.
";

/// Writes the default hook files that do not exist yet.
pub fn write_defaults(layout: &SnapshotLayout) -> io::Result<()> {
    for (name, body) in [
        (PRE_HOOK_FILE, DEFAULT_PRE_HOOK),
        (POST_HOOK_FILE, DEFAULT_POST_HOOK),
    ] {
        let path = layout.path(name);
        if !path.exists() {
            fs::write(&path, body)?;
        }
    }
    Ok(())
}

/// Turns a hook file body into a runnable script.
///
/// Returns `None` for empty or comment-only bodies.
#[must_use]
pub fn prepare(body: &str) -> Option<String> {
    let code: Vec<&str> = body
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect();
    let code = code.join("\n");
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("${") && trimmed.ends_with('}') {
        Some(trimmed.to_string())
    } else {
        Some(format!("${{{{\n{trimmed}\n}}}}"))
    }
}

/// Runs the hook file `name` if it exists and contains code.
///
/// Returns true if a script was run.
pub fn run(scripts: &dyn ScriptHost, layout: &SnapshotLayout, name: &str) -> StoreResult<bool> {
    let path = layout.path(name);
    if !path.exists() {
        return Ok(false);
    }
    let body = fs::read_to_string(&path)?;
    match prepare(&body) {
        Some(script) => {
            info!("Running {name}");
            scripts.run(name, &script)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

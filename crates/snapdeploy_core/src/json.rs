//! Byte-stable JSON files.
//!
//! Every JSON file in a snapshot is written with sorted object keys, two-space
//! indentation and a trailing newline, so an unchanged store exports
//! byte-identical files.

use crate::error::{DeployError, DeployResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Recursively sorts the keys of every object in `value`.
#[must_use]
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Encodes a value as canonical pretty JSON with a trailing newline.
pub fn to_canonical_string<T: Serialize + ?Sized>(value: &T) -> DeployResult<String> {
    let value = canonicalize(serde_json::to_value(value)?);
    let mut text = serde_json::to_string_pretty(&value)?;
    text.push('\n');
    Ok(text)
}

/// Writes canonical JSON to `path`, creating parent directories.
///
/// The file is left untouched when its bytes would not change. Returns true
/// if the file was written.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> DeployResult<bool> {
    let text = to_canonical_string(value)?;
    write_if_changed(path, text.as_bytes())
}

/// Writes `bytes` to `path` unless the file already has exactly these bytes.
pub fn write_if_changed(path: &Path, bytes: &[u8]) -> DeployResult<bool> {
    if let Ok(existing) = fs::read(path) {
        if existing == bytes {
            return Ok(false);
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(true)
}

/// Reads and decodes a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> DeployResult<T> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| {
        DeployError::invalid_snapshot(format!("{}: {e}", path.display()))
    })
}

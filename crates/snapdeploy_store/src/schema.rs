//! In-memory schema registry and script host.

use crate::backend::{SchemaRegistry, ScriptHost};
use crate::error::{StoreError, StoreResult};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// A schema registry holding the document in memory.
#[derive(Debug)]
pub struct InMemorySchema {
    document: RwLock<Value>,
    migrations: AtomicU64,
}

impl Default for InMemorySchema {
    fn default() -> Self {
        Self::new(json!({ "types": [], "methods": [] }))
    }
}

impl InMemorySchema {
    /// Creates a registry holding `document`.
    #[must_use]
    pub fn new(document: Value) -> Self {
        Self {
            document: RwLock::new(document),
            migrations: AtomicU64::new(0),
        }
    }

    /// Returns a copy of the current document.
    #[must_use]
    pub fn document(&self) -> Value {
        self.document.read().clone()
    }

    /// Returns how often the migration hook ran.
    #[must_use]
    pub fn migration_count(&self) -> u64 {
        self.migrations.load(Ordering::SeqCst)
    }
}

/// Merges the named entries of `incoming` into `current`, replacing equal names.
fn merge_named(current: &mut Vec<Value>, incoming: &[Value]) {
    for item in incoming {
        let name = item.get("name").and_then(Value::as_str);
        match current
            .iter_mut()
            .find(|c| name.is_some() && c.get("name").and_then(Value::as_str) == name)
        {
            Some(slot) => *slot = item.clone(),
            None => current.push(item.clone()),
        }
    }
}

fn array_of<'a>(document: &'a Value, key: &str) -> StoreResult<&'a [Value]> {
    match document.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(StoreError::schema(format!("`{key}` must be an array"))),
    }
}

impl SchemaRegistry for InMemorySchema {
    fn export_schema(&self) -> StoreResult<Value> {
        Ok(self.document.read().clone())
    }

    fn import_schema(&self, document: &Value, extend_existing: bool) -> StoreResult<()> {
        if !document.is_object() {
            return Err(StoreError::schema("schema document must be an object"));
        }
        let types = array_of(document, "types")?;
        let methods = array_of(document, "methods")?;

        let mut current = self.document.write();
        if extend_existing {
            let mut merged_types = array_of(&current, "types")?.to_vec();
            let mut merged_methods = array_of(&current, "methods")?.to_vec();
            merge_named(&mut merged_types, types);
            merge_named(&mut merged_methods, methods);

            let mut out = Map::new();
            out.insert("types".into(), Value::Array(merged_types));
            out.insert("methods".into(), Value::Array(merged_methods));
            *current = Value::Object(out);
        } else {
            *current = document.clone();
        }
        Ok(())
    }

    fn migrate(&self) -> StoreResult<()> {
        self.migrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A script host that records every script it is asked to run.
#[derive(Debug, Default)]
pub struct RecordingScriptHost {
    runs: Mutex<Vec<(String, String)>>,
    fail_on: Mutex<Option<String>>,
}

impl RecordingScriptHost {
    /// Creates a host that accepts every script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every script containing `needle` fail.
    pub fn fail_when_contains(&self, needle: impl Into<String>) {
        *self.fail_on.lock() = Some(needle.into());
    }

    /// Returns `(name, source)` of every script run so far.
    #[must_use]
    pub fn runs(&self) -> Vec<(String, String)> {
        self.runs.lock().clone()
    }
}

impl ScriptHost for RecordingScriptHost {
    fn run(&self, name: &str, source: &str) -> StoreResult<()> {
        self.runs.lock().push((name.to_string(), source.to_string()));
        if let Some(needle) = self.fail_on.lock().as_deref() {
            if source.contains(needle) {
                return Err(StoreError::Script {
                    name: name.to_string(),
                    message: format!("script contains `{needle}`"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_import_overwrites_document() {
        let schema = InMemorySchema::new(json!({ "types": [{ "name": "Old" }] }));
        schema
            .import_schema(&json!({ "types": [{ "name": "New" }] }), false)
            .unwrap();
        assert_eq!(schema.document()["types"][0]["name"], "New");
        assert_eq!(schema.document()["types"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn extend_import_merges_by_name() {
        let schema = InMemorySchema::new(json!({
            "types": [{ "name": "A", "v": 1 }, { "name": "B" }]
        }));
        schema
            .import_schema(
                &json!({ "types": [{ "name": "A", "v": 2 }, { "name": "C" }] }),
                true,
            )
            .unwrap();

        let types = schema.document()["types"].as_array().unwrap().clone();
        assert_eq!(types.len(), 3);
        assert_eq!(types[0]["v"], 2);
    }

    #[test]
    fn non_object_document_rejected() {
        let schema = InMemorySchema::default();
        assert!(schema.import_schema(&json!([1, 2]), false).is_err());
    }

    #[test]
    fn script_host_records_and_fails_on_demand() {
        let host = RecordingScriptHost::new();
        host.run("pre", "ok()").unwrap();
        host.fail_when_contains("throw");
        assert!(host.run("post", "throw()").is_err());
        assert_eq!(host.runs().len(), 2);
    }
}

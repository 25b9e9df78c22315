//! Schema files.
//!
//! The schema document comes from the external schema registry as
//! `{"types": [{"name", "methods": [{"name", "source", ..}], ..}], "methods": [..]}`
//! where the top-level `methods` are global functions.
//!
//! In aggregate layout it is written as `schema/schema.json`. In tree layout
//! every type gets `schema/types/<Type>.json`, every method body moves to
//! `schema/methods/<Type>/<method>.js` and every global function body to
//! `schema/functions/<name>.js`; the JSON keeps a `sourceFile` path relative
//! to `schema/` instead of the inline `source`.

use crate::config::SchemaLayout;
use crate::error::DeployResult;
use crate::json::{canonicalize, read_json, write_json};
use crate::layout::{
    escape_file_name, SnapshotLayout, SCHEMA_AGGREGATE_FILE, SCHEMA_DIR, SCHEMA_FUNCTIONS_DIR,
    SCHEMA_FUNCTIONS_FILE, SCHEMA_METHODS_DIR, SCHEMA_TYPES_DIR,
};
use crate::ledger::WarningLedger;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

const KEY_TYPES: &str = "types";
const KEY_METHODS: &str = "methods";
const KEY_NAME: &str = "name";
const KEY_SOURCE: &str = "source";
const KEY_SOURCE_FILE: &str = "sourceFile";
const SOURCE_EXT: &str = "js";

/// Writes the schema document below `schema/`, replacing what was there.
pub fn write(layout: &SnapshotLayout, document: &Value, mode: SchemaLayout) -> DeployResult<()> {
    let root = layout.path(SCHEMA_DIR);
    if root.exists() {
        fs::remove_dir_all(&root)?;
    }
    fs::create_dir_all(&root)?;

    match mode {
        SchemaLayout::Aggregate => {
            let mut document = document.clone();
            sort_named_arrays(&mut document);
            write_json(&root.join(SCHEMA_AGGREGATE_FILE), &document)?;
        }
        SchemaLayout::Tree => {
            for mut ty in named_items(document, KEY_TYPES) {
                let type_name = item_name(&ty);
                let dir = format!("{SCHEMA_METHODS_DIR}/{}", escape_file_name(&type_name));
                externalize_methods(&root, &mut ty, &dir)?;
                let file = format!("{}.json", escape_file_name(&type_name));
                write_json(&root.join(SCHEMA_TYPES_DIR).join(file), &canonicalize(ty))?;
            }

            let mut functions = named_items(document, KEY_METHODS);
            for function in &mut functions {
                externalize_source(&root, function, SCHEMA_FUNCTIONS_DIR)?;
            }
            write_json(&root.join(SCHEMA_FUNCTIONS_FILE), &functions)?;
        }
    }
    Ok(())
}

/// Reads the schema document from `schema/`.
///
/// Returns `None` when the snapshot has no schema. Method and function
/// source files that cannot be found are recorded and the method is left out.
pub fn read(layout: &SnapshotLayout, ledger: &mut WarningLedger) -> DeployResult<Option<Value>> {
    let root = layout.path(SCHEMA_DIR);
    let aggregate = root.join(SCHEMA_AGGREGATE_FILE);
    if aggregate.exists() {
        return Ok(Some(read_json(&aggregate)?));
    }

    let types_dir = root.join(SCHEMA_TYPES_DIR);
    let functions_file = root.join(SCHEMA_FUNCTIONS_FILE);
    if !types_dir.is_dir() && !functions_file.exists() {
        return Ok(None);
    }

    let mut types = Vec::new();
    if types_dir.is_dir() {
        let mut files: Vec<_> = fs::read_dir(&types_dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        for file in files {
            let mut ty: Value = read_json(&file)?;
            let type_name = item_name(&ty);
            if let Some(Value::Array(methods)) = ty.get_mut(KEY_METHODS) {
                methods.retain_mut(|method| {
                    inline_source(&root, method, ledger, &format!("{type_name}."))
                });
            }
            types.push(ty);
        }
    }

    let mut functions: Vec<Value> = if functions_file.exists() {
        read_json(&functions_file)?
    } else {
        Vec::new()
    };
    functions.retain_mut(|function| inline_source(&root, function, ledger, ""));

    let mut document = Map::new();
    document.insert(KEY_TYPES.into(), Value::Array(types));
    document.insert(KEY_METHODS.into(), Value::Array(functions));
    let mut document = Value::Object(document);
    sort_named_arrays(&mut document);
    Ok(Some(document))
}

fn item_name(item: &Value) -> String {
    item.get(KEY_NAME)
        .and_then(Value::as_str)
        .unwrap_or("unnamed")
        .to_string()
}

/// Clones the named array `key` of `document`, sorted by name.
fn named_items(document: &Value, key: &str) -> Vec<Value> {
    let mut items = document
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    items.sort_by_key(item_name);
    items
}

fn sort_named_arrays(document: &mut Value) {
    for key in [KEY_TYPES, KEY_METHODS] {
        if let Some(Value::Array(items)) = document.get_mut(key) {
            items.sort_by_key(item_name);
            for item in items.iter_mut() {
                if let Some(Value::Array(methods)) = item.get_mut(KEY_METHODS) {
                    methods.sort_by_key(item_name);
                }
            }
        }
    }
}

fn externalize_methods(root: &Path, ty: &mut Value, dir: &str) -> DeployResult<()> {
    if let Some(Value::Array(methods)) = ty.get_mut(KEY_METHODS) {
        methods.sort_by_key(item_name);
        for method in methods.iter_mut() {
            externalize_source(root, method, dir)?;
        }
    }
    Ok(())
}

/// Moves the inline `source` of `item` into `<dir>/<name>.js`.
fn externalize_source(root: &Path, item: &mut Value, dir: &str) -> DeployResult<()> {
    let name = item_name(item);
    let Some(fields) = item.as_object_mut() else {
        return Ok(());
    };
    let source = match fields.remove(KEY_SOURCE) {
        Some(Value::String(source)) => source,
        Some(other) => {
            fields.insert(KEY_SOURCE.into(), other);
            return Ok(());
        }
        None => return Ok(()),
    };
    let stem = escape_file_name(&name);
    let mut relative = format!("{dir}/{stem}.{SOURCE_EXT}");
    let mut n = 1;
    // duplicate names must not share a source file
    while root.join(&relative).exists() {
        n += 1;
        relative = format!("{dir}/{stem}-{n}.{SOURCE_EXT}");
    }
    let path = root.join(&relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, source)?;
    fields.insert(KEY_SOURCE_FILE.into(), Value::String(relative));
    Ok(())
}

/// Replaces `sourceFile` with the inline `source`; false if the file is missing.
fn inline_source(root: &Path, item: &mut Value, ledger: &mut WarningLedger, prefix: &str) -> bool {
    let name = item_name(item);
    let Some(fields) = item.as_object_mut() else {
        return true;
    };
    let Some(Value::String(relative)) = fields.remove(KEY_SOURCE_FILE) else {
        return true;
    };
    match fs::read_to_string(root.join(&relative)) {
        Ok(source) => {
            fields.insert(KEY_SOURCE.into(), Value::String(source));
            true
        }
        Err(e) => {
            ledger.missing_source_file(format!(
                "{SCHEMA_DIR}/{relative} (method {prefix}{name}): {e}"
            ));
            false
        }
    }
}

//! Data-only deployments.
//!
//! Moves caller-selected record types and the relationships between them:
//!
//! - `nodes/<Type>.json` - records, each with `id`, `type` and its properties
//! - `relationships/<RelType>.json` - `{sourceId, targetId, relType, ..}`
//!   for every relationship whose both ends were exported
//! - `files.json` + `files/` (+ `folders.json`) when `File` or `Folder` is
//!   among the selected types
//!
//! Both directions run through [`ChunkedTransfer`]. Relationship types are
//! replaced on import (type-scoped delete, then recreate), never merged.

use crate::chunk::ChunkedTransfer;
use crate::config::{DataImportOptions, DeployConfig};
use crate::context::{ExportPhase, ImportPhase, Phase, RunContext};
use crate::error::{DeployError, DeployResult};
use crate::file_sync::{FileSelection, FileSync};
use crate::gate::{self, GateVerdict};
use crate::json::{read_json, write_json};
use crate::layout::{
    escape_file_name, unescape_file_name, SnapshotLayout, FILES_FILE, FOLDERS_FILE, MANIFEST_FILE, NODES_DIR,
    RELATIONSHIPS_DIR,
};
use crate::manifest::DeploymentManifest;
use serde_json::{Map, Value};
use snapdeploy_store::{
    Attributes, ContentStorage, DataRecord, GraphStore, NodeId, RelationshipRecord,
    StoreError,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const KEY_ID: &str = "id";
const KEY_TYPE: &str = "type";
const KEY_SOURCE: &str = "sourceId";
const KEY_TARGET: &str = "targetId";
const KEY_REL_TYPE: &str = "relType";

const FILE_TYPE: &str = "File";
const FOLDER_TYPE: &str = "Folder";

/// Splits a comma-separated type list, trimming and dropping empty names.
#[must_use]
pub fn parse_types(csv: &str) -> Vec<String> {
    let set: BTreeSet<String> = csv
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    set.into_iter().collect()
}

/// Counters of a data export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataExportStats {
    /// Records written per type.
    pub records: BTreeMap<String, u64>,
    /// Relationships written per relationship type.
    pub relationships: BTreeMap<String, u64>,
}

/// Exports and imports data-only snapshots.
pub struct DataDeployment<'a> {
    store: &'a dyn GraphStore,
    content: &'a dyn ContentStorage,
    config: &'a DeployConfig,
}

impl<'a> DataDeployment<'a> {
    /// Creates a data deployment over the given collaborators.
    pub fn new(
        store: &'a dyn GraphStore,
        content: &'a dyn ContentStorage,
        config: &'a DeployConfig,
    ) -> Self {
        Self {
            store,
            content,
            config,
        }
    }

    /// Exports the records of `types` and the relationships among them.
    pub fn export(
        &self,
        layout: &SnapshotLayout,
        types: &[String],
        ctx: &mut RunContext<'_>,
    ) -> DeployResult<DataExportStats> {
        ctx.enter(Phase::Export(ExportPhase::Preparing));
        fs::create_dir_all(layout.root())?;
        DeploymentManifest::for_config(self.config).write(&layout.path(MANIFEST_FILE))?;
        for dir in [NODES_DIR, RELATIONSHIPS_DIR] {
            let path = layout.path(dir);
            if path.exists() {
                fs::remove_dir_all(&path)?;
            }
            fs::create_dir_all(&path)?;
        }

        ctx.enter(Phase::Export(ExportPhase::Exporting));
        let mut stats = DataExportStats::default();
        let mut exported: BTreeSet<NodeId> = BTreeSet::new();
        let with_files = types.iter().any(|t| t == FILE_TYPE);
        let with_folders = types.iter().any(|t| t == FOLDER_TYPE);

        for type_name in types.iter().filter(|t| *t != FILE_TYPE && *t != FOLDER_TYPE) {
            ctx.step(format!("Exporting {type_name} records"))?;
            let total = self.store.count_records(type_name)?;
            let mut rows: Vec<Value> = Vec::new();
            let store = self.store;

            ChunkedTransfer::new(self.store, self.config.chunk_size).run(
                ctx,
                type_name,
                total,
                |offset, limit| store.records(type_name, offset, limit),
                |record, _| {
                    exported.insert(record.id.clone());
                    rows.push(record_to_json(record));
                    Ok(())
                },
            )?;

            stats.records.insert(type_name.clone(), rows.len() as u64);
            write_json(&type_file(layout, NODES_DIR, type_name), &rows)?;
        }

        if with_files || with_folders {
            ctx.step("Exporting files")?;
            let selection = if with_folders {
                FileSelection::All
            } else {
                FileSelection::FilesWithAncestors
            };
            let synced = FileSync::new(self.store, self.content).export(layout, ctx, selection)?;
            exported.extend(synced.listed);
        }

        ctx.step("Exporting relationships")?;
        let mut grouped: BTreeMap<String, Vec<RelationshipRecord>> = BTreeMap::new();
        for id in &exported {
            for rel in self.store.outgoing_relationships(id)? {
                if exported.contains(&rel.target_id) {
                    grouped.entry(rel.rel_type.clone()).or_default().push(rel);
                }
            }
        }
        let transfer = ChunkedTransfer::new(self.store, self.config.chunk_size);
        for (rel_type, mut rels) in grouped {
            rels.sort_by(|a, b| {
                (&a.source_id, &a.target_id).cmp(&(&b.source_id, &b.target_id))
            });
            let mut rows: Vec<Value> = Vec::with_capacity(rels.len());
            transfer.run_items(ctx, &rel_type, rels, |rel, _| {
                rows.push(relationship_to_json(rel));
                Ok(())
            })?;
            stats.relationships.insert(rel_type.clone(), rows.len() as u64);
            write_json(&type_file(layout, RELATIONSHIPS_DIR, &rel_type), &rows)?;
        }

        ctx.enter(Phase::Export(ExportPhase::Finalizing));
        info!(
            types = stats.records.len(),
            relationship_types = stats.relationships.len(),
            "Data export complete"
        );
        Ok(stats)
    }

    /// Checks that `layout` holds an importable data snapshot.
    pub fn validate(&self, layout: &SnapshotLayout) -> DeployResult<GateVerdict> {
        if !layout.has_recognized_content() {
            return Err(DeployError::NoDeploymentFiles {
                path: layout.root().to_path_buf(),
            });
        }
        let manifest = DeploymentManifest::read(&layout.path(MANIFEST_FILE))?;
        gate::check(manifest.as_ref(), self.config)
    }

    /// Imports records, relationships and files.
    ///
    /// Returns the gate advisories.
    pub fn import(
        &self,
        layout: &SnapshotLayout,
        options: DataImportOptions,
        ctx: &mut RunContext<'_>,
    ) -> DeployResult<Vec<String>> {
        ctx.enter(Phase::Import(ImportPhase::Validating));
        let verdict = self.validate(layout)?;

        ctx.enter(Phase::Import(ImportPhase::Importing));
        let transfer =
            ChunkedTransfer::new(self.store, self.config.chunk_size).with_options(options.tx_options());

        for file in json_files(&layout.path(NODES_DIR))? {
            let fallback = file_stem(&file);
            let rows: Vec<Map<String, Value>> = read_json(&file)?;
            ctx.step(format!("Importing {fallback} records"))?;
            let store = self.store;

            transfer.run_items(ctx, &fallback, rows, |mut row, ledger| {
                let type_name = match row.remove(KEY_TYPE) {
                    Some(Value::String(t)) => t,
                    _ => fallback.clone(),
                };
                let Some(Value::String(id)) = row.remove(KEY_ID) else {
                    ledger.item_failure(&type_name, "record without identifier");
                    return Ok(());
                };
                let record = DataRecord {
                    id: NodeId::new(id),
                    type_name: type_name.clone(),
                    attributes: row.into_iter().collect(),
                };
                match store.upsert_record(record) {
                    Ok(_) => Ok(()),
                    Err(StoreError::InvalidRecord(reason)) => {
                        ledger.item_failure(&type_name, &reason);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            })?;
        }

        if layout.exists(FILES_FILE) || layout.exists(FOLDERS_FILE) {
            ctx.step("Importing files")?;
            FileSync::new(self.store, self.content).import(layout, ctx)?;
        }

        for file in json_files(&layout.path(RELATIONSHIPS_DIR))? {
            let rows: Vec<Map<String, Value>> = read_json(&file)?;
            let rel_type = rows
                .first()
                .and_then(|r| r.get(KEY_REL_TYPE))
                .and_then(Value::as_str)
                .map_or_else(|| file_stem(&file), str::to_string);
            ctx.step(format!("Importing {rel_type} relationships"))?;

            let mut removed = 0;
            self.store
                .transaction(options.tx_options(), &mut || {
                    removed = self.store.delete_relationships(&rel_type)?;
                    Ok(())
                })
                .map_err(|e| DeployError::stage("relationship import", e))?;
            info!("Removed {removed} {rel_type} relationships");

            let store = self.store;
            transfer.run_items(ctx, &rel_type, rows, |row, ledger| {
                let Some(rel) = json_to_relationship(row, &rel_type) else {
                    ledger.item_failure(&rel_type, "relationship without endpoints");
                    return Ok(());
                };
                match store.create_relationship(&rel) {
                    Ok(()) => Ok(()),
                    Err(e) => match e.missing_endpoint() {
                        Some(endpoint) => {
                            ledger.relationship_failure(&rel_type, endpoint);
                            Ok(())
                        }
                        None => Err(e),
                    },
                }
            })?;
        }

        ctx.enter(Phase::Import(ImportPhase::Reporting));
        Ok(verdict.advisories)
    }
}

fn type_file(layout: &SnapshotLayout, dir: &str, type_name: &str) -> PathBuf {
    layout
        .path(dir)
        .join(format!("{}.json", escape_file_name(type_name)))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| unescape_file_name(&s.to_string_lossy()))
        .unwrap_or_default()
}

/// `*.json` files of a directory, sorted; empty if it does not exist.
fn json_files(dir: &Path) -> DeployResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn record_to_json(record: DataRecord) -> Value {
    let mut row: Map<String, Value> = record.attributes.into_iter().collect();
    row.insert(KEY_ID.into(), Value::String(record.id.0));
    row.insert(KEY_TYPE.into(), Value::String(record.type_name));
    Value::Object(row)
}

fn relationship_to_json(rel: RelationshipRecord) -> Value {
    let mut row: Map<String, Value> = rel.properties.into_iter().collect();
    row.insert(KEY_SOURCE.into(), Value::String(rel.source_id.0));
    row.insert(KEY_TARGET.into(), Value::String(rel.target_id.0));
    row.insert(KEY_REL_TYPE.into(), Value::String(rel.rel_type));
    Value::Object(row)
}

fn json_to_relationship(mut row: Map<String, Value>, rel_type: &str) -> Option<RelationshipRecord> {
    let source = match row.remove(KEY_SOURCE) {
        Some(Value::String(s)) => s,
        _ => return None,
    };
    let target = match row.remove(KEY_TARGET) {
        Some(Value::String(t)) => t,
        _ => return None,
    };
    row.remove(KEY_REL_TYPE);
    let properties: Attributes = row.into_iter().collect();
    Some(RelationshipRecord {
        source_id: NodeId::new(source),
        target_id: NodeId::new(target),
        rel_type: rel_type.to_string(),
        properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn types_are_trimmed_sorted_and_unique() {
        assert_eq!(
            parse_types(" Project, Customer,,Project "),
            vec!["Customer".to_string(), "Project".to_string()]
        );
        assert!(parse_types("").is_empty());
    }

    #[test]
    fn relationship_json_shape() {
        let mut rel = RelationshipRecord::new(NodeId::new("a"), NodeId::new("b"), "OWNS");
        rel.properties.insert("since".into(), json!(2020));
        let row = relationship_to_json(rel.clone());
        assert_eq!(
            row,
            json!({"sourceId": "a", "targetId": "b", "relType": "OWNS", "since": 2020})
        );

        let Value::Object(map) = row else { unreachable!() };
        assert_eq!(json_to_relationship(map, "OWNS"), Some(rel));
    }

    #[test]
    fn relationship_without_target_is_rejected() {
        let Value::Object(map) = json!({"sourceId": "a"}) else {
            unreachable!()
        };
        assert!(json_to_relationship(map, "OWNS").is_none());
    }
}

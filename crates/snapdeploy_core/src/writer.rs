//! Snapshot writer (full export).
//!
//! Walks the live store into a snapshot directory in a fixed order. Every
//! stage announces itself with a progress step first. Structural content
//! directories are cleared and rewritten on every run; files are synced
//! incrementally and pruned afterwards.

use crate::config::DeployConfig;
use crate::context::{ExportPhase, Phase, RunContext};
use crate::deferred::{target_key, LINK_REL};
use crate::entry::{
    permission_names, sort_entries, ExportEntry, KEY_CONTENT_FILE, KEY_GRANTEES,
    KEY_LINK_TARGET, KEY_PAGE, KEY_PAGES, PATH_PAGE_REL, SITE_PAGE_REL,
};
use crate::error::DeployResult;
use crate::file_sync::{FileSelection, FileSync};
use crate::hooks;
use crate::json::write_json;
use crate::layout::{
    content_file_name, content_paths, SnapshotLayout, ACTION_MAPPING_FILE, APP_CONFIG_FILE,
    CORS_FILE, GRANTS_FILE, LOCALIZATIONS_FILE, MANIFEST_FILE, PAGE_PATHS_FILE,
    PARAMETER_MAPPING_FILE, SCHEMA_GRANTS_FILE, SITES_FILE, WIDGETS_FILE,
};
use crate::manifest::DeploymentManifest;
use crate::module::DeploymentModule;
use crate::schema;
use serde_json::{json, Value};
use snapdeploy_store::{
    ContentStorage, GraphStore, NodeId, NodeKind, SchemaRegistry, StoreResult, StoredNode,
};
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info};

/// Attribute listing the element identifiers that trigger an action mapping.
pub const TRIGGER_ELEMENTS: &str = "triggerElements";

/// Exports the whole application into a snapshot directory.
pub struct SnapshotWriter<'a> {
    store: &'a dyn GraphStore,
    content: &'a dyn ContentStorage,
    schema: &'a dyn SchemaRegistry,
    config: &'a DeployConfig,
    modules: &'a [Arc<dyn DeploymentModule>],
}

impl<'a> SnapshotWriter<'a> {
    /// Creates a writer over the given collaborators.
    pub fn new(
        store: &'a dyn GraphStore,
        content: &'a dyn ContentStorage,
        schema: &'a dyn SchemaRegistry,
        config: &'a DeployConfig,
    ) -> Self {
        Self {
            store,
            content,
            schema,
            config,
            modules: &[],
        }
    }

    /// Adds extension modules.
    #[must_use]
    pub fn with_modules(mut self, modules: &'a [Arc<dyn DeploymentModule>]) -> Self {
        self.modules = modules;
        self
    }

    /// Runs the export pipeline.
    pub fn write(&self, layout: &SnapshotLayout, ctx: &mut RunContext<'_>) -> DeployResult<()> {
        ctx.enter(Phase::Export(ExportPhase::Preparing));
        fs::create_dir_all(layout.root())?;
        hooks::write_defaults(layout)?;
        DeploymentManifest::for_config(self.config).write(&layout.path(MANIFEST_FILE))?;

        ctx.enter(Phase::Export(ExportPhase::Exporting));

        ctx.step("Exporting resource access grants")?;
        self.write_collection(layout, GRANTS_FILE, NodeKind::ResourceAccess)?;

        ctx.step("Exporting CORS settings")?;
        self.write_collection(layout, CORS_FILE, NodeKind::CorsSetting)?;

        ctx.step("Exporting mail templates")?;
        self.write_content(layout, NodeKind::MailTemplate, ctx)?;

        ctx.step("Exporting widgets")?;
        self.write_collection(layout, WIDGETS_FILE, NodeKind::Widget)?;

        ctx.step("Exporting localizations")?;
        self.write_collection(layout, LOCALIZATIONS_FILE, NodeKind::Localization)?;

        ctx.step("Exporting application configuration data")?;
        self.write_collection(
            layout,
            APP_CONFIG_FILE,
            NodeKind::ApplicationConfigurationData,
        )?;

        ctx.step("Exporting schema")?;
        let document = self.schema.export_schema()?;
        schema::write(layout, &document, self.config.schema_layout)?;

        ctx.step("Exporting schema grants")?;
        self.write_schema_grants(layout, ctx)?;

        ctx.step("Exporting files and folders")?;
        FileSync::new(self.store, self.content).export(layout, ctx, FileSelection::All)?;

        ctx.step("Exporting sites")?;
        self.write_linked(layout, SITES_FILE, NodeKind::Site, |writer, node, entry| {
            let pages = writer.linked_keys(&node.id, SITE_PAGE_REL)?;
            entry.insert(KEY_PAGES, pages);
            Ok(())
        })?;

        ctx.step("Exporting page paths")?;
        self.write_linked(layout, PAGE_PATHS_FILE, NodeKind::PagePath, |writer, node, entry| {
            let page = writer
                .linked_keys(&node.id, PATH_PAGE_REL)?
                .into_iter()
                .next()
                .map_or(Value::Null, Value::String);
            entry.insert(KEY_PAGE, page);
            Ok(())
        })?;

        ctx.step("Exporting parameter mappings")?;
        self.write_collection(layout, PARAMETER_MAPPING_FILE, NodeKind::ParameterMapping)?;

        ctx.step("Exporting action mappings")?;
        self.write_action_mappings(layout)?;

        ctx.step("Exporting pages")?;
        self.write_content(layout, NodeKind::Page, ctx)?;

        ctx.step("Exporting shared components")?;
        self.write_content(layout, NodeKind::SharedComponent, ctx)?;

        ctx.step("Exporting templates")?;
        self.write_content(layout, NodeKind::Template, ctx)?;

        for module in self.modules {
            ctx.step(format!("Exporting module {}", module.name()))?;
            let dir = layout.module_dir(module.name());
            fs::create_dir_all(&dir)?;
            module.export_into(self.store, &dir)?;
        }

        ctx.enter(Phase::Export(ExportPhase::Finalizing));
        info!("Export to {} complete", layout.root().display());
        Ok(())
    }

    /// Non-trashed nodes of a kind.
    fn live_nodes(&self, kind: NodeKind) -> StoreResult<Vec<StoredNode>> {
        let mut live = Vec::new();
        for node in self.store.nodes(kind)? {
            if !self.store.is_trashed(&node.id)? {
                live.push(node);
            }
        }
        Ok(live)
    }

    fn write_collection(
        &self,
        layout: &SnapshotLayout,
        file: &str,
        kind: NodeKind,
    ) -> DeployResult<()> {
        self.write_linked(layout, file, kind, |_, _, _| Ok(()))
    }

    /// Writes the entries of one kind, letting `extend` add derived fields.
    fn write_linked<F>(
        &self,
        layout: &SnapshotLayout,
        file: &str,
        kind: NodeKind,
        mut extend: F,
    ) -> DeployResult<()>
    where
        F: FnMut(&Self, &StoredNode, &mut ExportEntry) -> StoreResult<()>,
    {
        let mut entries = Vec::new();
        for node in self.live_nodes(kind)? {
            let mut entry = ExportEntry::from_node(self.store, &node)?;
            extend(self, &node, &mut entry)?;
            entries.push(entry);
        }
        sort_entries(&mut entries, kind.key_attribute());
        debug!("{} {kind} entries", entries.len());
        write_json(&layout.path(file), &entries)?;
        Ok(())
    }

    /// Sorted natural keys of the targets of `rel_type` relationships.
    fn linked_keys(&self, source: &NodeId, rel_type: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for rel in self.store.outgoing_relationships(source)? {
            if rel.rel_type != rel_type {
                continue;
            }
            if let Some(key) = self
                .store
                .node(&rel.target_id)?
                .and_then(|target| target.natural_key().map(str::to_string))
            {
                keys.push(key);
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn write_action_mappings(&self, layout: &SnapshotLayout) -> DeployResult<()> {
        let mut entries = Vec::new();
        for node in self.live_nodes(NodeKind::ActionMapping)? {
            if !self.has_live_trigger(&node)? {
                debug!("Skipping action mapping {} without live triggers", node.id);
                continue;
            }
            entries.push(ExportEntry::from_node(self.store, &node)?);
        }
        sort_entries(&mut entries, NodeKind::ActionMapping.key_attribute());
        write_json(&layout.path(ACTION_MAPPING_FILE), &entries)?;
        Ok(())
    }

    fn has_live_trigger(&self, node: &StoredNode) -> StoreResult<bool> {
        let triggers = node
            .attributes
            .get(TRIGGER_ELEMENTS)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect::<Vec<_>>())
            .unwrap_or_default();
        for trigger in triggers {
            if !self.store.is_trashed(&NodeId::new(trigger))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Schema grants name their single principal instead of listing grantees.
    fn write_schema_grants(
        &self,
        layout: &SnapshotLayout,
        ctx: &mut RunContext<'_>,
    ) -> DeployResult<()> {
        let mut entries = Vec::new();
        for node in self.live_nodes(NodeKind::SchemaGrant)? {
            let principal = match node.grants.first() {
                Some(grant) => self
                    .store
                    .principal(&grant.principal)?
                    .map(|p| (p.name, permission_names(&grant.permissions))),
                None => None,
            };
            let Some((name, allowed)) = principal else {
                ctx.ledger.unreachable_grant(format!(
                    "Schema grant {} has no reachable principal, not exported",
                    node.id
                ));
                continue;
            };
            let mut entry = ExportEntry::from_node(self.store, &node)?;
            entry.remove(KEY_GRANTEES);
            entry.insert("principal", json!({ "name": name }));
            entry.insert("allowed", allowed);
            entries.push(entry);
        }
        sort_entries(&mut entries, NodeKind::SchemaGrant.key_attribute());
        write_json(&layout.path(SCHEMA_GRANTS_FILE), &entries)?;
        Ok(())
    }

    /// Writes a content kind: metadata file plus one side-car file per unit.
    ///
    /// The side-car directory is cleared first so it mirrors the store.
    fn write_content(
        &self,
        layout: &SnapshotLayout,
        kind: NodeKind,
        ctx: &mut RunContext<'_>,
    ) -> DeployResult<()> {
        let Some((file, dir)) = content_paths(kind) else {
            return Ok(());
        };
        let dir = layout.path(dir);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let nodes = self.live_nodes(kind)?;
        let mut name_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for node in &nodes {
            if let Some(name) = node.attr_str("name") {
                *name_counts.entry(name).or_insert(0) += 1;
            }
        }

        let mut entries = Vec::new();
        for node in &nodes {
            let clash = node
                .attr_str("name")
                .is_some_and(|name| name_counts.get(name).copied().unwrap_or(0) > 1);
            let file_name = content_file_name(node, clash);
            let body = node.body.as_deref().unwrap_or("");
            if let Err(e) = fs::write(dir.join(&file_name), body) {
                ctx.ledger
                    .file_problem(format!("Cannot write {file_name}: {e}"));
                continue;
            }

            let mut entry = ExportEntry::from_node(self.store, node)?;
            entry.insert(KEY_CONTENT_FILE, file_name);
            if kind.is_structural() {
                if let Some(target) = self.link_target(&node.id)? {
                    entry.insert(KEY_LINK_TARGET, target);
                }
            }
            entries.push(entry);
        }

        sort_entries(&mut entries, kind.key_attribute());
        write_json(&layout.path(file), &entries)?;
        Ok(())
    }

    fn link_target(&self, source: &NodeId) -> StoreResult<Option<String>> {
        let mut targets = Vec::new();
        for rel in self.store.outgoing_relationships(source)? {
            if rel.rel_type != LINK_REL {
                continue;
            }
            if let Some(key) = self.store.node(&rel.target_id)?.as_ref().and_then(target_key) {
                targets.push(key);
            }
        }
        targets.sort();
        Ok(targets.into_iter().next())
    }
}

//! Snapshot reader (full import).
//!
//! Validates the snapshot, runs the pre-deploy hook and imports every
//! present stage in the same order the writer produces them. Stages whose
//! source file is absent are skipped. Structural content is only deleted
//! when its side-car directory exists in the snapshot, so a mistyped source
//! path never wipes a live application.

use crate::config::DeployConfig;
use crate::context::{ImportPhase, Phase, RunContext};
use crate::entry::{
    parse_permissions, reference_name, upsert_node, ExportEntry, KEY_CONTENT_FILE,
    KEY_LINK_TARGET, KEY_PAGE, KEY_PAGES, PATH_PAGE_REL, SITE_PAGE_REL,
};
use crate::error::{DeployError, DeployResult};
use crate::file_sync::FileSync;
use crate::gate::{self, GateVerdict};
use crate::hooks;
use crate::json::read_json;
use crate::layout::{
    content_paths, SnapshotLayout, ACTION_MAPPING_FILE, APP_CONFIG_FILE, CORS_FILE, FILES_FILE,
    GRANTS_FILE, LOCALIZATIONS_FILE, MANIFEST_FILE, PAGE_PATHS_FILE, PARAMETER_MAPPING_FILE,
    POST_HOOK_FILE, PRE_HOOK_FILE, SCHEMA_DIR, SCHEMA_GRANTS_FILE, SITES_FILE, WIDGETS_FILE,
};
use crate::ledger::WarningLedger;
use crate::legacy;
use crate::manifest::DeploymentManifest;
use crate::module::DeploymentModule;
use crate::principal::resolve_or_record;
use crate::schema;
use serde_json::Value;
use snapdeploy_store::{
    ContentStorage, Grant, GraphStore, NodeId, NodeKind, RelationshipRecord, SchemaRegistry,
    ScriptHost, StoreResult, TxOptions,
};
use std::fs;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Imports a snapshot directory into the live store.
pub struct SnapshotReader<'a> {
    store: &'a dyn GraphStore,
    content: &'a dyn ContentStorage,
    schema: &'a dyn SchemaRegistry,
    scripts: &'a dyn ScriptHost,
    config: &'a DeployConfig,
    modules: &'a [Arc<dyn DeploymentModule>],
    extend_existing: bool,
}

impl<'a> SnapshotReader<'a> {
    /// Creates a reader over the given collaborators.
    pub fn new(
        store: &'a dyn GraphStore,
        content: &'a dyn ContentStorage,
        schema: &'a dyn SchemaRegistry,
        scripts: &'a dyn ScriptHost,
        config: &'a DeployConfig,
    ) -> Self {
        Self {
            store,
            content,
            schema,
            scripts,
            config,
            modules: &[],
            extend_existing: false,
        }
    }

    /// Adds extension modules.
    #[must_use]
    pub fn with_modules(mut self, modules: &'a [Arc<dyn DeploymentModule>]) -> Self {
        self.modules = modules;
        self
    }

    /// Extends the live schema instead of replacing it.
    #[must_use]
    pub fn extend_existing(mut self, extend: bool) -> Self {
        self.extend_existing = extend;
        self
    }

    /// Checks that `layout` holds an importable snapshot.
    ///
    /// Nothing in the live store is touched.
    pub fn validate(&self, layout: &SnapshotLayout) -> DeployResult<(GateVerdict, bool)> {
        if !layout.has_recognized_content() {
            return Err(DeployError::NoDeploymentFiles {
                path: layout.root().to_path_buf(),
            });
        }
        let manifest = DeploymentManifest::read(&layout.path(MANIFEST_FILE))?;
        let verdict = gate::check(manifest.as_ref(), self.config)?;
        let legacy_dom = manifest
            .as_ref()
            .map_or(true, DeploymentManifest::is_legacy_dom_visibility);
        Ok((verdict, legacy_dom))
    }

    /// Runs the import pipeline and returns the gate advisories.
    pub fn read(
        &self,
        layout: &SnapshotLayout,
        ctx: &mut RunContext<'_>,
    ) -> DeployResult<Vec<String>> {
        ctx.enter(Phase::Import(ImportPhase::Validating));
        let (verdict, legacy_dom) = self.validate(layout)?;
        for advisory in &verdict.advisories {
            info!("{advisory}");
        }
        ctx.set_legacy_dom_visibility(legacy_dom);

        ctx.enter(Phase::Import(ImportPhase::PreHook));
        ctx.check_cancelled()?;
        hooks::run(self.scripts, layout, PRE_HOOK_FILE)
            .map_err(|e| DeployError::hook_failed(PRE_HOOK_FILE, e.to_string()))?;

        ctx.enter(Phase::Import(ImportPhase::Importing));
        self.import_stages(layout, ctx)?;

        ctx.enter(Phase::Import(ImportPhase::DeferredLinking));
        ctx.step("Linking deferred references")?;
        let stats = ctx
            .deferred
            .resolve(self.store, &mut ctx.ledger)
            .map_err(|e| DeployError::stage("deferred linking", e))?;
        debug!(resolved = stats.resolved, broken = stats.broken, "Links");

        ctx.enter(Phase::Import(ImportPhase::PostHook));
        ctx.check_cancelled()?;
        if let Err(e) = hooks::run(self.scripts, layout, POST_HOOK_FILE) {
            ctx.ledger
                .notice(format!("{POST_HOOK_FILE} failed: {e}"));
        }

        ctx.enter(Phase::Import(ImportPhase::Migrating));
        ctx.step("Migrating schema")?;
        self.schema
            .migrate()
            .map_err(|e| DeployError::stage("schema migration", e))?;

        ctx.enter(Phase::Import(ImportPhase::Reporting));
        info!("Import from {} complete", layout.root().display());
        Ok(verdict.advisories)
    }

    fn import_stages(&self, layout: &SnapshotLayout, ctx: &mut RunContext<'_>) -> DeployResult<()> {
        if layout.exists(GRANTS_FILE) {
            ctx.step("Importing resource access grants")?;
            self.import_collection(layout, GRANTS_FILE, NodeKind::ResourceAccess, ctx, |entry| {
                if legacy::apply_grant_flags(entry) {
                    debug!("Converted legacy grant flags of {:?}", entry.str("signature"));
                }
            })?;
        }
        if layout.exists(CORS_FILE) {
            ctx.step("Importing CORS settings")?;
            self.import_collection(layout, CORS_FILE, NodeKind::CorsSetting, ctx, |_| {})?;
        }
        self.import_content(layout, NodeKind::MailTemplate, "Importing mail templates", ctx)?;
        if layout.exists(WIDGETS_FILE) {
            ctx.step("Importing widgets")?;
            self.import_collection(layout, WIDGETS_FILE, NodeKind::Widget, ctx, |_| {})?;
        }
        if layout.exists(LOCALIZATIONS_FILE) {
            ctx.step("Importing localizations")?;
            self.import_collection(layout, LOCALIZATIONS_FILE, NodeKind::Localization, ctx, |_| {})?;
        }
        if layout.exists(APP_CONFIG_FILE) {
            ctx.step("Importing application configuration data")?;
            self.import_collection(
                layout,
                APP_CONFIG_FILE,
                NodeKind::ApplicationConfigurationData,
                ctx,
                |_| {},
            )?;
        }
        if layout.exists(SCHEMA_DIR) {
            ctx.step("Importing schema")?;
            if let Some(document) = schema::read(layout, &mut ctx.ledger)? {
                self.schema
                    .import_schema(&document, self.extend_existing)
                    .map_err(|e| DeployError::stage("schema import", e))?;
            }
        }
        if layout.exists(SCHEMA_GRANTS_FILE) {
            ctx.step("Importing schema grants")?;
            self.import_schema_grants(layout, ctx)?;
        }
        if layout.exists(FILES_FILE) {
            ctx.step("Importing files and folders")?;
            FileSync::new(self.store, self.content).import(layout, ctx)?;
        }
        self.import_content(layout, NodeKind::SharedComponent, "Importing shared components", ctx)?;
        self.import_content(layout, NodeKind::Template, "Importing templates", ctx)?;
        self.import_content(layout, NodeKind::Page, "Importing pages", ctx)?;
        if layout.exists(SITES_FILE) {
            ctx.step("Importing sites")?;
            self.import_linked(layout, SITES_FILE, NodeKind::Site, KEY_PAGES, SITE_PAGE_REL, ctx)?;
        }
        if layout.exists(PAGE_PATHS_FILE) {
            ctx.step("Importing page paths")?;
            self.import_linked(layout, PAGE_PATHS_FILE, NodeKind::PagePath, KEY_PAGE, PATH_PAGE_REL, ctx)?;
        }
        if layout.exists(PARAMETER_MAPPING_FILE) {
            ctx.step("Importing parameter mappings")?;
            self.import_collection(
                layout,
                PARAMETER_MAPPING_FILE,
                NodeKind::ParameterMapping,
                ctx,
                |_| {},
            )?;
        }
        if layout.exists(ACTION_MAPPING_FILE) {
            ctx.step("Importing action mappings")?;
            self.import_collection(layout, ACTION_MAPPING_FILE, NodeKind::ActionMapping, ctx, |_| {})?;
        }
        for module in self.modules {
            let dir = layout.module_dir(module.name());
            if dir.is_dir() {
                ctx.step(format!("Importing module {}", module.name()))?;
                module.import_from(self.store, &dir)?;
            }
        }
        Ok(())
    }

    /// Runs `work` in one transaction, attributing failures to `stage`.
    fn stage(
        &self,
        stage: &'static str,
        work: &mut dyn FnMut() -> StoreResult<()>,
    ) -> DeployResult<()> {
        self.store
            .transaction(TxOptions::default(), work)
            .map_err(|e| DeployError::stage(stage, e))
    }

    /// Replaces every node of `kind` with the entries of `file`.
    fn import_collection<F>(
        &self,
        layout: &SnapshotLayout,
        file: &str,
        kind: NodeKind,
        ctx: &mut RunContext<'_>,
        mut convert: F,
    ) -> DeployResult<()>
    where
        F: FnMut(&mut ExportEntry),
    {
        let entries: Vec<ExportEntry> = read_json(&layout.path(file))?;
        let legacy_dom = ctx.legacy_dom_visibility();
        let ledger = &mut ctx.ledger;

        self.stage("collection import", &mut || {
            let removed = self.store.delete_nodes(kind)?;
            debug!("Removed {removed} {kind} nodes");
            for entry in &entries {
                let mut entry = entry.clone();
                convert(&mut entry);
                let node = entry.into_new_node(kind, self.store, ledger, legacy_dom)?;
                self.store.create_node(node)?;
            }
            Ok(())
        })?;
        info!("Imported {} {kind} entries", entries.len());
        Ok(())
    }

    /// Imports a content kind with side-car files.
    fn import_content(
        &self,
        layout: &SnapshotLayout,
        kind: NodeKind,
        step: &str,
        ctx: &mut RunContext<'_>,
    ) -> DeployResult<()> {
        let Some((file, dir_name)) = content_paths(kind) else {
            return Ok(());
        };
        if !layout.exists(file) {
            return Ok(());
        }
        ctx.step(step)?;

        let entries: Vec<ExportEntry> = read_json(&layout.path(file))?;
        let dir = layout.path(dir_name);
        let replace = dir.is_dir();
        if !replace {
            warn!(
                "{dir_name}/ is missing, existing {kind} nodes are kept and only updated"
            );
        }
        let legacy_dom = ctx.legacy_dom_visibility();
        let ledger = &mut ctx.ledger;
        let deferred = &mut ctx.deferred;

        self.stage("content import", &mut || {
            if replace {
                let removed = self.store.delete_nodes(kind)?;
                debug!("Removed {removed} {kind} nodes");
            }
            for entry in &entries {
                let mut entry = entry.clone();
                let content_file = entry.take_str(KEY_CONTENT_FILE);
                let link_target = entry.take_str(KEY_LINK_TARGET);

                let body = match &content_file {
                    Some(name) => match fs::read_to_string(dir.join(name)) {
                        Ok(body) => body,
                        Err(_) => {
                            ledger.missing_source_file(format!("{dir_name}/{name}"));
                            continue;
                        }
                    },
                    None => {
                        ledger.missing_source_file(format!(
                            "{dir_name}/ entry {} has no content file",
                            entry.id().unwrap_or("?")
                        ));
                        continue;
                    }
                };

                let mut node = entry.into_new_node(kind, self.store, ledger, legacy_dom)?;
                node.body = Some(body);
                let id = upsert_node(self.store, node)?;
                if let Some(target) = link_target {
                    deferred.record(id, target);
                }
            }
            Ok(())
        })
    }

    /// Imports sites or page paths and re-links them to pages by name.
    fn import_linked(
        &self,
        layout: &SnapshotLayout,
        file: &str,
        kind: NodeKind,
        key: &str,
        rel_type: &str,
        ctx: &mut RunContext<'_>,
    ) -> DeployResult<()> {
        let entries: Vec<ExportEntry> = read_json(&layout.path(file))?;
        let legacy_dom = ctx.legacy_dom_visibility();
        let ledger = &mut ctx.ledger;

        self.stage("linked import", &mut || {
            self.store.delete_nodes(kind)?;
            for entry in &entries {
                let mut entry = entry.clone();
                let pages: Vec<String> = match entry.remove(key) {
                    Some(Value::String(name)) => vec![name],
                    Some(Value::Array(names)) => names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                    _ => Vec::new(),
                };
                let node = entry.into_new_node(kind, self.store, ledger, legacy_dom)?;
                let id = self.store.create_node(node)?;
                self.link_pages(&id, &pages, rel_type, ledger)?;
            }
            Ok(())
        })
    }

    fn link_pages(
        &self,
        source: &NodeId,
        pages: &[String],
        rel_type: &str,
        ledger: &mut WarningLedger,
    ) -> StoreResult<()> {
        for name in pages {
            match self.store.find_by_key(NodeKind::Page, name)?.first() {
                Some(page) => self.store.create_relationship(&RelationshipRecord::new(
                    source.clone(),
                    page.id.clone(),
                    rel_type,
                ))?,
                None => ledger.broken_link(format!(
                    "{source} refers to page '{name}', which does not exist"
                )),
            }
        }
        Ok(())
    }

    /// Imports schema grants, dropping those whose principal cannot be resolved.
    fn import_schema_grants(
        &self,
        layout: &SnapshotLayout,
        ctx: &mut RunContext<'_>,
    ) -> DeployResult<()> {
        let entries: Vec<ExportEntry> = read_json(&layout.path(SCHEMA_GRANTS_FILE))?;
        let ledger = &mut ctx.ledger;

        self.stage("schema grant import", &mut || {
            self.store.delete_nodes(NodeKind::SchemaGrant)?;
            for entry in &entries {
                let mut entry = entry.clone();
                let schema_type = entry.str("schemaType").unwrap_or("?").to_string();
                let name = entry.remove("principal").as_ref().and_then(reference_name);
                let allowed = parse_permissions(entry.remove("allowed").as_ref());

                let principal = match &name {
                    Some(name) => resolve_or_record(self.store, name, ledger)?,
                    None => None,
                };
                let Some(principal) = principal else {
                    ledger.unreachable_grant(format!(
                        "Grant on {schema_type} for '{}' skipped, principal not found",
                        name.as_deref().unwrap_or("")
                    ));
                    continue;
                };

                let mut node = entry.into_new_node(NodeKind::SchemaGrant, self.store, ledger, false)?;
                node.grants = vec![Grant {
                    principal: principal.id,
                    permissions: allowed,
                }];
                self.store.create_node(node)?;
            }
            Ok(())
        })
    }
}

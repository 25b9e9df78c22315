//! Full export/import through the deployment service.

use parking_lot::{Mutex, RwLock};
use proptest::prelude::*;
use serde_json::Value;
use snapdeploy_core::files::*;
use snapdeploy_core::{
    CancelHandle, DeployConfig, DeployResult, DeploymentModule, FileSelection, FileSync,
    MemoryProgress, Operation, Phase, ProgressEvent, RunContext, SchemaLayout, SnapshotLayout,
    LINK_REL,
};
use snapdeploy_store::{
    ContentStorage, GraphStore, NewNode, NodeKind, PrincipalKind, SchemaRegistry,
};
use snapdeploy_testkit::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Counts pages on export and remembers what it was handed on import.
#[derive(Default)]
struct PageCountModule {
    imported: Mutex<Vec<String>>,
}

impl DeploymentModule for PageCountModule {
    fn name(&self) -> &str {
        "page-count"
    }

    fn export_into(&self, store: &dyn GraphStore, dir: &Path) -> DeployResult<()> {
        let pages = store.nodes(NodeKind::Page)?.len();
        fs::write(dir.join("count.txt"), pages.to_string())?;
        Ok(())
    }

    fn import_from(&self, _store: &dyn GraphStore, dir: &Path) -> DeployResult<()> {
        let count = fs::read_to_string(dir.join("count.txt"))?;
        self.imported.lock().push(count);
        Ok(())
    }
}

fn target_with_principals() -> TestDeployment {
    let env = TestDeployment::new();
    env.store.add_principal("alice", PrincipalKind::User);
    env.store.add_principal("admins", PrincipalKind::Group);
    env
}

#[test]
fn export_writes_the_snapshot_layout() {
    let (env, _) = TestDeployment::populated();
    let dir = SnapshotDir::new();

    let outcome = env.service().export(dir.path());
    assert!(outcome.is_success(), "{}", outcome.message);

    for entry in [
        MANIFEST_FILE,
        PRE_HOOK_FILE,
        POST_HOOK_FILE,
        GRANTS_FILE,
        CORS_FILE,
        SCHEMA_GRANTS_FILE,
        FILES_FILE,
        PAGES_FILE,
        COMPONENTS_FILE,
        TEMPLATES_FILE,
        SITES_FILE,
        PAGE_PATHS_FILE,
        ACTION_MAPPING_FILE,
        PARAMETER_MAPPING_FILE,
        MAIL_TEMPLATES_FILE,
        WIDGETS_FILE,
        LOCALIZATIONS_FILE,
        APP_CONFIG_FILE,
        "pages/index.html",
        "pages/about.html",
        "files/assets/logo.png",
        "files/docs/readme.txt",
        "schema/types/Project.json",
        "schema/methods/Project/archive.js",
        "schema/functions.json",
        "schema/functions/cleanup.js",
    ] {
        assert!(dir.join(entry).exists(), "{entry} missing");
    }

    assert_eq!(dir.read("pages/index.html"), "<html>index</html>");
    let sites = dir.read_json(SITES_FILE);
    assert_eq!(sites[0]["pages"], serde_json::json!(["about", "index"]));
    let paths = dir.read_json(PAGE_PATHS_FILE);
    assert_eq!(paths[0]["page"], "index");

    let pages = dir.read_json(PAGES_FILE);
    let index = pages
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == "index")
        .unwrap();
    assert_eq!(index["owner"]["name"], "alice");
    assert_eq!(index["grantees"][0]["name"], "admins");
    assert_eq!(index["contentFile"], "index.html");

    let components = dir.read_json(COMPONENTS_FILE);
    assert_eq!(components[0]["linkTarget"], "about");
    let templates = dir.read_json(TEMPLATES_FILE);
    assert_eq!(templates[0]["linkTarget"], "/assets/logo.png");
}

#[test]
fn exporting_twice_is_byte_identical() {
    let (env, _) = TestDeployment::populated();
    let dir = SnapshotDir::new();
    let service = env.service();

    assert!(service.export(dir.path()).is_success());
    let first = tree_digest(dir.path());
    assert!(service.export(dir.path()).is_success());
    let second = tree_digest(dir.path());

    assert_eq!(first, second);
}

#[test]
fn json_output_is_sorted_and_newline_terminated() {
    let (env, _) = TestDeployment::populated();
    let dir = SnapshotDir::new();
    assert!(env.service().export(dir.path()).is_success());

    let text = dir.read(PAGES_FILE);
    assert!(text.ends_with('\n'));
    let names: Vec<String> = dir
        .read_json(PAGES_FILE)
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["about", "index"]);

    // keys inside one entry are sorted as well
    let first_entry = text.lines().skip(2).take(3).collect::<Vec<_>>();
    let mut sorted = first_entry.clone();
    sorted.sort();
    assert_eq!(first_entry, sorted);
}

#[test]
fn unchanged_files_are_not_rewritten() {
    let (env, fixture) = TestDeployment::populated();
    let dir = SnapshotDir::new();
    let layout = SnapshotLayout::new(dir.path());
    let sink = MemoryProgress::new();
    let cancel = CancelHandle::new();
    let phase = RwLock::new(Phase::Idle);
    let sync = FileSync::new(env.store.as_ref(), env.store.as_ref());

    let mut ctx = RunContext::begin(Operation::Export, dir.path(), &sink, &cancel, &phase);
    let first = sync.export(&layout, &mut ctx, FileSelection::All).unwrap();
    assert_eq!(first.written, 2);

    let second = sync.export(&layout, &mut ctx, FileSelection::All).unwrap();
    assert_eq!(second.written, 0);
    assert_eq!(second.unchanged, 2);

    let mut changed = LOGO_BYTES.to_vec();
    changed.push(b'!');
    env.store.write(&fixture.logo, &changed).unwrap();
    let third = sync.export(&layout, &mut ctx, FileSelection::All).unwrap();
    assert_eq!(third.written, 1);
    assert_eq!(third.unchanged, 1);
    assert_eq!(std::fs::read(dir.join("files/assets/logo.png")).unwrap(), changed);
}

#[test]
fn similar_file_names_keep_their_own_content() {
    let files = [("/a b.txt", "one"), ("/a_b.txt", "two"), ("/a.b.txt", "three")];
    let source = TestDeployment::new();
    for (path, content) in files {
        let id = source
            .store
            .create_node(NewNode::new(NodeKind::File).with_attr("path", path))
            .unwrap();
        source.store.write(&id, content.as_bytes()).unwrap();
    }
    let dir = SnapshotDir::new();
    assert!(source.service().export(dir.path()).is_success());
    assert_eq!(dir.read("files/a%20b.txt"), "one");
    assert_eq!(dir.read("files/a_b.txt"), "two");

    let target = TestDeployment::new();
    let summary = target.service().run_import(dir.path(), false).unwrap();
    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
    for (path, content) in files {
        let file = &target.store.find_by_key(NodeKind::File, path).unwrap()[0];
        assert_eq!(target.store.read(&file.id).unwrap(), content.as_bytes(), "{path}");
    }
}

#[test]
fn case_only_differences_are_reported_on_export() {
    let env = TestDeployment::new();
    for path in ["/Readme.md", "/README.md"] {
        env.store
            .create_node(NewNode::new(NodeKind::File).with_attr("path", path))
            .unwrap();
    }
    let dir = SnapshotDir::new();
    let layout = SnapshotLayout::new(dir.path());
    let sink = MemoryProgress::new();
    let cancel = CancelHandle::new();
    let phase = RwLock::new(Phase::Idle);
    let sync = FileSync::new(env.store.as_ref(), env.store.as_ref());

    let mut ctx = RunContext::begin(Operation::Export, dir.path(), &sink, &cancel, &phase);
    let stats = sync.export(&layout, &mut ctx, FileSelection::All).unwrap();

    assert_eq!(stats.listed.len(), 2);
    assert_eq!(ctx.ledger.file_problems().len(), 1);
    assert!(ctx.ledger.file_problems()[0].contains("case"));
}

#[test]
fn stale_files_are_pruned() {
    let (env, fixture) = TestDeployment::populated();
    let dir = SnapshotDir::new();
    let service = env.service();
    assert!(service.export(dir.path()).is_success());
    dir.write("files/orphan.bin", b"old");

    env.store.trash(&fixture.readme);
    assert!(service.export(dir.path()).is_success());

    assert!(!dir.join("files/orphan.bin").exists());
    assert!(!dir.join("files/docs/readme.txt").exists());
    assert!(dir.join("files/assets/logo.png").exists());
}

#[test]
fn service_export_leaves_unchanged_files_alone() {
    let (env, _) = TestDeployment::populated();
    let dir = SnapshotDir::new();
    let service = env.service();
    assert!(service.export(dir.path()).is_success());
    let files_only = |root: &Path| {
        tree_mtimes(root)
            .into_iter()
            .filter(|(name, _)| name.starts_with("files/"))
            .collect::<Vec<_>>()
    };
    let before = files_only(dir.path());
    assert_eq!(before.len(), 2);

    assert!(service.export(dir.path()).is_success());
    assert_eq!(files_only(dir.path()), before);
}

#[test]
fn modules_get_their_own_directory() {
    let (source, _) = TestDeployment::populated();
    let exporter = Arc::new(PageCountModule::default());
    let dir = SnapshotDir::new();
    let outcome = source.service().with_module(exporter.clone()).export(dir.path());
    assert!(outcome.is_success(), "{}", outcome.message);
    assert_eq!(dir.read("modules/page-count/count.txt"), "2");
    assert!(exporter.imported.lock().is_empty());

    let importer = Arc::new(PageCountModule::default());
    let target = target_with_principals();
    let outcome = target
        .service()
        .with_module(importer.clone())
        .import(dir.path(), false);
    assert!(outcome.is_success(), "{}", outcome.message);
    assert_eq!(*importer.imported.lock(), vec!["2".to_string()]);
}

#[test]
fn module_without_directory_is_not_imported() {
    let (source, _) = TestDeployment::populated();
    let dir = SnapshotDir::new();
    assert!(source.service().export(dir.path()).is_success());

    let importer = Arc::new(PageCountModule::default());
    let target = target_with_principals();
    let outcome = target
        .service()
        .with_module(importer.clone())
        .import(dir.path(), false);
    assert!(outcome.is_success(), "{}", outcome.message);
    assert!(importer.imported.lock().is_empty());
}

#[test]
fn round_trip_restores_the_application() {
    let (source, _) = TestDeployment::populated();
    let dir = SnapshotDir::new();
    assert!(source.service().export(dir.path()).is_success());

    let target = target_with_principals();
    let summary = target.service().run_import(dir.path(), false).unwrap();
    assert!(
        summary.warnings.is_empty(),
        "unexpected warnings: {:?}",
        summary.warnings
    );
    assert!(summary.advisories.is_empty());

    for kind in NodeKind::ALL {
        assert_eq!(
            target.store.node_count(kind),
            source.store.node_count(kind),
            "{kind} count differs"
        );
    }

    let index = &target.store.find_by_key(NodeKind::Page, "index").unwrap()[0];
    assert_eq!(index.body.as_deref(), Some("<html>index</html>"));
    let alice = &target.store.find_principals("alice").unwrap()[0];
    assert_eq!(index.owner.as_ref(), Some(&alice.id));
    assert_eq!(index.grants.len(), 1);
    assert!(index.visibility.public);

    let about = &target.store.find_by_key(NodeKind::Page, "about").unwrap()[0];
    assert!(!about.visibility.public);
    assert!(about.visibility.authenticated);

    let header = &target.store.find_by_key(NodeKind::SharedComponent, "header").unwrap()[0];
    let links = target.store.outgoing_relationships(&header.id).unwrap();
    assert!(links
        .iter()
        .any(|r| r.rel_type == LINK_REL && r.target_id == about.id));

    assert_eq!(target.store.relationships_of_type(SITE_PAGE_REL).len(), 2);
    let routes = target.store.relationships_of_type(PATH_PAGE_REL);
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].target_id, index.id);

    let logo = &target
        .store
        .find_by_key(NodeKind::File, "/assets/logo.png")
        .unwrap()[0];
    assert_eq!(target.store.read(&logo.id).unwrap(), LOGO_BYTES);

    let schema = target.schema.export_schema().unwrap();
    assert_eq!(schema["types"][0]["name"], "Project");
    assert_eq!(
        schema["types"][0]["methods"][0]["source"],
        "{ $.this.archived = true; }"
    );
    assert_eq!(target.schema.migration_count(), 1);
}

#[test]
fn aggregate_schema_layout_round_trips() {
    let (source, _) = TestDeployment::populated();
    let source = source.with_config(DeployConfig::new().with_schema_layout(SchemaLayout::Aggregate));
    let dir = SnapshotDir::new();
    assert!(source.service().export(dir.path()).is_success());
    assert!(dir.join("schema/schema.json").exists());
    assert!(!dir.join("schema/types").exists());

    let target = target_with_principals();
    assert!(target.service().import(dir.path(), false).is_success());
    assert_eq!(
        target.schema.export_schema().unwrap()["methods"][0]["name"],
        "cleanup"
    );
}

#[test]
fn reimport_into_the_source_keeps_counts_stable() {
    let (env, _) = TestDeployment::populated();
    let dir = SnapshotDir::new();
    let service = env.service();
    assert!(service.export(dir.path()).is_success());
    let before: Vec<usize> = NodeKind::ALL.iter().map(|k| env.store.node_count(*k)).collect();

    assert!(service.import(dir.path(), false).is_success());
    assert!(service.import(dir.path(), false).is_success());

    let after: Vec<usize> = NodeKind::ALL.iter().map(|k| env.store.node_count(*k)).collect();
    assert_eq!(before, after);
}

#[test]
fn action_mappings_without_live_triggers_are_not_exported() {
    let (env, fixture) = TestDeployment::populated();
    env.store.trash(&fixture.header);
    let dir = SnapshotDir::new();
    assert!(env.service().export(dir.path()).is_success());

    assert_eq!(dir.read_json(ACTION_MAPPING_FILE), Value::Array(Vec::new()));
    assert!(dir.read_json(COMPONENTS_FILE).as_array().unwrap().is_empty());
}

#[test]
fn progress_stream_brackets_the_run() {
    let (env, _) = TestDeployment::populated();
    let dir = SnapshotDir::new();
    assert!(env.service().export(dir.path()).is_success());

    let events = env.progress.events();
    assert!(matches!(events.first(), Some(ProgressEvent::Begin { .. })));
    assert!(matches!(events.last(), Some(ProgressEvent::End { .. })));
    let steps = env.progress.steps();
    let pages = steps.iter().position(|s| s == "Exporting pages").unwrap();
    let grants = steps
        .iter()
        .position(|s| s == "Exporting resource access grants")
        .unwrap();
    assert!(grants < pages);
    assert!(events.iter().all(|e| e.operation() == Operation::Export));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn page_bodies_survive_a_round_trip(
        name in content_name_strategy(),
        body in "<p>[a-z ]{0,40}</p>",
    ) {
        let source = TestDeployment::new();
        source
            .store
            .create_node(
                NewNode::new(NodeKind::Page)
                    .with_attr("name", name.as_str())
                    .with_body(body.as_str()),
            )
            .unwrap();
        let dir = SnapshotDir::new();
        prop_assert!(source.service().export(dir.path()).is_success());

        let target = TestDeployment::new();
        prop_assert!(target.service().import(dir.path(), false).is_success());
        let pages = target.store.find_by_key(NodeKind::Page, &name).unwrap();
        prop_assert_eq!(pages.len(), 1);
        prop_assert_eq!(pages[0].body.as_deref(), Some(body.as_str()));
    }
}

//! Data-only export and import.

use proptest::prelude::*;
use serde_json::json;
use snapdeploy_core::files::*;
use snapdeploy_core::{DataImportOptions, DeployConfig, DeployError, ProgressEvent};
use snapdeploy_store::{ContentStorage, GraphStore, NewNode, NodeId, NodeKind, RelationshipRecord};
use snapdeploy_testkit::prelude::*;

fn chunk_progress(events: &[ProgressEvent], of_type: &str) -> Vec<(u64, u64)> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Chunk {
                type_name,
                processed,
                total,
                ..
            } if type_name == of_type => Some((*processed, *total)),
            _ => None,
        })
        .collect()
}

#[test]
fn chunk_events_follow_the_chunk_size() {
    for (count, expected) in [
        (4usize, vec![(4u64, 4u64)]),
        (5, vec![(4, 5), (5, 5)]),
        (9, vec![(4, 9), (8, 9), (9, 9)]),
    ] {
        let env = TestDeployment::new().with_config(DeployConfig::new().with_chunk_size(4));
        populate_records(&env.store, "Project", "p", count);
        let dir = SnapshotDir::new();

        assert!(env.service().export_data(dir.path(), "Project").is_success());

        let events = env.progress.events();
        assert_eq!(chunk_progress(&events, "Project"), expected, "{count} records");
    }
}

#[test]
fn relationship_export_reports_chunks() {
    let env = TestDeployment::new().with_config(DeployConfig::new().with_chunk_size(4));
    let projects = populate_records(&env.store, "Project", "p", 5);
    let customers = populate_records(&env.store, "Customer", "c", 2);
    link_records(&env.store, &projects, &customers);
    let dir = SnapshotDir::new();

    assert!(env
        .service()
        .export_data(dir.path(), "Project,Customer")
        .is_success());

    let events = env.progress.events();
    assert_eq!(chunk_progress(&events, "OWNS"), vec![(4, 5), (5, 5)]);
    assert_eq!(dir.read_json("relationships/OWNS.json").as_array().unwrap().len(), 5);
}

#[test]
fn export_writes_one_file_per_type() {
    let env = TestDeployment::new();
    populate_records(&env.store, "Project", "p", 3);
    populate_records(&env.store, "Customer", "c", 2);
    let dir = SnapshotDir::new();

    let outcome = env.service().export_data(dir.path(), " Customer , Project ");
    assert!(outcome.is_success(), "{}", outcome.message);

    assert!(dir.join(MANIFEST_FILE).exists());
    let projects = dir.read_json("nodes/Project.json");
    assert_eq!(projects.as_array().unwrap().len(), 3);
    assert_eq!(projects[0]["id"], "p-000");
    assert_eq!(projects[0]["type"], "Project");
    assert_eq!(projects[0]["title"], "Project 0");
    assert_eq!(dir.read_json("nodes/Customer.json")[1]["id"], "c-001");
}

#[test]
fn empty_type_list_is_rejected() {
    let env = TestDeployment::new();
    let dir = SnapshotDir::new();

    let err = env.service().run_export_data(dir.path(), " , ").unwrap_err();
    assert!(matches!(err, DeployError::NoTypes));
    assert_eq!(env.service().export_data(dir.path(), "").status, 400);
}

#[test]
fn relationships_need_both_ends_exported() {
    let env = TestDeployment::new();
    let projects = populate_records(&env.store, "Project", "p", 3);
    let customers = populate_records(&env.store, "Customer", "c", 2);
    link_records(&env.store, &projects, &customers);

    let partial = SnapshotDir::new();
    assert!(env.service().export_data(partial.path(), "Project").is_success());
    assert!(!partial.join("relationships/OWNS.json").exists());
    assert!(!partial.join("nodes/Customer.json").exists());

    let full = SnapshotDir::new();
    assert!(env
        .service()
        .export_data(full.path(), "Project,Customer")
        .is_success());
    let rows = full.read_json("relationships/OWNS.json");
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[0],
        json!({ "relType": "OWNS", "sourceId": "p-000", "targetId": "c-000" })
    );
    assert_eq!(rows[2]["targetId"], "c-000");
}

#[test]
fn data_round_trip_replaces_relationship_types() {
    let source = TestDeployment::new();
    let projects = populate_records(&source.store, "Project", "p", 3);
    let customers = populate_records(&source.store, "Customer", "c", 2);
    link_records(&source.store, &projects, &customers);
    let dir = SnapshotDir::new();
    assert!(source
        .service()
        .export_data(dir.path(), "Project,Customer")
        .is_success());

    let target = TestDeployment::new();
    let stale = populate_records(&target.store, "Customer", "c", 2);
    target
        .store
        .create_relationship(&RelationshipRecord::new(
            stale[1].clone(),
            stale[0].clone(),
            OWNS_REL,
        ))
        .unwrap();

    let summary = target
        .service()
        .run_import_data(dir.path(), DataImportOptions::default())
        .unwrap();

    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
    assert_eq!(target.store.count_records("Project").unwrap(), 3);
    assert_eq!(target.store.count_records("Customer").unwrap(), 2);
    let mut imported = target.store.relationships_of_type(OWNS_REL);
    imported.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    let mut expected = source.store.relationships_of_type(OWNS_REL);
    expected.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    assert_eq!(imported, expected);
}

#[test]
fn missing_endpoints_are_counted_not_fatal() {
    let dir = SnapshotDir::new();
    dir.write("nodes/Project.json", json!([{ "id": "p-1", "type": "Project" }]).to_string());
    dir.write(
        "relationships/OWNS.json",
        json!([
            { "sourceId": "p-1", "targetId": "ghost", "relType": "OWNS" },
            { "sourceId": "nobody", "targetId": "p-1", "relType": "OWNS" },
            { "sourceId": "p-1", "relType": "OWNS" }
        ])
        .to_string(),
    );
    let target = TestDeployment::new();

    let summary = target
        .service()
        .run_import_data(dir.path(), DataImportOptions::default())
        .unwrap();

    assert!(summary.warnings.has("Relationship import problems"));
    assert!(summary.warnings.has("Skipped items"));
    assert_eq!(target.store.count_records("Project").unwrap(), 1);
    assert!(target.store.relationships_of_type("OWNS").is_empty());
    let published = target.progress.warnings();
    assert!(published.iter().any(|(title, message)| {
        title == "Relationship import problems"
            && message.contains("1 with missing source")
            && message.contains("1 with missing target")
    }));
}

#[test]
fn records_without_identifier_are_skipped() {
    let dir = SnapshotDir::new();
    dir.write(
        "nodes/Project.json",
        json!([{ "title": "anonymous" }, { "id": "p-2", "title": "named" }]).to_string(),
    );
    let target = TestDeployment::new();

    let summary = target
        .service()
        .run_import_data(dir.path(), DataImportOptions::default())
        .unwrap();

    assert!(summary.warnings.has("Skipped items"));
    // the type falls back to the file name
    assert_eq!(target.store.count_records("Project").unwrap(), 1);
}

#[test]
fn file_types_go_through_file_sync() {
    let (source, _) = TestDeployment::populated();
    let dir = SnapshotDir::new();
    assert!(source.service().export_data(dir.path(), "File").is_success());

    assert!(dir.join(FILES_FILE).exists());
    assert!(dir.join(FOLDERS_FILE).exists());
    assert_eq!(
        std::fs::read(dir.join("files/assets/logo.png")).unwrap(),
        LOGO_BYTES
    );

    let target = TestDeployment::new();
    let summary = target
        .service()
        .run_import_data(dir.path(), DataImportOptions::default())
        .unwrap();

    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
    assert_eq!(target.store.node_count(NodeKind::File), 2);
    assert_eq!(target.store.node_count(NodeKind::Folder), 2);
    let readme = &target
        .store
        .find_by_key(NodeKind::File, "/docs/readme.txt")
        .unwrap()[0];
    assert_eq!(target.store.read(&readme.id).unwrap(), README_BYTES);
}

fn create_path_node(env: &TestDeployment, kind: NodeKind, path: &str) -> NodeId {
    env.store
        .create_node(NewNode::new(kind).with_attr(kind.key_attribute(), path))
        .unwrap()
}

#[test]
fn file_export_only_relates_what_it_listed() {
    let env = TestDeployment::new();
    let folder = create_path_node(&env, NodeKind::Folder, "/a");
    let unrelated = create_path_node(&env, NodeKind::Folder, "/z");
    let file = create_path_node(&env, NodeKind::File, "/a/x.txt");
    let old = create_path_node(&env, NodeKind::File, "/a/old.txt");
    env.store.write(&file, b"x").unwrap();
    env.store.trash(&old);
    for (source, target, rel_type) in [
        (&file, &folder, "IN_FOLDER"),
        (&old, &folder, "IN_FOLDER"),
        (&file, &unrelated, "TAGGED"),
        (&file, &old, "TAGGED"),
    ] {
        env.store
            .create_relationship(&RelationshipRecord::new(
                source.clone(),
                target.clone(),
                rel_type,
            ))
            .unwrap();
    }
    let dir = SnapshotDir::new();

    assert!(env.service().export_data(dir.path(), "File").is_success());

    assert!(!dir.join("relationships/TAGGED.json").exists());
    let rows = dir.read_json("relationships/IN_FOLDER.json");
    assert_eq!(
        rows,
        json!([{ "relType": "IN_FOLDER", "sourceId": file.as_str(), "targetId": folder.as_str() }])
    );

    let target = TestDeployment::new();
    let summary = target
        .service()
        .run_import_data(dir.path(), DataImportOptions::default())
        .unwrap();
    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
    assert_eq!(target.store.relationships_of_type("IN_FOLDER").len(), 1);
    assert_eq!(target.store.node_count(NodeKind::Folder), 1);
}

#[test]
fn type_names_map_to_distinct_files() {
    let env = TestDeployment::new();
    populate_records(&env.store, "Line Item", "s", 1);
    populate_records(&env.store, "Line_Item", "u", 2);
    let dir = SnapshotDir::new();

    assert!(env
        .service()
        .export_data(dir.path(), "Line Item,Line_Item")
        .is_success());
    assert_eq!(dir.read_json("nodes/Line%20Item.json").as_array().unwrap().len(), 1);
    assert_eq!(dir.read_json("nodes/Line_Item.json").as_array().unwrap().len(), 2);

    let target = TestDeployment::new();
    assert!(target
        .service()
        .import_data(dir.path(), DataImportOptions::default())
        .is_success());
    assert_eq!(target.store.count_records("Line Item").unwrap(), 1);
    assert_eq!(target.store.count_records("Line_Item").unwrap(), 2);
}

#[test]
fn escaped_file_name_is_the_fallback_type() {
    let dir = SnapshotDir::new();
    dir.write("nodes/Line%20Item.json", json!([{ "id": "l-1" }]).to_string());
    let target = TestDeployment::new();

    assert!(target
        .service()
        .import_data(dir.path(), DataImportOptions::default())
        .is_success());
    assert_eq!(target.store.count_records("Line Item").unwrap(), 1);
}

#[test]
fn import_options_reach_every_transaction() {
    let source = TestDeployment::new();
    let projects = populate_records(&source.store, "Project", "p", 5);
    link_records(&source.store, &projects, &projects[..1]);
    let dir = SnapshotDir::new();
    assert!(source.service().export_data(dir.path(), "Project").is_success());

    let options = DataImportOptions {
        inner_callbacks: false,
        outer_callbacks: true,
        cascading_delete: true,
    };
    let target = TestDeployment::new().with_config(DeployConfig::new().with_chunk_size(2));
    assert!(target.service().import_data(dir.path(), options).is_success());

    let seen = target.store.transaction_options();
    // three record chunks, the relationship delete and three relationship chunks
    assert_eq!(seen.len(), 7);
    assert!(seen.iter().all(|tx| *tx == options.tx_options()));
}

#[test]
fn directory_without_data_is_refused() {
    let dir = SnapshotDir::new();
    dir.write("notes.txt", "nothing to see");
    let target = TestDeployment::new();

    let outcome = target
        .service()
        .import_data(dir.path(), DataImportOptions::default());

    assert_eq!(outcome.status, 400);
    assert_eq!(outcome.title, "Invalid deployment path");
    assert_eq!(target.store.commit_count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn records_survive_a_data_round_trip(records in records_strategy("Item", 30)) {
        let source = TestDeployment::new().with_config(DeployConfig::new().with_chunk_size(7));
        for record in &records {
            source.store.upsert_record(record.clone()).unwrap();
        }
        let dir = SnapshotDir::new();
        prop_assert!(source.service().export_data(dir.path(), "Item").is_success());

        let target = TestDeployment::new().with_config(DeployConfig::new().with_chunk_size(7));
        prop_assert!(target
            .service()
            .import_data(dir.path(), DataImportOptions::default())
            .is_success());

        let imported = target.store.records("Item", 0, usize::MAX).unwrap();
        prop_assert_eq!(imported, source.store.records("Item", 0, usize::MAX).unwrap());
    }

    #[test]
    fn any_type_name_gets_its_own_file(type_name in type_name_strategy()) {
        prop_assume!(type_name != "File" && type_name != "Folder");
        let env = TestDeployment::new();
        populate_records(&env.store, &type_name, "r", 2);
        let dir = SnapshotDir::new();

        prop_assert!(env.service().export_data(dir.path(), &type_name).is_success());
        let rows = dir.read_json(&format!("nodes/{type_name}.json"));
        prop_assert_eq!(rows.as_array().map(Vec::len), Some(2));
        prop_assert_eq!(&rows[0]["type"], &json!(type_name));
    }
}

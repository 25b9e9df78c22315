//! Test fixtures: a sample application and a ready-wired service.

use serde_json::{json, Value};
use snapdeploy_core::{
    DeployConfig, DeploymentService, ExclusivityGuard, MemoryProgress, LINK_REL,
};
use snapdeploy_store::{
    ContentStorage, DataRecord, GraphStore, InMemorySchema, InMemoryStore, NewNode, NodeId,
    NodeKind, Permission, PrincipalKind, RecordingScriptHost, RelationshipRecord, Visibility,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Relationship from a site to its pages.
pub const SITE_PAGE_REL: &str = "CONTAINS_PAGE";
/// Relationship from a page path to its page.
pub const PATH_PAGE_REL: &str = "ROUTES_TO";
/// Relationship between sample data records.
pub const OWNS_REL: &str = "OWNS";

/// Content of the sample logo file.
pub const LOGO_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nlogo";
/// Content of the sample readme file.
pub const README_BYTES: &[u8] = b"read me\n";

/// Identifiers of the nodes created by [`populate_application`].
#[derive(Debug, Clone)]
pub struct AppFixture {
    /// User `alice`.
    pub alice: NodeId,
    /// Group `admins`.
    pub admins: NodeId,
    /// Page `index`.
    pub index: NodeId,
    /// Page `about`.
    pub about: NodeId,
    /// Shared component `header`, linked to `about`.
    pub header: NodeId,
    /// Template `main`, linked to the logo file.
    pub main_template: NodeId,
    /// File `/assets/logo.png`.
    pub logo: NodeId,
    /// File `/docs/readme.txt`.
    pub readme: NodeId,
    /// Action mapping `save`, triggered by `header`.
    pub save_action: NodeId,
}

/// A schema document with one type, one method and one global function.
#[must_use]
pub fn sample_schema() -> Value {
    json!({
        "types": [
            {
                "name": "Project",
                "properties": [{ "name": "title", "type": "String" }],
                "methods": [
                    { "name": "archive", "source": "{ $.this.archived = true; }" }
                ]
            }
        ],
        "methods": [
            { "name": "cleanup", "source": "{ $.log('cleanup'); }" }
        ]
    })
}

fn node(kind: NodeKind, key: &str) -> NewNode {
    NewNode::new(kind).with_attr(kind.key_attribute(), key)
}

fn link(store: &InMemoryStore, source: &NodeId, target: &NodeId, rel_type: &str) {
    store
        .create_relationship(&RelationshipRecord::new(
            source.clone(),
            target.clone(),
            rel_type,
        ))
        .expect("Failed to create relationship");
}

/// Fills `store` with one node of every exportable kind.
pub fn populate_application(store: &InMemoryStore) -> AppFixture {
    let alice = store.add_principal("alice", PrincipalKind::User);
    let admins = store.add_principal("admins", PrincipalKind::Group);
    let create = |n: NewNode| store.create_node(n).expect("Failed to create node");

    let index = create(
        node(NodeKind::Page, "index")
            .with_attr("position", 0)
            .with_visibility(Visibility::new(true, true))
            .with_owner(alice.clone())
            .with_grant(admins.clone(), vec![Permission::Read, Permission::Write])
            .with_body("<html>index</html>"),
    );
    let about = create(
        node(NodeKind::Page, "about")
            .with_attr("position", 1)
            .with_visibility(Visibility::new(false, true))
            .with_body("<html>about</html>"),
    );
    let header = create(node(NodeKind::SharedComponent, "header").with_body("<header/>"));
    let main_template = create(node(NodeKind::Template, "main").with_body("<main/>"));

    create(node(NodeKind::Folder, "/assets"));
    create(node(NodeKind::Folder, "/docs"));
    let logo = create(node(NodeKind::File, "/assets/logo.png").with_attr("contentType", "image/png"));
    let readme = create(node(NodeKind::File, "/docs/readme.txt").with_attr("contentType", "text/plain"));
    store.write(&logo, LOGO_BYTES).expect("Failed to write content");
    store.write(&readme, README_BYTES).expect("Failed to write content");

    link(store, &header, &about, LINK_REL);
    link(store, &main_template, &logo, LINK_REL);

    let site = create(node(NodeKind::Site, "main-site").with_attr("hostname", "example.org"));
    link(store, &site, &index, SITE_PAGE_REL);
    link(store, &site, &about, SITE_PAGE_REL);
    let path = create(node(NodeKind::PagePath, "/home"));
    link(store, &path, &index, PATH_PAGE_REL);

    create(node(NodeKind::Widget, "clock").with_attr("source", "<time/>"));
    create(node(NodeKind::Localization, "greeting").with_attr("locale", "en").with_attr("localizedName", "Hello"));
    create(node(NodeKind::MailTemplate, "welcome").with_attr("locale", "en").with_body("Hello ${name}"));
    create(node(NodeKind::ApplicationConfigurationData, "theme").with_attr("content", "dark"));
    create(node(NodeKind::CorsSetting, "/api").with_attr("acceptedOrigins", "*"));
    create(
        node(NodeKind::ResourceAccess, "/api/items")
            .with_attr("flags", 17)
            .with_visibility(Visibility::new(true, true)),
    );
    create(
        node(NodeKind::SchemaGrant, "Project")
            .with_grant(admins.clone(), vec![Permission::Read]),
    );
    create(node(NodeKind::ParameterMapping, "param-title").with_attr("parameterName", "title"));
    let save_action = create(
        node(NodeKind::ActionMapping, "save")
            .with_attr("action", "update")
            .with_attr("triggerElements", json!([header.0.clone()])),
    );

    AppFixture {
        alice,
        admins,
        index,
        about,
        header,
        main_template,
        logo,
        readme,
        save_action,
    }
}

/// Adds `count` records of `type_name` with ids `<prefix>-000`, `<prefix>-001`, ...
pub fn populate_records(store: &InMemoryStore, type_name: &str, prefix: &str, count: usize) -> Vec<NodeId> {
    (0..count)
        .map(|i| {
            let id = NodeId::new(format!("{prefix}-{i:03}"));
            let mut record = DataRecord {
                id: id.clone(),
                type_name: type_name.to_string(),
                attributes: Default::default(),
            };
            record.attributes.insert("title".into(), json!(format!("{type_name} {i}")));
            record.attributes.insert("rank".into(), json!(i));
            store.upsert_record(record).expect("Failed to upsert record");
            id
        })
        .collect()
}

/// Links every `sources[i]` to `targets[i % targets.len()]` with [`OWNS_REL`].
pub fn link_records(store: &InMemoryStore, sources: &[NodeId], targets: &[NodeId]) {
    for (i, source) in sources.iter().enumerate() {
        let target = &targets[i % targets.len()];
        link(store, source, target, OWNS_REL);
    }
}

/// A live store with its collaborators and a recording progress sink.
///
/// Every fixture owns a private exclusivity guard so parallel tests do not
/// contend for the process-wide one.
pub struct TestDeployment {
    /// The live store.
    pub store: Arc<InMemoryStore>,
    /// The schema registry.
    pub schema: Arc<InMemorySchema>,
    /// The script host.
    pub scripts: Arc<RecordingScriptHost>,
    /// Collected progress events.
    pub progress: Arc<MemoryProgress>,
    /// The guard shared by every service built from this fixture.
    pub guard: Arc<ExclusivityGuard>,
    /// Configuration used by [`TestDeployment::service`].
    pub config: DeployConfig,
}

impl TestDeployment {
    /// Creates an empty deployment environment.
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            schema: Arc::new(InMemorySchema::default()),
            scripts: Arc::new(RecordingScriptHost::new()),
            progress: Arc::new(MemoryProgress::new()),
            guard: Arc::new(ExclusivityGuard::new()),
            config: DeployConfig::new(),
        }
    }

    /// Creates an environment holding the sample application and schema.
    pub fn populated() -> (Self, AppFixture) {
        let env = Self {
            schema: Arc::new(InMemorySchema::new(sample_schema())),
            ..Self::new()
        };
        let fixture = populate_application(&env.store);
        (env, fixture)
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: DeployConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds a service over this environment.
    pub fn service(&self) -> DeploymentService {
        DeploymentService::new(
            self.store.clone(),
            self.store.clone(),
            self.schema.clone(),
            self.scripts.clone(),
        )
        .with_config(self.config.clone())
        .with_progress(self.progress.clone())
        .with_guard(self.guard.clone())
    }
}

impl Default for TestDeployment {
    fn default() -> Self {
        Self::new()
    }
}

/// A temporary snapshot directory, removed on drop.
pub struct SnapshotDir {
    temp: TempDir,
}

impl SnapshotDir {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Absolute path of the directory.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Path of an entry inside the directory.
    pub fn join(&self, relative: &str) -> PathBuf {
        self.temp.path().join(relative)
    }

    /// Reads an entry as text.
    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.join(relative))
            .unwrap_or_else(|e| panic!("Failed to read {relative}: {e}"))
    }

    /// Reads a JSON entry.
    pub fn read_json(&self, relative: &str) -> Value {
        serde_json::from_str(&self.read(relative))
            .unwrap_or_else(|e| panic!("Invalid JSON in {relative}: {e}"))
    }

    /// Writes an entry, creating parent directories.
    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create directory");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }
}

impl Default for SnapshotDir {
    fn default() -> Self {
        Self::new()
    }
}

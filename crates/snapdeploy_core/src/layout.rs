//! Snapshot directory layout.
//!
//! ```text
//! <snapshot>/
//! ├─ deploy.conf                     # manifest (key=value)
//! ├─ pre-deploy.conf / post-deploy.conf
//! ├─ security/{grants,schema-grants,cors-settings}.json
//! ├─ files.json + files/             # virtual file system, checksum-synced
//! ├─ pages.json + pages/
//! ├─ components.json + components/
//! ├─ templates.json + templates/
//! ├─ sites.json, page-paths.json
//! ├─ events/{action-mapping,parameter-mapping}.json
//! ├─ schema/                         # schema.json, or types/ methods/ functions/
//! ├─ mail-templates.json + mail-templates/
//! ├─ localizations.json, widgets.json, application-configuration-data.json
//! └─ modules/<name>/                 # owned by extension modules
//! ```
//!
//! Data-only snapshots use `nodes/<Type>.json`, `relationships/<Type>.json`,
//! `files.json` + `files/` and `folders.json`.

use snapdeploy_store::{NodeKind, StoredNode};
use std::path::{Path, PathBuf};

/// Manifest file name.
pub const MANIFEST_FILE: &str = "deploy.conf";
/// Pre-import hook script.
pub const PRE_HOOK_FILE: &str = "pre-deploy.conf";
/// Post-import hook script.
pub const POST_HOOK_FILE: &str = "post-deploy.conf";
/// Resource access grants.
pub const GRANTS_FILE: &str = "security/grants.json";
/// Schema-level grants.
pub const SCHEMA_GRANTS_FILE: &str = "security/schema-grants.json";
/// CORS rules.
pub const CORS_FILE: &str = "security/cors-settings.json";
/// File and folder metadata.
pub const FILES_FILE: &str = "files.json";
/// File content root.
pub const FILES_DIR: &str = "files";
/// Page metadata.
pub const PAGES_FILE: &str = "pages.json";
/// Page markup.
pub const PAGES_DIR: &str = "pages";
/// Shared component metadata.
pub const COMPONENTS_FILE: &str = "components.json";
/// Shared component markup.
pub const COMPONENTS_DIR: &str = "components";
/// Template metadata.
pub const TEMPLATES_FILE: &str = "templates.json";
/// Template bodies.
pub const TEMPLATES_DIR: &str = "templates";
/// Sites.
pub const SITES_FILE: &str = "sites.json";
/// Routing paths.
pub const PAGE_PATHS_FILE: &str = "page-paths.json";
/// Event action mappings.
pub const ACTION_MAPPING_FILE: &str = "events/action-mapping.json";
/// Event parameter mappings.
pub const PARAMETER_MAPPING_FILE: &str = "events/parameter-mapping.json";
/// Schema directory.
pub const SCHEMA_DIR: &str = "schema";
/// Aggregate schema document inside the schema directory.
pub const SCHEMA_AGGREGATE_FILE: &str = "schema.json";
/// Per-type schema files inside the schema directory (tree mode).
pub const SCHEMA_TYPES_DIR: &str = "types";
/// Per-method source files inside the schema directory (tree mode).
pub const SCHEMA_METHODS_DIR: &str = "methods";
/// Global function sources inside the schema directory (tree mode).
pub const SCHEMA_FUNCTIONS_DIR: &str = "functions";
/// Global function index inside the schema directory (tree mode).
pub const SCHEMA_FUNCTIONS_FILE: &str = "functions.json";
/// Mail template metadata.
pub const MAIL_TEMPLATES_FILE: &str = "mail-templates.json";
/// Mail template bodies.
pub const MAIL_TEMPLATES_DIR: &str = "mail-templates";
/// Localizations.
pub const LOCALIZATIONS_FILE: &str = "localizations.json";
/// Widgets.
pub const WIDGETS_FILE: &str = "widgets.json";
/// Application configuration data.
pub const APP_CONFIG_FILE: &str = "application-configuration-data.json";
/// Extension module root.
pub const MODULES_DIR: &str = "modules";
/// Data-only node files.
pub const NODES_DIR: &str = "nodes";
/// Data-only relationship files.
pub const RELATIONSHIPS_DIR: &str = "relationships";
/// Folders pulled into a data-only snapshot to keep the directory structure.
pub const FOLDERS_FILE: &str = "folders.json";

/// Entries whose presence marks a directory as a deployment snapshot.
pub const RECOGNIZED_ENTRIES: [&str; 20] = [
    MANIFEST_FILE,
    PRE_HOOK_FILE,
    POST_HOOK_FILE,
    GRANTS_FILE,
    SCHEMA_GRANTS_FILE,
    CORS_FILE,
    FILES_FILE,
    PAGES_FILE,
    COMPONENTS_FILE,
    TEMPLATES_FILE,
    SITES_FILE,
    PAGE_PATHS_FILE,
    ACTION_MAPPING_FILE,
    PARAMETER_MAPPING_FILE,
    SCHEMA_DIR,
    MAIL_TEMPLATES_FILE,
    LOCALIZATIONS_FILE,
    WIDGETS_FILE,
    APP_CONFIG_FILE,
    NODES_DIR,
];

/// Paths of one snapshot directory.
#[derive(Debug, Clone)]
pub struct SnapshotLayout {
    root: PathBuf,
}

impl SnapshotLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the snapshot root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a layout-relative path.
    #[must_use]
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Returns true if a layout-relative entry exists.
    #[must_use]
    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    /// Returns true if the root contains at least one recognized entry.
    #[must_use]
    pub fn has_recognized_content(&self) -> bool {
        RECOGNIZED_ENTRIES.iter().any(|e| self.exists(e))
            || self.exists(RELATIONSHIPS_DIR)
            || self.exists(FILES_DIR)
    }

    /// Directory of an extension module.
    #[must_use]
    pub fn module_dir(&self, name: &str) -> PathBuf {
        self.root.join(MODULES_DIR).join(escape_file_name(name))
    }
}

/// Metadata file and content directory of a side-car content kind.
#[must_use]
pub fn content_paths(kind: NodeKind) -> Option<(&'static str, &'static str)> {
    match kind {
        NodeKind::Page => Some((PAGES_FILE, PAGES_DIR)),
        NodeKind::SharedComponent => Some((COMPONENTS_FILE, COMPONENTS_DIR)),
        NodeKind::Template => Some((TEMPLATES_FILE, TEMPLATES_DIR)),
        NodeKind::MailTemplate => Some((MAIL_TEMPLATES_FILE, MAIL_TEMPLATES_DIR)),
        _ => None,
    }
}

/// Escapes a name into a single portable file name.
///
/// Alphanumerics, `-`, `_` and `.` are kept; every other character becomes
/// `%XX` per UTF-8 byte. A trailing `.` is escaped too, so `.` and `..` never
/// come out verbatim, and the empty name becomes a lone `%`. Distinct names
/// always yield distinct file names; [`unescape_file_name`] reverses it.
#[must_use]
pub fn escape_file_name(name: &str) -> String {
    if name.is_empty() {
        return "%".to_string();
    }
    let mut out = String::with_capacity(name.len());
    let last = name.len() - 1;
    for (i, c) in name.char_indices() {
        let keep = c.is_alphanumeric() || matches!(c, '-' | '_') || (c == '.' && i != last);
        if keep {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    out
}

/// Reverses [`escape_file_name`]. Malformed escapes are kept as they are.
#[must_use]
pub fn unescape_file_name(file_name: &str) -> String {
    if file_name == "%" {
        return String::new();
    }
    let raw = file_name.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let escaped = (raw[i] == b'%')
            .then(|| file_name.get(i + 1..i + 3))
            .flatten()
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escaped {
            Some(byte) => {
                bytes.push(byte);
                i += 3;
            }
            None => {
                bytes.push(raw[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Side-car file name of a content unit.
///
/// Pages are named after their name alone; everything else carries its
/// identifier because names are neither required nor unique there.
/// `disambiguate` forces the identifier suffix for pages with clashing names.
#[must_use]
pub fn content_file_name(node: &StoredNode, disambiguate: bool) -> String {
    let fallback = match node.kind {
        NodeKind::Template => "template",
        NodeKind::MailTemplate => "mail",
        _ => "component",
    };
    let name = escape_file_name(node.attr_str("name").unwrap_or(fallback));
    if node.kind == NodeKind::Page && !disambiguate {
        format!("{name}.html")
    } else {
        format!("{name}-{}.html", escape_file_name(node.id.as_str()))
    }
}

/// Maps a virtual file system path (`/a/b.txt`) below `files/`.
///
/// Every segment is escaped with [`escape_file_name`], so two distinct
/// virtual paths never share a disk path. Empty segments are dropped.
#[must_use]
pub fn file_disk_path(files_root: &Path, virtual_path: &str) -> PathBuf {
    let mut out = files_root.to_path_buf();
    for segment in virtual_path.split('/').filter(|s| !s.is_empty()) {
        out.push(escape_file_name(segment));
    }
    out
}

//! Deployment configuration.

use snapdeploy_store::TxOptions;

/// Default number of items processed per chunk in bulk transfers.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// DOM visibility convention written by this version.
pub const DOM_VISIBILITY_CONVENTION: &str = "explicit";

/// How identifiers are represented by an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UuidFormat {
    /// Hyphenated identifiers.
    WithDashes,
    /// Compact identifiers.
    WithoutDashes,
    /// Both representations are accepted (migration state).
    Both,
}

impl UuidFormat {
    /// Returns the tag written to the manifest.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            UuidFormat::WithDashes => "withDashes",
            UuidFormat::WithoutDashes => "withoutDashes",
            UuidFormat::Both => "both",
        }
    }

    /// Parses a manifest tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "withDashes" => Some(UuidFormat::WithDashes),
            "withoutDashes" => Some(UuidFormat::WithoutDashes),
            "both" => Some(UuidFormat::Both),
            _ => None,
        }
    }
}

/// Layout of the `schema/` directory in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaLayout {
    /// One aggregate `schema/schema.json`.
    Aggregate,
    /// One file per type plus one source file per method and function.
    Tree,
}

/// Configuration for deployment operations.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Version of the running instance, recorded in and compared against manifests.
    pub product_version: String,
    /// Identifier representation of the running instance.
    pub uuid_format: UuidFormat,
    /// DOM visibility convention written to manifests.
    pub dom_visibility_convention: String,
    /// Items per chunk in bulk transfers.
    pub chunk_size: usize,
    /// How schema files are laid out on export.
    pub schema_layout: SchemaLayout,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            product_version: crate::VERSION.to_string(),
            uuid_format: UuidFormat::WithoutDashes,
            dom_visibility_convention: DOM_VISIBILITY_CONVENTION.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            schema_layout: SchemaLayout::Tree,
        }
    }
}

impl DeployConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration overlaid with `SNAPDEPLOY_*` environment variables.
    ///
    /// - `SNAPDEPLOY_CHUNK_SIZE` - items per chunk
    /// - `SNAPDEPLOY_UUID_FORMAT` - `withDashes`, `withoutDashes` or `both`
    /// - `SNAPDEPLOY_SCHEMA_LAYOUT` - `tree` or `aggregate`
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SNAPDEPLOY_CHUNK_SIZE") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg = cfg.with_chunk_size(n);
            }
        }
        if let Ok(v) = std::env::var("SNAPDEPLOY_UUID_FORMAT") {
            if let Some(format) = UuidFormat::parse(&v) {
                cfg.uuid_format = format;
            }
        }
        if let Ok(v) = std::env::var("SNAPDEPLOY_SCHEMA_LAYOUT") {
            match v.trim().to_ascii_lowercase().as_str() {
                "tree" => cfg.schema_layout = SchemaLayout::Tree,
                "aggregate" => cfg.schema_layout = SchemaLayout::Aggregate,
                _ => {}
            }
        }

        cfg
    }

    /// Sets the running product version.
    #[must_use]
    pub fn with_product_version(mut self, version: impl Into<String>) -> Self {
        self.product_version = version.into();
        self
    }

    /// Sets the identifier representation.
    #[must_use]
    pub const fn with_uuid_format(mut self, format: UuidFormat) -> Self {
        self.uuid_format = format;
        self
    }

    /// Sets the chunk size; zero is clamped to one.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Sets the schema layout.
    #[must_use]
    pub const fn with_schema_layout(mut self, layout: SchemaLayout) -> Self {
        self.schema_layout = layout;
        self
    }
}

/// Flags for data-only imports, forwarded to every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataImportOptions {
    /// Run per-node lifecycle callbacks.
    pub inner_callbacks: bool,
    /// Run callbacks after commit.
    pub outer_callbacks: bool,
    /// Cascade deletes to dependent nodes.
    pub cascading_delete: bool,
}

impl Default for DataImportOptions {
    fn default() -> Self {
        let tx = TxOptions::default();
        Self {
            inner_callbacks: tx.inner_callbacks,
            outer_callbacks: tx.outer_callbacks,
            cascading_delete: tx.cascading_delete,
        }
    }
}

impl DataImportOptions {
    /// Returns the transaction options for these flags.
    #[must_use]
    pub fn tx_options(self) -> TxOptions {
        TxOptions {
            inner_callbacks: self.inner_callbacks,
            outer_callbacks: self.outer_callbacks,
            cascading_delete: self.cascading_delete,
        }
    }
}

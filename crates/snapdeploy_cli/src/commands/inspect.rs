//! Inspect command implementation.

use serde::Serialize;
use serde_json::Value;
use snapdeploy_core::files::*;
use snapdeploy_core::{check_manifest, unescape_file_name, DeployConfig, DeploymentManifest};
use std::fs;
use std::path::Path;

const LISTED_FILES: &[&str] = &[
    GRANTS_FILE,
    CORS_FILE,
    SCHEMA_GRANTS_FILE,
    MAIL_TEMPLATES_FILE,
    WIDGETS_FILE,
    LOCALIZATIONS_FILE,
    APP_CONFIG_FILE,
    FILES_FILE,
    FOLDERS_FILE,
    COMPONENTS_FILE,
    TEMPLATES_FILE,
    PAGES_FILE,
    SITES_FILE,
    PAGE_PATHS_FILE,
    PARAMETER_MAPPING_FILE,
    ACTION_MAPPING_FILE,
];

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Snapshot path.
    pub path: String,
    /// Whether a manifest file is present.
    pub has_manifest: bool,
    /// Product version that wrote the snapshot.
    pub product_version: Option<String>,
    /// Identifier representation tag.
    pub uuid_representation_tag: Option<String>,
    /// Visibility convention tag.
    pub dom_visibility_convention: Option<String>,
    /// Whether this instance would accept the snapshot.
    pub importable: bool,
    /// Gate advisories, or the rejection reason.
    pub notes: Vec<String>,
    /// Item counts of the listing files present.
    pub entries: Vec<EntryStats>,
}

/// Item count of one listing file.
#[derive(Debug, Serialize)]
pub struct EntryStats {
    /// Listing file, or `nodes/<Type>` and `relationships/<Type>`.
    pub name: String,
    /// Number of items.
    pub items: usize,
}

/// Runs the inspect command.
pub fn run(dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !dir.is_dir() {
        return Err(format!("No snapshot directory at {:?}", dir).into());
    }

    let manifest = DeploymentManifest::read(&dir.join(MANIFEST_FILE))?;
    let (importable, notes) = match check_manifest(manifest.as_ref(), &DeployConfig::from_env()) {
        Ok(verdict) => (true, verdict.advisories),
        Err(e) => (false, vec![e.to_string()]),
    };

    let manifest = manifest.unwrap_or_default();
    let result = InspectResult {
        path: dir.display().to_string(),
        has_manifest: dir.join(MANIFEST_FILE).exists(),
        product_version: manifest.product_version,
        uuid_representation_tag: manifest.uuid_representation_tag,
        dom_visibility_convention: manifest.dom_visibility_convention,
        importable,
        notes,
        entries: collect_entries(dir)?,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn collect_entries(dir: &Path) -> Result<Vec<EntryStats>, Box<dyn std::error::Error>> {
    let mut entries = Vec::new();
    for name in LISTED_FILES {
        if let Some(items) = count_items(&dir.join(name))? {
            entries.push(EntryStats {
                name: (*name).to_string(),
                items,
            });
        }
    }
    for sub in [NODES_DIR, RELATIONSHIPS_DIR] {
        let sub_dir = dir.join(sub);
        if !sub_dir.is_dir() {
            continue;
        }
        let mut names: Vec<String> = fs::read_dir(&sub_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".json"))
            .collect();
        names.sort();
        for name in names {
            if let Some(items) = count_items(&sub_dir.join(&name))? {
                let stem = name.strip_suffix(".json").unwrap_or(&name);
                entries.push(EntryStats {
                    name: format!("{sub}/{}", unescape_file_name(stem)),
                    items,
                });
            }
        }
    }
    Ok(entries)
}

fn count_items(path: &Path) -> Result<Option<usize>, Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Ok(None);
    }
    let value: Value = serde_json::from_slice(&fs::read(path)?)?;
    Ok(Some(value.as_array().map_or(0, Vec::len)))
}

fn print_text_output(result: &InspectResult) {
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    println!("Snapshot: {}", result.path);
    println!();
    println!("Manifest:");
    if result.has_manifest {
        println!("  Product version:      {}", or_dash(&result.product_version));
        println!("  UUID representation:  {}", or_dash(&result.uuid_representation_tag));
        println!("  Visibility:           {}", or_dash(&result.dom_visibility_convention));
    } else {
        println!("  (none, legacy snapshot)");
    }
    println!();
    println!(
        "Importable: {}",
        if result.importable { "yes" } else { "no" }
    );
    for note in &result.notes {
        println!("  - {note}");
    }

    if !result.entries.is_empty() {
        println!();
        println!("Entries:");
        for entry in &result.entries {
            println!("  {:<40} {:>8}", entry.name, entry.items);
        }
    }
}

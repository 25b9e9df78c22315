//! Store and schema files shared by the export and import commands.

use serde_json::Value;
use snapdeploy_core::{DeployConfig, DeploymentService, OperationOutcome};
use snapdeploy_store::{InMemorySchema, InMemoryStore, RecordingScriptHost};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A store image loaded from disk, with its optional schema document.
pub struct Session {
    store_path: PathBuf,
    schema_path: Option<PathBuf>,
    store: Arc<InMemoryStore>,
    schema: Arc<InMemorySchema>,
    scripts: Arc<RecordingScriptHost>,
}

impl Session {
    /// Loads the store image and schema; missing files start empty.
    pub fn open(store_path: &Path, schema_path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let store = if store_path.exists() {
            InMemoryStore::load(store_path)?
        } else {
            info!("No store image at {}, starting empty", store_path.display());
            InMemoryStore::new()
        };

        let schema = match schema_path {
            Some(path) if path.exists() => {
                let document: Value = serde_json::from_slice(&fs::read(path)?)?;
                InMemorySchema::new(document)
            }
            _ => InMemorySchema::default(),
        };

        Ok(Self {
            store_path: store_path.to_path_buf(),
            schema_path: schema_path.map(Path::to_path_buf),
            store: Arc::new(store),
            schema: Arc::new(schema),
            scripts: Arc::new(RecordingScriptHost::new()),
        })
    }

    /// Builds a deployment service over the loaded store.
    ///
    /// Configuration comes from the `SNAPDEPLOY_*` environment variables.
    pub fn service(&self) -> DeploymentService {
        DeploymentService::new(
            self.store.clone(),
            self.store.clone(),
            self.schema.clone(),
            self.scripts.clone(),
        )
        .with_config(DeployConfig::from_env())
    }

    /// Writes the store image, and the schema document if one was given.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        for (name, _) in self.scripts.runs() {
            warn!("{name} was not executed: no script engine attached");
        }
        self.store.save(&self.store_path)?;
        if let Some(path) = &self.schema_path {
            fs::write(path, serde_json::to_vec_pretty(&self.schema.document())?)?;
        }
        info!("Saved store image to {}", self.store_path.display());
        Ok(())
    }
}

/// Prints an operation outcome and turns a failure into an error.
pub fn report(outcome: &OperationOutcome) -> Result<(), Box<dyn std::error::Error>> {
    if !outcome.is_success() {
        return Err(format!("{} ({}): {}", outcome.title, outcome.status, outcome.message).into());
    }

    println!("{}", outcome.message);
    if let Some(summary) = &outcome.summary {
        for advisory in &summary.advisories {
            println!("  advisory: {advisory}");
        }
        for entry in &summary.warnings.entries {
            println!("  warning: {}: {}", entry.title, entry.message);
        }
    }
    Ok(())
}

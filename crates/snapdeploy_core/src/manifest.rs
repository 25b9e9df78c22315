//! Deployment manifest (`deploy.conf`).
//!
//! One manifest per snapshot, stored as `key=value` lines:
//!
//! ```text
//! domVisibilityConvention=explicit
//! productVersion=0.3.0
//! uuidRepresentationTag=withoutDashes
//! ```
//!
//! Missing keys mark a legacy snapshot and are not an error.

use crate::config::DeployConfig;
use crate::error::DeployResult;
use std::fs;
use std::path::Path;

const KEY_PRODUCT_VERSION: &str = "productVersion";
const KEY_UUID_TAG: &str = "uuidRepresentationTag";
const KEY_DOM_VISIBILITY: &str = "domVisibilityConvention";

/// Facts about the instance a snapshot was exported from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentManifest {
    /// Product version of the exporting instance.
    pub product_version: Option<String>,
    /// Identifier representation of the exporting instance.
    pub uuid_representation_tag: Option<String>,
    /// DOM visibility convention of the exporting instance.
    pub dom_visibility_convention: Option<String>,
}

impl DeploymentManifest {
    /// Builds the manifest describing the running instance.
    #[must_use]
    pub fn for_config(config: &DeployConfig) -> Self {
        Self {
            product_version: Some(config.product_version.clone()),
            uuid_representation_tag: Some(config.uuid_format.tag().to_string()),
            dom_visibility_convention: Some(config.dom_visibility_convention.clone()),
        }
    }

    /// Returns true if the manifest carries no DOM visibility convention.
    #[must_use]
    pub fn is_legacy_dom_visibility(&self) -> bool {
        self.dom_visibility_convention.is_none()
    }

    /// Encodes the manifest as sorted `key=value` lines.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        let pairs = [
            (KEY_DOM_VISIBILITY, &self.dom_visibility_convention),
            (KEY_PRODUCT_VERSION, &self.product_version),
            (KEY_UUID_TAG, &self.uuid_representation_tag),
        ];
        for (key, value) in pairs {
            if let Some(value) = value {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push('\n');
            }
        }
        out
    }

    /// Decodes `key=value` lines; blank lines, `#` comments and unknown keys are skipped.
    #[must_use]
    pub fn decode(text: &str) -> Self {
        let mut manifest = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                KEY_PRODUCT_VERSION => manifest.product_version = Some(value.to_string()),
                KEY_UUID_TAG => manifest.uuid_representation_tag = Some(value.to_string()),
                KEY_DOM_VISIBILITY => {
                    manifest.dom_visibility_convention = Some(value.to_string())
                }
                _ => {}
            }
        }
        manifest
    }

    /// Reads the manifest at `path`; `None` when the file does not exist.
    pub fn read(path: &Path) -> DeployResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        Ok(Some(Self::decode(&text)))
    }

    /// Writes the manifest to `path`.
    pub fn write(&self, path: &Path) -> DeployResult<()> {
        fs::write(path, self.encode())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_sorted_and_stable() {
        let manifest = DeploymentManifest {
            product_version: Some("5.1.0".into()),
            uuid_representation_tag: Some("withDashes".into()),
            dom_visibility_convention: Some("explicit".into()),
        };
        assert_eq!(
            manifest.encode(),
            "domVisibilityConvention=explicit\nproductVersion=5.1.0\nuuidRepresentationTag=withDashes\n"
        );
        assert_eq!(DeploymentManifest::decode(&manifest.encode()), manifest);
    }

    #[test]
    fn missing_fields_mean_legacy() {
        let manifest = DeploymentManifest::decode("# old export\nproductVersion=3.4\n");
        assert_eq!(manifest.product_version.as_deref(), Some("3.4"));
        assert!(manifest.uuid_representation_tag.is_none());
        assert!(manifest.is_legacy_dom_visibility());
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let manifest = DeploymentManifest::decode("no equals sign\nunknown=1\nproductVersion=\n");
        assert_eq!(manifest, DeploymentManifest::default());
    }

    #[test]
    fn absent_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.conf");
        assert!(DeploymentManifest::read(&path).unwrap().is_none());

        DeploymentManifest::for_config(&DeployConfig::default())
            .write(&path)
            .unwrap();
        assert!(DeploymentManifest::read(&path).unwrap().is_some());
    }
}

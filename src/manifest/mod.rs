//! Plugin Manifest Module
//!
//! Defines the on-disk plugin manifest shape and handles reading and
//! validating `manifest.json` from a plugin directory.

use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the manifest inside a plugin directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Plugin metadata surfaced to the host and to UI clients.
///
/// Immutable after registration: the registry keeps the manifest parsed at
/// load time and never re-fetches it from the running plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Stable, URL-safe identifier; must equal the plugin directory name.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Semantic version.
    pub version: String,
    /// Short description shown in listings.
    #[serde(default)]
    pub description: String,
    /// Symbolic icon name.
    #[serde(default)]
    pub icon: String,
    /// Accent color.
    #[serde(default)]
    pub color: String,
    /// Declared permission tokens. The host records them; it does not
    /// enforce them.
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Error type for manifest reading and validation.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Failed to read the manifest file
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the manifest JSON
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    /// Manifest contents failed validation
    #[error("manifest validation failed: {0}")]
    Validation(String),
}

/// Returns true when `id` is non-empty and URL-safe (alphanumeric, `-`, `_`).
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl Manifest {
    /// Parse a manifest from a JSON string and validate it.
    pub fn from_json(contents: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(contents)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read `manifest.json` from a plugin directory.
    ///
    /// `dir_id` is the plugin directory name, which is the canonical id: if
    /// the file declares a different id, the directory name wins and a
    /// warning is logged.
    pub fn load(plugin_dir: &Path, dir_id: &str) -> Result<Self, ManifestError> {
        let contents = fs::read_to_string(plugin_dir.join(MANIFEST_FILE))?;
        let mut manifest: Manifest = serde_json::from_str(&contents)?;

        if manifest.id != dir_id {
            warn!(
                "manifest id '{}' does not match directory name '{}'; using the directory name",
                manifest.id, dir_id
            );
            manifest.id = dir_id.to_owned();
        }

        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if !is_valid_id(&self.id) {
            return Err(ManifestError::Validation(format!(
                "plugin id '{}' is empty or not URL-safe",
                self.id
            )));
        }

        if self.name.is_empty() {
            return Err(ManifestError::Validation(
                "plugin name cannot be empty".into(),
            ));
        }

        if self.version.is_empty() {
            return Err(ManifestError::Validation(
                "plugin version cannot be empty".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_manifest() {
        let manifest_json = r##"{
            "id": "notes",
            "name": "Notes",
            "version": "1.0.0",
            "description": "Quick notes",
            "icon": "note-symbolic",
            "color": "#3584e4",
            "permissions": ["storage"]
        }"##;

        let manifest = Manifest::from_json(manifest_json).expect("manifest should parse");

        assert_eq!(manifest.id, "notes");
        assert_eq!(manifest.name, "Notes");
        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(manifest.permissions, vec!["storage"]);
    }

    #[test]
    fn test_optional_fields_default() {
        let manifest_json = r#"{"id": "notes", "name": "Notes", "version": "0.1.0"}"#;

        let manifest = Manifest::from_json(manifest_json).expect("manifest should parse");

        assert!(manifest.description.is_empty());
        assert!(manifest.icon.is_empty());
        assert!(manifest.permissions.is_empty());
    }

    #[test]
    fn test_empty_name_rejected() {
        let manifest_json = r#"{"id": "notes", "name": "", "version": "0.1.0"}"#;

        let result = Manifest::from_json(manifest_json);

        assert!(matches!(result, Err(ManifestError::Validation(_))));
    }

    #[test]
    fn test_unsafe_id_rejected() {
        let manifest_json = r#"{"id": "../escape", "name": "Bad", "version": "0.1.0"}"#;

        let result = Manifest::from_json(manifest_json);

        assert!(matches!(result, Err(ManifestError::Validation(_))));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let result = Manifest::from_json("{not json");

        assert!(matches!(result, Err(ManifestError::Parse(_))));
    }

    #[test]
    fn test_id_validity() {
        assert!(is_valid_id("finance-tracker"));
        assert!(is_valid_id("notes_v2"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("has space"));
        assert!(!is_valid_id("slash/id"));
    }
}

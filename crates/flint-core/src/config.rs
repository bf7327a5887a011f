//! Workspace configuration (spec §6, `[ADDED 4.13]`): `.flint-note/config.yml`.
//! Grounded on the teacher's `config::StoreConfig` load/save shape, with
//! `serde_yaml` in place of the teacher's `toml` since this system's
//! on-disk format is YAML.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FlintError, Result};

pub const CONFIG_FILE_NAME: &str = "config.yml";
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    pub name: String,
    pub version: String,
    pub port: u16,
    pub log_level: String,
    pub log_file: Option<String>,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        McpServerConfig {
            name: "flint-note".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            port: 0,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub index_enabled: bool,
    pub index_path: String,
    pub rebuild_on_startup: bool,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            index_enabled: true,
            index_path: ".flint-note/search.db".to_string(),
            rebuild_on_startup: false,
            max_results: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteTypesConfig {
    pub auto_create_directories: bool,
    pub require_descriptions: bool,
}

impl Default for NoteTypesConfig {
    fn default() -> Self {
        NoteTypesConfig {
            auto_create_directories: true,
            require_descriptions: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionConfig {
    pub require_confirmation: bool,
    pub create_backups: bool,
    pub backup_path: String,
    pub allow_note_type_deletion: bool,
    pub max_bulk_delete: usize,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        DeletionConfig {
            require_confirmation: true,
            create_backups: true,
            backup_path: ".flint-note/backups".to_string(),
            allow_note_type_deletion: false,
            max_bulk_delete: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub auto_linking: bool,
    pub auto_tagging: bool,
    pub content_analysis: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        FeaturesConfig {
            auto_linking: true,
            auto_tagging: false,
            content_analysis: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub restrict_to_workspace: bool,
    pub max_file_size: u64,
    pub allowed_extensions: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            restrict_to_workspace: true,
            max_file_size: 10 * 1024 * 1024,
            allowed_extensions: vec!["md".to_string()],
        }
    }
}

/// Resolved from Open Question 1 (spec §9 / `DESIGN.md`): renaming a note
/// never touches its body by default.
pub const DEFAULT_REWRITE_H1_ON_RENAME: bool = false;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub version: u32,
    pub workspace_root: String,
    pub default_note_type: String,
    pub mcp_server: McpServerConfig,
    pub search: SearchConfig,
    pub note_types: NoteTypesConfig,
    pub deletion: DeletionConfig,
    pub features: FeaturesConfig,
    pub security: SecurityConfig,
    pub rewrite_h1_on_rename: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            version: CURRENT_CONFIG_VERSION,
            workspace_root: ".".to_string(),
            default_note_type: "general".to_string(),
            mcp_server: McpServerConfig::default(),
            search: SearchConfig::default(),
            note_types: NoteTypesConfig::default(),
            deletion: DeletionConfig::default(),
            features: FeaturesConfig::default(),
            security: SecurityConfig::default(),
            rewrite_h1_on_rename: DEFAULT_REWRITE_H1_ON_RENAME,
        }
    }
}

impl WorkspaceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| FlintError::io("read", &path.to_path_buf(), e))?;
        let partial: serde_yaml::Value = serde_yaml::from_str(&content)?;
        Ok(Self::default().merged_with(partial))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FlintError::io("create", &parent.to_path_buf(), e))?;
        }
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).map_err(|e| FlintError::io("write", &path.to_path_buf(), e))?;
        Ok(())
    }

    /// Deep-merge a raw YAML document onto the default config (spec §9):
    /// unspecified keys keep their default, nested objects merge
    /// key-by-key, arrays replace wholesale.
    fn merged_with(self, overlay: serde_yaml::Value) -> Self {
        let base = serde_yaml::to_value(&self).unwrap_or(serde_yaml::Value::Null);
        let merged = deep_merge(base, overlay);
        serde_yaml::from_value(merged).unwrap_or(self)
    }
}

fn deep_merge(base: serde_yaml::Value, overlay: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value;
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Mapping(base_map)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = WorkspaceConfig::load(&dir.path().join("config.yml")).unwrap();
        assert_eq!(config, WorkspaceConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let mut config = WorkspaceConfig::default();
        config.default_note_type = "journal".to_string();
        config.search.max_results = 250;
        config.save(&path).unwrap();

        let loaded = WorkspaceConfig::load(&path).unwrap();
        assert_eq!(loaded.default_note_type, "journal");
        assert_eq!(loaded.search.max_results, 250);
    }

    #[test]
    fn partial_document_deep_merges_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "search:\n  max_results: 10\ndeletion:\n  require_confirmation: false\n").unwrap();

        let config = WorkspaceConfig::load(&path).unwrap();
        assert_eq!(config.search.max_results, 10);
        assert!(config.search.index_enabled); // untouched key keeps its default
        assert!(!config.deletion.require_confirmation);
        assert!(config.deletion.create_backups); // untouched key keeps its default
    }
}

//! Global registry (`[ADDED 4.14]`, spec §1): a multi-vault map of
//! vault id → path plus a "current vault" pointer, persisted outside any
//! single workspace. Grounded on the teacher's
//! `config::global::GlobalConfig` (XDG config dir resolution, env-var
//! override for tests), with `serde_json` in place of the teacher's
//! `toml` per spec.md's "JSON/YAML file store" note.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{FlintError, Result};

const CONFIG_DIR: &str = "flint-note";
const CONFIG_FILE: &str = "registry.json";
const CONFIG_DIR_ENV_VAR: &str = "FLINT_CONFIG_DIR";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub vaults: HashMap<String, PathBuf>,
    #[serde(default)]
    pub current_vault: Option<String>,
}

impl Registry {
    fn registry_path() -> Result<PathBuf> {
        let config_dir = if let Ok(env_dir) = std::env::var(CONFIG_DIR_ENV_VAR) {
            PathBuf::from(env_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| FlintError::Io("unable to determine config directory".to_string()))?
                .join(CONFIG_DIR)
        };
        Ok(config_dir.join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        let path = Self::registry_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| FlintError::io("read", &path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::registry_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FlintError::io("create", &parent.to_path_buf(), e))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).map_err(|e| FlintError::io("write", &path, e))?;
        Ok(())
    }

    pub fn register(&mut self, vault_id: &str, path: PathBuf) {
        self.vaults.insert(vault_id.to_string(), path);
        if self.current_vault.is_none() {
            self.current_vault = Some(vault_id.to_string());
        }
    }

    pub fn unregister(&mut self, vault_id: &str) {
        self.vaults.remove(vault_id);
        if self.current_vault.as_deref() == Some(vault_id) {
            self.current_vault = None;
        }
    }

    pub fn set_current(&mut self, vault_id: &str) -> Result<()> {
        if !self.vaults.contains_key(vault_id) {
            return Err(FlintError::not_found("vault", vault_id));
        }
        self.current_vault = Some(vault_id.to_string());
        Ok(())
    }

    pub fn current_path(&self) -> Option<&PathBuf> {
        self.current_vault.as_ref().and_then(|id| self.vaults.get(id))
    }

    pub fn is_config_dir_overridden() -> bool {
        std::env::var(CONFIG_DIR_ENV_VAR).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn register_sets_current_vault_on_first_entry() {
        let mut registry = Registry::default();
        registry.register("notes", PathBuf::from("/vaults/notes"));
        assert_eq!(registry.current_vault.as_deref(), Some("notes"));
        assert_eq!(registry.current_path(), Some(&PathBuf::from("/vaults/notes")));
    }

    #[test]
    fn unregister_clears_current_only_if_it_matches() {
        let mut registry = Registry::default();
        registry.register("a", PathBuf::from("/a"));
        registry.register("b", PathBuf::from("/b"));
        registry.set_current("a").unwrap();
        registry.unregister("b");
        assert_eq!(registry.current_vault.as_deref(), Some("a"));
        registry.unregister("a");
        assert!(registry.current_vault.is_none());
    }

    #[test]
    fn set_current_rejects_unknown_vault() {
        let mut registry = Registry::default();
        assert!(registry.set_current("ghost").is_err());
    }

    #[test]
    fn save_then_load_round_trips_via_env_override() {
        let dir = tempdir().unwrap();
        // SAFETY: test-only override of a process-wide env var, scoped to
        // this test's temp directory and restored at the end.
        unsafe { std::env::set_var(CONFIG_DIR_ENV_VAR, dir.path()) };
        let mut registry = Registry::default();
        registry.register("notes", PathBuf::from("/vaults/notes"));
        registry.save().unwrap();

        let loaded = Registry::load().unwrap();
        assert_eq!(loaded.current_vault.as_deref(), Some("notes"));
        unsafe { std::env::remove_var(CONFIG_DIR_ENV_VAR) };
    }
}

use crate::errors::{RebaseStackError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default prefix used when deriving sandbox directory names.
pub const DEFAULT_SANDBOX_PREFIX: &str = "rebase-stack";

/// Default ceiling for a single test run, in seconds.
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 1800;

/// Per-repository settings for sandbox placement and validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Prefix for sandbox directory names (`.<prefix>-<branch>`).
    /// Threaded through path derivation, not just stored.
    pub sandbox_prefix: String,
    /// Maximum wall-clock time a test command may run before it is killed.
    pub test_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sandbox_prefix: DEFAULT_SANDBOX_PREFIX.to_string(),
            test_timeout_secs: DEFAULT_TEST_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Load settings from a file, falling back to defaults if it is absent
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| RebaseStackError::config(format!("Failed to read config file: {e}")))?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| RebaseStackError::config(format!("Failed to parse config file: {e}")))?;

        Ok(settings)
    }

    /// Save settings to a file as pretty-printed JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RebaseStackError::config(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RebaseStackError::config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)
            .map_err(|e| RebaseStackError::config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Load settings for a repository, using defaults when no file exists
    pub fn load_for_repo(repo_root: &Path) -> Result<Self> {
        Self::load_from_file(&config_file_path(repo_root))
    }
}

/// Get the rebase-stack configuration directory for a repository
pub fn get_repo_config_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(".rebase-stack")
}

/// Path of the settings file for a repository
pub fn config_file_path(repo_root: &Path) -> PathBuf {
    get_repo_config_dir(repo_root).join("config.json")
}

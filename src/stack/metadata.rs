use super::state::StackState;
use crate::errors::{RebaseStackError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fixed file name of the metadata record inside each sandbox
pub const METADATA_FILE: &str = ".rebase-stack.json";

/// Persisted per-sandbox record.
///
/// Immutable once written except for `state`, which is rewritten atomically
/// on each transition. The persisted state is a last-known-good checkpoint;
/// live queries override it while a rebase is actively in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackMetadata {
    /// Branch under rebase
    pub branch_name: String,
    /// Branch being rebased onto
    pub target_branch: String,
    /// When the sandbox was created
    pub created_at: DateTime<Utc>,
    /// Branch tip at sandbox creation, used to detect whether the real
    /// branch moved since the sandbox was made
    pub original_commit: String,
    /// Last checkpointed lifecycle state
    pub state: StackState,
}

impl StackMetadata {
    pub fn new(branch_name: String, target_branch: String, original_commit: String) -> Self {
        Self {
            branch_name,
            target_branch,
            created_at: Utc::now(),
            original_commit,
            state: StackState::Created,
        }
    }

    /// Path of the metadata file inside a sandbox
    pub fn file_path(sandbox_path: &Path) -> PathBuf {
        sandbox_path.join(METADATA_FILE)
    }

    /// Load the metadata record from a sandbox, `None` if absent
    pub fn load(sandbox_path: &Path) -> Result<Option<StackMetadata>> {
        let path = Self::file_path(sandbox_path);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            RebaseStackError::config(format!(
                "Failed to read stack metadata at {}: {e}",
                path.display()
            ))
        })?;

        let metadata: StackMetadata = serde_json::from_str(&content).map_err(|e| {
            RebaseStackError::config(format!(
                "Failed to parse stack metadata at {}: {e}",
                path.display()
            ))
        })?;

        Ok(Some(metadata))
    }

    /// Write the record atomically (temp file + rename) so a crash mid-write
    /// never leaves a truncated metadata file
    pub fn save(&self, sandbox_path: &Path) -> Result<()> {
        let path = Self::file_path(sandbox_path);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RebaseStackError::config(format!("Failed to serialize metadata: {e}")))?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content).map_err(RebaseStackError::Io)?;
        fs::rename(&tmp_path, &path).map_err(RebaseStackError::Io)?;

        debug!("Wrote stack metadata to {}", path.display());
        Ok(())
    }

    /// Remove the metadata record. Idempotent.
    pub fn remove(sandbox_path: &Path) -> Result<()> {
        let path = Self::file_path(sandbox_path);
        if path.exists() {
            fs::remove_file(&path).map_err(RebaseStackError::Io)?;
            debug!("Removed stack metadata at {}", path.display());
        }
        Ok(())
    }

    /// Transition the checkpointed state, enforcing the transition table.
    /// Same-state updates are silently accepted, unless the stack is
    /// already in a terminal state.
    pub fn transition(&mut self, next: StackState) -> Result<()> {
        if self.state.is_terminal() {
            return Err(RebaseStackError::precondition(format!(
                "Stack for '{}' is already {} and cannot change state",
                self.branch_name, self.state
            )));
        }
        if !self.state.can_transition_to(next) {
            return Err(RebaseStackError::precondition(format!(
                "Illegal state transition for '{}': {} -> {}",
                self.branch_name, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

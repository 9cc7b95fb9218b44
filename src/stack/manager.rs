use super::gate::{GateReport, PreApplyGate};
use super::metadata::StackMetadata;
use super::state::StackState;
use crate::config::Settings;
use crate::errors::{RebaseStackError, Result};
use crate::git::{GitRepository, RebaseOutcome};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Live view of a sandbox, recomputed on every query by merging the
/// persisted metadata with fresh adapter queries. While a rebase is
/// actively in progress the live queries override the checkpointed state.
#[derive(Debug, Clone)]
pub struct StackInfo {
    pub branch_name: String,
    pub stack_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub state: StackState,
    pub target_branch: String,
    pub conflicts: Vec<String>,
    pub commits_pending: usize,
    pub commits_applied: usize,
}

/// Creates, queries, and destroys rebase sandboxes, and performs the final
/// reconciliation of the real branch
pub struct StackManager {
    repo: GitRepository,
    repo_root: PathBuf,
    settings: Settings,
}

impl StackManager {
    /// Create a manager for the repository at `repo_root`, loading
    /// per-repository settings (defaults when no config file exists)
    pub fn new(repo_root: &Path) -> Result<Self> {
        let settings = Settings::load_for_repo(repo_root)?;
        Self::with_settings(repo_root, settings)
    }

    pub fn with_settings(repo_root: &Path, settings: Settings) -> Result<Self> {
        let repo = GitRepository::open(repo_root)?;
        Ok(Self {
            repo_root: repo.path().to_path_buf(),
            repo,
            settings,
        })
    }

    pub fn repo(&self) -> &GitRepository {
        &self.repo
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Substitute path-unsafe characters in a branch name
    pub fn sanitize_branch_name(branch: &str) -> String {
        branch.replace('/', "-")
    }

    /// Deterministic sandbox path for a branch:
    /// `<parent-of-repo-root>/.<prefix>-<sanitized-branch>`
    pub fn sandbox_path(&self, branch: &str) -> Result<PathBuf> {
        let parent = self.repo_root.parent().ok_or_else(|| {
            RebaseStackError::config("Repository root has no parent directory")
        })?;
        Ok(parent.join(format!(
            ".{}-{}",
            self.settings.sandbox_prefix,
            Self::sanitize_branch_name(branch)
        )))
    }

    fn worktree_name(&self, branch: &str) -> String {
        format!(
            "{}-{}",
            self.settings.sandbox_prefix,
            Self::sanitize_branch_name(branch)
        )
    }

    fn sandbox_branch(&self, branch: &str) -> String {
        format!(
            "{}/{}",
            self.settings.sandbox_prefix,
            Self::sanitize_branch_name(branch)
        )
    }

    /// Pure existence check by deterministic path
    pub fn stack_exists(&self, branch: &str) -> Result<bool> {
        Ok(self.sandbox_path(branch)?.exists())
    }

    /// Create a sandbox for `branch`, tearing down any existing one first
    /// (idempotent overwrite, not an error). Returns the sandbox path.
    pub fn create_stack(&self, branch: &str, target_branch: &str) -> Result<PathBuf> {
        if !self.repo.branch_exists(branch) {
            return Err(RebaseStackError::branch(format!(
                "Branch '{branch}' does not exist"
            )));
        }
        if !self.repo.branch_exists(target_branch) {
            return Err(RebaseStackError::branch(format!(
                "Target branch '{target_branch}' does not exist"
            )));
        }

        let sandbox_path = self.sandbox_path(branch)?;
        if sandbox_path.exists() {
            info!("Sandbox for '{}' already exists, recreating", branch);
            self.cleanup_stack(branch)?;
        }

        let original_commit = self.repo.add_worktree(
            &self.worktree_name(branch),
            &sandbox_path,
            &self.sandbox_branch(branch),
            branch,
        )?;

        let metadata = StackMetadata::new(
            branch.to_string(),
            target_branch.to_string(),
            original_commit,
        );
        if let Err(e) = metadata.save(&sandbox_path) {
            // Never leave a workspace registered without a metadata record
            warn!("Metadata write failed, tearing sandbox back down: {}", e);
            let _ = self
                .repo
                .remove_worktree(&self.worktree_name(branch), &self.sandbox_branch(branch));
            return Err(e);
        }

        info!(
            "Created rebase sandbox for '{}' onto '{}' at {}",
            branch,
            target_branch,
            sandbox_path.display()
        );
        Ok(sandbox_path)
    }

    /// Tear a sandbox down. Idempotent: a missing sandbox is a no-op.
    /// Never touches the real branch or its ref. Every sub-step is
    /// attempted even if an earlier one fails, to avoid orphaning a
    /// workspace.
    pub fn cleanup_stack(&self, branch: &str) -> Result<()> {
        let sandbox_path = self.sandbox_path(branch)?;
        if !sandbox_path.exists() {
            debug!("No sandbox for '{}', nothing to clean up", branch);
            return Ok(());
        }

        // Stop any in-progress rebase so libgit2 state does not linger
        if let Ok(sandbox) = GitRepository::open(&sandbox_path) {
            if sandbox.is_rebase_in_progress() {
                if let Err(e) = sandbox.abort_rebase() {
                    warn!("Could not abort in-progress rebase: {}", e);
                }
            }
        }

        let mut first_error = None;

        if let Err(e) = StackMetadata::remove(&sandbox_path) {
            warn!("Failed to remove stack metadata: {}", e);
            first_error = Some(e);
        }

        if let Err(e) = self
            .repo
            .remove_worktree(&self.worktree_name(branch), &self.sandbox_branch(branch))
        {
            warn!("Failed to remove worktree: {}", e);
            first_error.get_or_insert(e);
        }

        if sandbox_path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&sandbox_path) {
                warn!("Failed to remove sandbox directory: {}", e);
                first_error.get_or_insert(RebaseStackError::Io(e));
            }
        }

        match first_error {
            None => {
                info!("Removed rebase sandbox for '{}'", branch);
                Ok(())
            }
            Some(e) => Err(e),
        }
    }

    /// Enumerate all managed sandboxes with live state. Directories matching
    /// the naming convention but lacking a valid metadata record are treated
    /// as orphaned and silently skipped.
    pub fn list_stacks(&self) -> Result<Vec<StackInfo>> {
        let prefix = format!("{}-", self.settings.sandbox_prefix);
        let mut stacks = Vec::new();

        for (name, path) in self.repo.list_worktrees()? {
            if !name.starts_with(&prefix) {
                continue;
            }
            match self.get_stack_info(&path) {
                Ok(Some(info)) => stacks.push(info),
                Ok(None) => debug!("Skipping orphaned sandbox at {}", path.display()),
                Err(e) => debug!("Skipping unreadable sandbox at {}: {}", path.display(), e),
            }
        }

        Ok(stacks)
    }

    /// Live view of one sandbox, addressed directly by path.
    /// `None` if the sandbox or its metadata record is absent.
    pub fn get_stack_info(&self, sandbox_path: &Path) -> Result<Option<StackInfo>> {
        let metadata = match StackMetadata::load(sandbox_path) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => return Ok(None),
            Err(e) => {
                debug!("Unreadable metadata at {}: {}", sandbox_path.display(), e);
                return Ok(None);
            }
        };

        let sandbox = match GitRepository::open(sandbox_path) {
            Ok(sandbox) => sandbox,
            Err(_) => return Ok(None),
        };

        let mut state = metadata.state;
        let mut conflicts = Vec::new();
        let mut commits_pending = 0;
        let mut commits_applied = 0;

        if sandbox.is_rebase_in_progress() {
            // Live queries win over the checkpointed state
            conflicts = sandbox.conflicted_files()?;
            state = if conflicts.is_empty() {
                StackState::InProgress
            } else {
                StackState::Conflicted
            };
            if let Ok((applied, total)) = sandbox.rebase_progress() {
                commits_applied = applied;
                commits_pending = total.saturating_sub(applied);
            }
        } else if let Ok(head) = sandbox.head_commit_id() {
            if let Ok((ahead, _behind)) = sandbox.ahead_behind(&head, &metadata.target_branch) {
                match state {
                    StackState::Resolved | StackState::Tested | StackState::Failed => {
                        commits_applied = ahead
                    }
                    _ => commits_pending = ahead,
                }
            }
        }

        Ok(Some(StackInfo {
            branch_name: metadata.branch_name,
            stack_path: sandbox_path.to_path_buf(),
            created_at: metadata.created_at,
            state,
            target_branch: metadata.target_branch,
            conflicts,
            commits_pending,
            commits_applied,
        }))
    }

    /// Single mutation point for the persisted state; all other metadata
    /// fields are carried over unchanged. Illegal transitions are rejected.
    pub fn update_stack_state(&self, sandbox_path: &Path, new_state: StackState) -> Result<()> {
        let mut metadata = StackMetadata::load(sandbox_path)?.ok_or_else(|| {
            RebaseStackError::precondition(format!(
                "No stack metadata at {}",
                sandbox_path.display()
            ))
        })?;

        metadata.transition(new_state)?;
        metadata.save(sandbox_path)?;
        debug!(
            "Stack '{}' checkpointed as {}",
            metadata.branch_name, new_state
        );
        Ok(())
    }

    /// Attempt the rebase inside an existing sandbox. Conflicts are a
    /// first-class outcome, not an error.
    pub fn attempt_rebase(&self, branch: &str) -> Result<RebaseOutcome> {
        let sandbox_path = self.require_sandbox(branch)?;
        let metadata = self.require_metadata(&sandbox_path)?;

        self.update_stack_state(&sandbox_path, StackState::InProgress)?;

        let sandbox = GitRepository::open(&sandbox_path)?;
        match sandbox.start_rebase(&metadata.target_branch) {
            Ok(RebaseOutcome::Completed) => {
                self.update_stack_state(&sandbox_path, StackState::Resolved)?;
                Ok(RebaseOutcome::Completed)
            }
            Ok(RebaseOutcome::Conflicted(files)) => {
                self.update_stack_state(&sandbox_path, StackState::Conflicted)?;
                Ok(RebaseOutcome::Conflicted(files))
            }
            Err(e) => {
                // Surface the adapter failure verbatim, but checkpoint it
                let _ = self.update_stack_state(&sandbox_path, StackState::Failed);
                Err(e)
            }
        }
    }

    /// Continue a conflicted rebase after resolutions were staged
    pub fn continue_stack_rebase(&self, branch: &str) -> Result<RebaseOutcome> {
        let sandbox_path = self.require_sandbox(branch)?;

        let sandbox = GitRepository::open(&sandbox_path)?;
        if !sandbox.is_rebase_in_progress() {
            return Err(RebaseStackError::precondition(format!(
                "No rebase in progress for '{branch}'"
            )));
        }
        match sandbox.continue_rebase() {
            Ok(RebaseOutcome::Completed) => {
                self.update_stack_state(&sandbox_path, StackState::Resolved)?;
                Ok(RebaseOutcome::Completed)
            }
            Ok(RebaseOutcome::Conflicted(files)) => Ok(RebaseOutcome::Conflicted(files)),
            Err(e) => {
                let _ = self.update_stack_state(&sandbox_path, StackState::Failed);
                Err(e)
            }
        }
    }

    /// Run the pre-apply gate for a sandbox without reconciling
    pub fn validate_before_apply(&self, branch: &str, force: bool) -> Result<GateReport> {
        let sandbox_path = self.require_sandbox(branch)?;
        let metadata = self.require_metadata(&sandbox_path)?;
        let sandbox = GitRepository::open(&sandbox_path)?;

        PreApplyGate::validate_before_apply(&sandbox, metadata.state, Some(&self.repo), force)
    }

    /// Reconcile the real branch to the sandbox's result: force-update the
    /// branch ref to the sandbox head, mark the stack `Applied`, and tear
    /// the sandbox down. Irreversible; the prior tip survives only in the
    /// reflog.
    pub fn apply_stack(&self, branch: &str, force: bool) -> Result<String> {
        let sandbox_path = self.require_sandbox(branch)?;
        let metadata = self.require_metadata(&sandbox_path)?;
        let sandbox = GitRepository::open(&sandbox_path)?;

        let report =
            PreApplyGate::validate_before_apply(&sandbox, metadata.state, Some(&self.repo), force)?;
        if !report.passed() {
            return Err(RebaseStackError::validation(format!(
                "Pre-apply checks failed for '{branch}': {}",
                report.failure_summary()
            )));
        }

        // Validate the terminal transition before touching any ref
        if !metadata.state.can_transition_to(StackState::Applied) {
            return Err(RebaseStackError::precondition(format!(
                "Stack for '{branch}' is {} and cannot be applied; attempt the rebase first",
                metadata.state
            )));
        }

        if self.repo.branch_head(branch)? != metadata.original_commit {
            warn!(
                "Branch '{}' moved since the sandbox was created; its newer commits will be \
                 discarded by apply",
                branch
            );
        }

        let new_head = sandbox.head_commit_id()?;
        self.repo
            .force_update_branch(branch, &new_head, "rebase-stack apply")?;

        // Keep the primary working tree consistent when the branch is
        // checked out there (the gate already required it to be clean)
        if self.repo.current_branch()? == Some(branch.to_string()) {
            self.repo.sync_workdir_to_head()?;
        }

        // Applied is terminal; the sandbox is gone before anyone can query it
        self.update_stack_state(&sandbox_path, StackState::Applied)?;
        self.cleanup_stack(branch)?;

        info!("Applied rebase result: '{}' now at {}", branch, new_head);
        Ok(new_head)
    }

    fn require_sandbox(&self, branch: &str) -> Result<PathBuf> {
        let sandbox_path = self.sandbox_path(branch)?;
        if !sandbox_path.exists() {
            return Err(RebaseStackError::precondition(format!(
                "No rebase sandbox exists for '{branch}'; run 'rbs preview' first"
            )));
        }
        Ok(sandbox_path)
    }

    fn require_metadata(&self, sandbox_path: &Path) -> Result<StackMetadata> {
        StackMetadata::load(sandbox_path)?.ok_or_else(|| {
            RebaseStackError::precondition(format!(
                "Sandbox at {} has no metadata record; remove it with 'rbs abort'",
                sandbox_path.display()
            ))
        })
    }
}

use crate::errors::{RebaseStackError, Result};
use git2::{Oid, Repository, RepositoryState, Signature};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of starting or continuing a rebase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// All commits replayed cleanly; the rebase is finished
    Completed,
    /// The rebase stopped on conflicted files and is still in progress
    Conflicted(Vec<String>),
}

/// Wrapper around git2::Repository exposing the narrow primitive surface the
/// stack engine depends on: worktree registration, rebase stepping, conflict
/// enumeration, cleanliness checks, and ref updates.
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl GitRepository {
    /// Open a Git repository at the given path (works for linked worktrees too)
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path)
            .or_else(|_| Repository::discover(path))
            .map_err(|e| RebaseStackError::config(format!("Not a git repository: {e}")))?;

        let workdir = repo
            .workdir()
            .ok_or_else(|| RebaseStackError::config("Repository has no working directory"))?
            .to_path_buf();

        Ok(Self {
            repo,
            path: workdir,
        })
    }

    /// Get repository working directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the current branch name, or `None` for a detached HEAD
    pub fn current_branch(&self) -> Result<Option<String>> {
        if self.repo.head_detached().unwrap_or(false) {
            return Ok(None);
        }
        let head = self
            .repo
            .head()
            .map_err(|e| RebaseStackError::branch(format!("Could not get HEAD: {e}")))?;
        Ok(head.shorthand().map(|s| s.to_string()))
    }

    /// Get the commit id HEAD currently points at
    pub fn head_commit_id(&self) -> Result<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| RebaseStackError::branch(format!("Could not get HEAD: {e}")))?;
        let commit = head
            .peel_to_commit()
            .map_err(|e| RebaseStackError::branch(format!("Could not get HEAD commit: {e}")))?;
        Ok(commit.id().to_string())
    }

    /// Check if a local branch exists
    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, git2::BranchType::Local).is_ok()
    }

    /// Get the commit id at the head of a local branch
    pub fn branch_head(&self, branch_name: &str) -> Result<String> {
        let branch = self
            .repo
            .find_branch(branch_name, git2::BranchType::Local)
            .map_err(|e| {
                RebaseStackError::branch(format!("Could not find branch '{branch_name}': {e}"))
            })?;

        let commit = branch.get().peel_to_commit().map_err(|e| {
            RebaseStackError::branch(format!("Could not get commit for branch '{branch_name}': {e}"))
        })?;

        Ok(commit.id().to_string())
    }

    /// Resolve the repository default branch name.
    ///
    /// Follows the `origin/HEAD` symbolic ref when present, then falls back
    /// to `main`/`master` existence checks.
    pub fn default_branch(&self) -> Result<String> {
        if let Ok(reference) = self.repo.find_reference("refs/remotes/origin/HEAD") {
            if let Some(target) = reference.symbolic_target() {
                if let Some(name) = target.strip_prefix("refs/remotes/origin/") {
                    return Ok(name.to_string());
                }
            }
        }

        if self.branch_exists("main") {
            Ok("main".to_string())
        } else if self.branch_exists("master") {
            Ok("master".to_string())
        } else {
            Err(RebaseStackError::branch(
                "Could not determine default branch (no origin/HEAD, main, or master)",
            ))
        }
    }

    /// Check whether the working tree is clean (no staged or unstaged changes)
    pub fn is_clean(&self) -> Result<bool> {
        self.is_clean_excluding(&[])
    }

    /// Cleanliness check that ignores the given workdir-relative paths.
    /// Used by the gate so the sandbox's own metadata file does not count
    /// as an uncommitted change.
    pub fn is_clean_excluding(&self, exclude: &[&str]) -> Result<bool> {
        let statuses = self.repo.statuses(None).map_err(RebaseStackError::Git)?;

        for status in statuses.iter() {
            if let Some(path) = status.path() {
                if exclude.contains(&path) {
                    continue;
                }
            }
            let flags = status.status();
            if flags.intersects(
                git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_NEW
                    | git2::Status::INDEX_DELETED
                    | git2::Status::WT_MODIFIED
                    | git2::Status::WT_NEW
                    | git2::Status::WT_DELETED
                    | git2::Status::CONFLICTED,
            ) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    // ---- isolated workspace registration ----

    /// Register an isolated worktree for `branch` at `path`.
    ///
    /// The worktree is checked out on a dedicated sandbox branch created at
    /// the tip of `branch`, so the real branch ref is never checked out
    /// twice. Returns the commit id the sandbox branch was created at.
    pub fn add_worktree(
        &self,
        worktree_name: &str,
        path: &Path,
        sandbox_branch: &str,
        branch: &str,
    ) -> Result<String> {
        let tip = self
            .repo
            .find_branch(branch, git2::BranchType::Local)
            .map_err(|e| {
                RebaseStackError::branch(format!("Could not find branch '{branch}': {e}"))
            })?
            .get()
            .peel_to_commit()
            .map_err(|e| {
                RebaseStackError::branch(format!("Branch '{branch}' has no commit: {e}"))
            })?;
        let tip_id = tip.id().to_string();

        // Recreate the sandbox branch at the current tip
        if let Ok(mut existing) = self.repo.find_branch(sandbox_branch, git2::BranchType::Local) {
            existing.delete().map_err(|e| {
                RebaseStackError::branch(format!(
                    "Could not reset sandbox branch '{sandbox_branch}': {e}"
                ))
            })?;
        }
        self.repo
            .branch(sandbox_branch, &tip, false)
            .map_err(|e| {
                RebaseStackError::branch(format!(
                    "Could not create sandbox branch '{sandbox_branch}': {e}"
                ))
            })?;

        let reference = self
            .repo
            .find_reference(&format!("refs/heads/{sandbox_branch}"))
            .map_err(RebaseStackError::Git)?;

        let mut opts = git2::WorktreeAddOptions::new();
        opts.reference(Some(&reference));

        self.repo
            .worktree(worktree_name, path, Some(&opts))
            .map_err(|e| {
                RebaseStackError::branch(format!(
                    "Could not create worktree for '{branch}' at {}: {e}",
                    path.display()
                ))
            })?;

        info!("Registered worktree '{}' at {}", worktree_name, path.display());
        Ok(tip_id)
    }

    /// Unregister a worktree and delete its sandbox branch.
    ///
    /// Idempotent: missing worktrees and branches are not errors.
    pub fn remove_worktree(&self, worktree_name: &str, sandbox_branch: &str) -> Result<()> {
        if let Ok(worktree) = self.repo.find_worktree(worktree_name) {
            let wt_path = worktree.path().to_path_buf();

            let mut prune_opts = git2::WorktreePruneOptions::new();
            prune_opts.valid(true).locked(true).working_tree(true);
            worktree
                .prune(Some(&mut prune_opts))
                .map_err(RebaseStackError::Git)?;

            // libgit2 prune can leave the directory behind on some platforms
            if wt_path.exists() {
                std::fs::remove_dir_all(&wt_path).map_err(RebaseStackError::Io)?;
            }

            info!("Removed worktree '{}'", worktree_name);
        }

        if let Ok(mut branch) = self.repo.find_branch(sandbox_branch, git2::BranchType::Local) {
            if let Err(e) = branch.delete() {
                debug!("Could not delete sandbox branch '{}': {}", sandbox_branch, e);
            }
        }

        Ok(())
    }

    /// List registered worktrees as (name, path) pairs
    pub fn list_worktrees(&self) -> Result<Vec<(String, PathBuf)>> {
        let names = self.repo.worktrees().map_err(RebaseStackError::Git)?;

        let mut worktrees = Vec::new();
        for name in names.iter().flatten() {
            match self.repo.find_worktree(name) {
                Ok(worktree) => worktrees.push((name.to_string(), worktree.path().to_path_buf())),
                Err(e) => debug!("Skipping unreadable worktree '{}': {}", name, e),
            }
        }

        Ok(worktrees)
    }

    // ---- rebase stepping ----

    /// Start rebasing HEAD onto `onto_branch` and replay commits until done
    /// or the first conflict
    pub fn start_rebase(&self, onto_branch: &str) -> Result<RebaseOutcome> {
        let onto_id = self
            .repo
            .refname_to_id(&format!("refs/heads/{onto_branch}"))
            .map_err(|e| {
                RebaseStackError::branch(format!("Could not resolve branch '{onto_branch}': {e}"))
            })?;
        let upstream = self
            .repo
            .find_annotated_commit(onto_id)
            .map_err(RebaseStackError::Git)?;

        let head = self.repo.head().map_err(RebaseStackError::Git)?;
        let branch = self
            .repo
            .reference_to_annotated_commit(&head)
            .map_err(RebaseStackError::Git)?;

        let mut opts = git2::RebaseOptions::new();
        let mut rebase = self
            .repo
            .rebase(Some(&branch), Some(&upstream), None, Some(&mut opts))
            .map_err(|e| RebaseStackError::rebase(format!("Could not start rebase: {e}")))?;

        debug!("Started rebase of HEAD onto '{}'", onto_branch);
        self.drive_rebase(&mut rebase)
    }

    /// Continue an in-progress rebase after conflicts were staged
    pub fn continue_rebase(&self) -> Result<RebaseOutcome> {
        let mut rebase = self.repo.open_rebase(None).map_err(|e| {
            RebaseStackError::rebase(format!("No rebase in progress to continue: {e}"))
        })?;

        let conflicts = self.conflicted_files()?;
        if !conflicts.is_empty() {
            return Ok(RebaseOutcome::Conflicted(conflicts));
        }

        // Commit the operation the rebase stopped on, then keep replaying
        let signature = self.signature()?;
        match rebase.commit(None, &signature, None) {
            Ok(id) => debug!("Committed resolved rebase step as {}", id),
            Err(e) if e.code() == git2::ErrorCode::Applied => {
                debug!("Resolved rebase step is empty, skipping")
            }
            Err(e) => return Err(RebaseStackError::Git(e)),
        }

        self.drive_rebase(&mut rebase)
    }

    /// Abort an in-progress rebase, restoring the pre-rebase HEAD
    pub fn abort_rebase(&self) -> Result<()> {
        let mut rebase = self
            .repo
            .open_rebase(None)
            .map_err(|e| RebaseStackError::rebase(format!("No rebase in progress to abort: {e}")))?;
        rebase.abort().map_err(RebaseStackError::Git)?;
        info!("Aborted in-progress rebase");
        Ok(())
    }

    /// Report whether a rebase is currently in progress
    pub fn is_rebase_in_progress(&self) -> bool {
        matches!(
            self.repo.state(),
            RepositoryState::Rebase
                | RepositoryState::RebaseInteractive
                | RepositoryState::RebaseMerge
        )
    }

    fn drive_rebase(&self, rebase: &mut git2::Rebase) -> Result<RebaseOutcome> {
        let signature = self.signature()?;

        while let Some(op) = rebase.next() {
            op.map_err(RebaseStackError::Git)?;

            let conflicts = self.conflicted_files()?;
            if !conflicts.is_empty() {
                debug!("Rebase stopped on {} conflicted file(s)", conflicts.len());
                return Ok(RebaseOutcome::Conflicted(conflicts));
            }

            match rebase.commit(None, &signature, None) {
                Ok(_) => {}
                Err(e) if e.code() == git2::ErrorCode::Applied => {
                    debug!("Skipping already-applied commit")
                }
                Err(e) => return Err(RebaseStackError::Git(e)),
            }
        }

        rebase.finish(None).map_err(RebaseStackError::Git)?;
        debug!("Rebase completed");
        Ok(RebaseOutcome::Completed)
    }

    // ---- conflicts and staging ----

    /// Get list of conflicted files (paths relative to the workdir)
    pub fn conflicted_files(&self) -> Result<Vec<String>> {
        let index = self.repo.index().map_err(RebaseStackError::Git)?;

        let mut conflicts = Vec::new();
        for conflict in index.conflicts().map_err(RebaseStackError::Git)? {
            let conflict = conflict.map_err(RebaseStackError::Git)?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                if let Ok(path) = std::str::from_utf8(&entry.path) {
                    conflicts.push(path.to_string());
                }
            }
        }

        Ok(conflicts)
    }

    /// Stage a single file, clearing any conflict entries for it
    pub fn stage_file(&self, relative_path: &Path) -> Result<()> {
        let mut index = self.repo.index().map_err(RebaseStackError::Git)?;
        index.add_path(relative_path).map_err(RebaseStackError::Git)?;
        index.write().map_err(RebaseStackError::Git)?;
        debug!("Staged {}", relative_path.display());
        Ok(())
    }

    // ---- ref updates ----

    /// Force-update a branch ref to point at a commit
    pub fn force_update_branch(&self, branch: &str, commit_id: &str, reason: &str) -> Result<()> {
        let oid = Oid::from_str(commit_id).map_err(RebaseStackError::Git)?;
        self.repo
            .find_commit(oid)
            .map_err(|e| RebaseStackError::branch(format!("Commit '{commit_id}' not found: {e}")))?;

        let mut reference = self
            .repo
            .find_reference(&format!("refs/heads/{branch}"))
            .map_err(|e| {
                RebaseStackError::branch(format!("Could not find branch '{branch}': {e}"))
            })?;

        reference
            .set_target(oid, reason)
            .map_err(|e| {
                RebaseStackError::branch(format!("Could not update branch '{branch}': {e}"))
            })?;

        info!("Updated refs/heads/{} -> {}", branch, commit_id);
        Ok(())
    }

    /// Force the working tree and index to match the current HEAD target.
    /// Used after a ref update to a branch checked out in this worktree.
    pub fn sync_workdir_to_head(&self) -> Result<()> {
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        self.repo
            .checkout_head(Some(&mut checkout))
            .map_err(RebaseStackError::Git)?;
        debug!("Working tree reset to HEAD");
        Ok(())
    }

    /// Count commits (ahead, behind) of `local_commit` relative to a branch
    pub fn ahead_behind(&self, local_commit: &str, branch: &str) -> Result<(usize, usize)> {
        let local = Oid::from_str(local_commit).map_err(RebaseStackError::Git)?;
        let upstream = self
            .repo
            .refname_to_id(&format!("refs/heads/{branch}"))
            .map_err(|e| {
                RebaseStackError::branch(format!("Could not resolve branch '{branch}': {e}"))
            })?;

        self.repo
            .graph_ahead_behind(local, upstream)
            .map_err(RebaseStackError::Git)
    }

    /// Progress of an in-progress rebase as (applied, total) operation counts
    pub fn rebase_progress(&self) -> Result<(usize, usize)> {
        let mut rebase = self
            .repo
            .open_rebase(None)
            .map_err(|e| RebaseStackError::rebase(format!("No rebase in progress: {e}")))?;
        let total = rebase.len();
        let applied = rebase.operation_current().unwrap_or(0);
        Ok((applied, total))
    }

    fn signature(&self) -> Result<Signature<'_>> {
        if let Ok(config) = self.repo.config() {
            if let (Ok(name), Ok(email)) = (
                config.get_string("user.name"),
                config.get_string("user.email"),
            ) {
                return Signature::now(&name, &email).map_err(RebaseStackError::Git);
            }
        }

        Signature::now("Rebase Stack", "rebase-stack@localhost").map_err(RebaseStackError::Git)
    }
}

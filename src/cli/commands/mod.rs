pub mod abort;
pub mod apply;
pub mod preview;
pub mod resolve;
pub mod status;

use crate::errors::{RebaseStackError, Result};
use crate::git;
use crate::stack::StackManager;

/// Build a stack manager for the repository containing the current directory
pub(crate) fn current_manager() -> Result<StackManager> {
    let current_dir = std::env::current_dir().map_err(|e| {
        RebaseStackError::config(format!("Could not get current directory: {e}"))
    })?;
    let repo_root = git::find_repository_root(&current_dir)?;
    StackManager::new(&repo_root)
}

/// Resolve the branch a command operates on: explicit argument, or the
/// branch currently checked out in the primary working directory
pub(crate) fn resolve_branch(manager: &StackManager, branch: Option<String>) -> Result<String> {
    match branch {
        Some(branch) => Ok(branch),
        None => manager.repo().current_branch()?.ok_or_else(|| {
            RebaseStackError::branch(
                "HEAD is detached; pass a branch name explicitly".to_string(),
            )
        }),
    }
}

pub mod repository;

pub use repository::{GitRepository, RebaseOutcome};

use crate::errors::{RebaseStackError, Result};
use std::path::Path;

/// Find the root of the Git repository containing `start_path`
pub fn find_repository_root(start_path: &Path) -> Result<std::path::PathBuf> {
    let repo = git2::Repository::discover(start_path).map_err(RebaseStackError::Git)?;

    let workdir = repo.workdir().ok_or_else(|| {
        RebaseStackError::config("Repository has no working directory (bare repo?)")
    })?;

    Ok(workdir.to_path_buf())
}

use super::{current_manager, resolve_branch};
use crate::cli::output::Output;
use crate::errors::{RebaseStackError, Result};

pub fn run(branch: Option<String>, force: bool) -> Result<()> {
    let manager = current_manager()?;
    let branch = resolve_branch(&manager, branch)?;

    let report = manager.validate_before_apply(&branch, force)?;
    if !report.passed() {
        Output::error(format!("Cannot apply '{branch}':"));
        for check in report.failures() {
            Output::bullet(format!("{}: {}", check.name, check.detail));
        }
        return Err(RebaseStackError::validation(format!(
            "Pre-apply checks failed for '{branch}': {}",
            report.failure_summary()
        )));
    }

    let new_head = manager.apply_stack(&branch, force)?;
    Output::success(format!(
        "'{branch}' now points at {} and the sandbox was removed",
        &new_head[..8.min(new_head.len())]
    ));
    Ok(())
}

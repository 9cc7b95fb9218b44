use super::{current_manager, resolve_branch};
use crate::cli::output::Output;
use crate::errors::Result;

pub fn run(branch: Option<String>) -> Result<()> {
    let manager = current_manager()?;
    let branch = resolve_branch(&manager, branch)?;

    if !manager.stack_exists(&branch)? {
        Output::info(format!("No rebase sandbox for '{branch}'; nothing to abort"));
        return Ok(());
    }

    manager.cleanup_stack(&branch)?;
    Output::success(format!(
        "Removed rebase sandbox for '{branch}'; the branch itself is untouched"
    ));
    Ok(())
}

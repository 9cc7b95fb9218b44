use super::{current_manager, resolve_branch};
use crate::cli::output::Output;
use crate::errors::Result;
use crate::git::RebaseOutcome;

pub fn run(branch: Option<String>, onto: Option<String>) -> Result<()> {
    let manager = current_manager()?;
    let branch = resolve_branch(&manager, branch)?;
    let onto = match onto {
        Some(onto) => onto,
        None => manager.repo().default_branch()?,
    };

    Output::section(format!("Previewing rebase of '{branch}' onto '{onto}'"));

    let sandbox_path = manager.create_stack(&branch, &onto)?;
    Output::sub_item(format!("Sandbox: {}", sandbox_path.display()));

    match manager.attempt_rebase(&branch)? {
        RebaseOutcome::Completed => {
            Output::success("Rebase completed cleanly in the sandbox");
            Output::tip("Run 'rbs test' to validate, then 'rbs apply' to update the branch");
        }
        RebaseOutcome::Conflicted(files) => {
            Output::warning(format!("Rebase stopped on {} conflicted file(s):", files.len()));
            for file in &files {
                Output::bullet(file);
            }
            Output::tip("Run 'rbs resolve' to work through them, or 'rbs abort' to discard");
        }
    }

    Ok(())
}

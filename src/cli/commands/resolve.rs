use super::{current_manager, resolve_branch};
use crate::cli::output::Output;
use crate::cli::StrategyArg;
use crate::errors::Result;
use crate::git::{GitRepository, RebaseOutcome};
use crate::stack::{ConflictResolver, ResolutionStrategy};

pub fn run(branch: Option<String>, strategy: Option<StrategyArg>) -> Result<()> {
    let manager = current_manager()?;
    let branch = resolve_branch(&manager, branch)?;

    let sandbox_path = manager.sandbox_path(&branch)?;
    let info = match manager.get_stack_info(&sandbox_path)? {
        Some(info) => info,
        None => {
            Output::info(format!(
                "No rebase sandbox for '{branch}'; run 'rbs preview' first"
            ));
            return Ok(());
        }
    };

    let sandbox = GitRepository::open(&sandbox_path)?;
    if !sandbox.is_rebase_in_progress() {
        Output::info(format!("No rebase in progress for '{branch}'; nothing to resolve"));
        return Ok(());
    }

    let resolver = ConflictResolver::new();

    if !info.conflicts.is_empty() {
        let resolutions = match strategy {
            Some(arg) => {
                let strategy = match arg {
                    StrategyArg::Ours => ResolutionStrategy::Ours,
                    StrategyArg::Theirs => ResolutionStrategy::Theirs,
                };
                let mut resolutions = Vec::new();
                for file in &info.conflicts {
                    if let Some(resolution) =
                        resolver.resolve_file_with_strategy(&sandbox_path, file, strategy)?
                    {
                        resolutions.push(resolution);
                    }
                }
                resolutions
            }
            None => resolver.resolve_interactively(&sandbox_path, &info.conflicts)?,
        };

        for resolution in &resolutions {
            resolver.apply_resolution(&sandbox_path, &sandbox, resolution)?;
            Output::sub_item(format!("Resolved {}", resolution.file_path));
        }
    }

    let remaining = sandbox.conflicted_files()?;
    if !remaining.is_empty() {
        Output::warning(format!("{} file(s) still conflicted:", remaining.len()));
        for file in &remaining {
            Output::bullet(file);
        }
        Output::tip("Run 'rbs resolve' again for the remaining files");
        return Ok(());
    }

    match manager.continue_stack_rebase(&branch)? {
        RebaseOutcome::Completed => {
            Output::success("All conflicts resolved; rebase completed in the sandbox");
            Output::tip("Run 'rbs test' to validate, then 'rbs apply'");
        }
        RebaseOutcome::Conflicted(files) => {
            Output::warning(format!(
                "Rebase continued but stopped on {} new conflicted file(s):",
                files.len()
            ));
            for file in &files {
                Output::bullet(file);
            }
            Output::tip("Run 'rbs resolve' again");
        }
    }

    Ok(())
}

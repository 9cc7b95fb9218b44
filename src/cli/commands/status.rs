use super::current_manager;
use crate::cli::output::Output;
use crate::errors::Result;
use crate::stack::StackInfo;

pub fn run(branch: Option<String>) -> Result<()> {
    let manager = current_manager()?;

    match branch {
        Some(branch) => {
            let sandbox_path = manager.sandbox_path(&branch)?;
            match manager.get_stack_info(&sandbox_path)? {
                Some(info) => print_stack(&info),
                None => Output::info(format!("No rebase sandbox for '{branch}'")),
            }
        }
        None => {
            let stacks = manager.list_stacks()?;
            if stacks.is_empty() {
                Output::info("No active rebase sandboxes");
                return Ok(());
            }
            for info in &stacks {
                print_stack(info);
            }
        }
    }

    Ok(())
}

fn print_stack(info: &StackInfo) {
    Output::section(format!("{} → {}", info.branch_name, info.target_branch));
    Output::sub_item(format!("State: {}", info.state));
    Output::sub_item(format!("Sandbox: {}", info.stack_path.display()));
    Output::sub_item(format!(
        "Created: {}",
        info.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if info.commits_pending > 0 || info.commits_applied > 0 {
        Output::sub_item(format!(
            "Commits: {} applied, {} pending",
            info.commits_applied, info.commits_pending
        ));
    }

    if !info.conflicts.is_empty() {
        Output::warning(format!("{} conflicted file(s):", info.conflicts.len()));
        for file in &info.conflicts {
            Output::bullet(file);
        }
    }
}

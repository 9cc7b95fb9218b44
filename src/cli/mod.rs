pub mod commands;
pub mod output;

use crate::errors::Result;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "rbs")]
#[command(about = "rebase-stack - attempt rebases in a disposable sandbox")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a sandbox for a branch and attempt the rebase there
    Preview {
        /// Branch to rebase (defaults to the current branch)
        branch: Option<String>,

        /// Branch to rebase onto (defaults to the repository default branch)
        #[arg(long)]
        onto: Option<String>,
    },

    /// Show active rebase sandboxes, or inspect one branch's sandbox
    Status {
        /// Branch to inspect
        branch: Option<String>,
    },

    /// Resolve conflicts in a sandbox and continue the rebase
    Resolve {
        /// Branch whose sandbox to resolve (defaults to the current branch)
        branch: Option<String>,

        /// Apply one strategy to every conflicted file instead of prompting
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
    },

    /// Run the project test suite inside a sandbox
    Test {
        /// Branch whose sandbox to test (defaults to the current branch)
        branch: Option<String>,

        /// Test command to run (auto-detected when omitted)
        #[arg(long)]
        command: Option<String>,

        /// Timeout in seconds for the test run
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Reconcile the real branch to the sandbox's rebased result
    Apply {
        /// Branch to apply (defaults to the current branch)
        branch: Option<String>,

        /// Proceed even if a prior validation run failed
        #[arg(long)]
        force: bool,
    },

    /// Tear a sandbox down without touching the real branch
    Abort {
        /// Branch whose sandbox to remove (defaults to the current branch)
        branch: Option<String>,
    },
}

/// Batch conflict-resolution strategies exposed on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    /// Keep the current side of every conflict
    Ours,
    /// Take the incoming side of every conflict
    Theirs,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        self.setup_logging();

        match self.command {
            Commands::Preview { branch, onto } => commands::preview::run(branch, onto),
            Commands::Status { branch } => commands::status::run(branch),
            Commands::Resolve { branch, strategy } => commands::resolve::run(branch, strategy),
            Commands::Test {
                branch,
                command,
                timeout,
            } => commands::test::run(branch, command, timeout),
            Commands::Apply { branch, force } => commands::apply::run(branch, force),
            Commands::Abort { branch } => commands::abort::run(branch),
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .finish();

        // A second invocation in tests may already have set a subscriber
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

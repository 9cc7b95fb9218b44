//! Styled terminal output shared by every `rbs` subcommand.
//!
//! Informational lines go to stdout; errors go to stderr so scripted
//! callers can separate the streams.

use console::style;
use std::fmt::Display;

pub struct Output;

impl Output {
    pub fn success<T: Display>(message: T) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error<T: Display>(message: T) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning<T: Display>(message: T) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info<T: Display>(message: T) {
        println!("{} {}", style("ℹ").cyan(), message);
    }

    /// Indented detail line under a section or result
    pub fn sub_item<T: Display>(message: T) {
        println!("  {} {}", style("→").dim(), message);
    }

    /// Indented list entry, used for file lists and gate failures
    pub fn bullet<T: Display>(message: T) {
        println!("  {} {}", style("•").dim(), message);
    }

    pub fn section<T: Display>(title: T) {
        println!("\n{}", style(title).bold().underlined());
    }

    /// Suggest the next command to run
    pub fn tip<T: Display>(message: T) {
        println!("{} {}", style("TIP:").cyan(), style(message).dim());
    }
}

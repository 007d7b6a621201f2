//! Shared helper functions for CLI commands.

use console::style;

pub fn print_step(message: &str) {
    println!("{} {}", style("\u{2192}").cyan(), message);
}

pub fn print_ok(message: &str) {
    println!("  {} {}", style("\u{2713}").green(), message);
}

pub fn print_warn(message: &str) {
    println!("  {} {}", style("!").yellow(), message);
}

pub fn print_err(message: &str) {
    eprintln!("  {} {}", style("\u{2717}").red(), message);
}

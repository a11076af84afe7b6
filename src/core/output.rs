//! Message formatting shared by all commands.
//!
//! Errors and results are separated from surrounding output by blank lines;
//! hints and secondary details are muted.

use colored::*;

/// ```text
///
/// ✕ Error: <message>
///
/// ```
pub fn print_error(message: &str) {
    println!("\n{} {}\n", "✕ Error:".red(), message.white());
}

/// Error followed by an actionable remediation line
pub fn print_error_with_hint(message: &str, hint: &str) {
    println!("\n{} {}", "✕ Error:".red(), message.white());
    println!("  {}\n", hint.bright_black());
}

pub fn print_warning(message: &str) {
    println!("{} {}", "!".yellow(), message.white());
}

pub fn print_success(message: &str) {
    println!("\n{} {}", "✓".green(), message.white());
}

pub fn print_info(message: &str) {
    println!("\n{}\n", message.white());
}

/// `<header>:` with a blank line above and below
pub fn print_section_header(header: &str) {
    println!("\n{}:\n", header.white());
}

/// Muted `label: value` detail line
pub fn print_detail(label: &str, value: &str) {
    println!("  {} {}", format!("{label}:").bright_black(), value.white());
}

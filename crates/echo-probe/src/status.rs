//! Colored console status lines.

use colored::Colorize;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn tag(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Success => "SUCCESS",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// Render `[TAG] message` with a severity-specific color on the tag.
pub fn status_line(message: &str, severity: Severity) -> String {
    let tag = format!("[{}]", severity.tag());
    let painted = match severity {
        Severity::Info => tag.bright_blue(),
        Severity::Success => tag.bright_green(),
        Severity::Warning => tag.bright_yellow(),
        Severity::Error => tag.bright_red(),
    };
    format!("{painted} {message}")
}

pub fn print_status(message: &str, severity: Severity) {
    println!("{}", status_line(message, severity));
}

pub fn info(message: &str) {
    print_status(message, Severity::Info);
}

pub fn success(message: &str) {
    print_status(message, Severity::Success);
}

pub fn warning(message: &str) {
    print_status(message, Severity::Warning);
}

pub fn error(message: &str) {
    print_status(message, Severity::Error);
}

/// Severity for a boolean check outcome.
pub fn outcome(ok: bool) -> Severity {
    if ok {
        Severity::Success
    } else {
        Severity::Error
    }
}

pub fn banner(title: &str, width: usize) {
    let rule = "=".repeat(width);
    println!("{rule}");
    println!("{title}");
    println!("{rule}");
}

/// `✓ PASS name` / `✗ FAIL name` line for final tallies.
pub fn pass_fail_line(name: &str, ok: bool) -> String {
    if ok {
        format!("{} {name}", "✓ PASS".bright_green())
    } else {
        format!("{} {name}", "✗ FAIL".bright_red())
    }
}

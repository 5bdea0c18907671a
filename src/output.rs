//! Colored status messages for the CLI.
//!
//! Stdout carries result rows that fzf and scripts consume, so every helper
//! here writes to stderr.
//!
//! ```rust,no_run
//! use pkgsift::output::{success, warning};
//!
//! success("Cache cleared");
//! warning("No packages found for Homebrew matching 'zzz'");
//! ```

use colored::Colorize;

/// Green check mark prefix.
pub fn success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

/// Red cross prefix.
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

pub fn info(msg: &str) {
    eprintln!("{} {}", "ℹ".blue(), msg);
}

/// Manager label with emphasis.
pub fn manager_name(label: &str) -> String {
    label.cyan().to_string()
}

/// Dimmed text for paths and secondary details.
pub fn dim(text: &str) -> String {
    text.dimmed().to_string()
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

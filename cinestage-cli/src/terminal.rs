// ============================================================================
// cinestage-cli/src/terminal.rs
// ============================================================================
//
// TERMINAL OUTPUT: Summaries Printed After a Command Finishes
//
// Log lines come from log4rs while the pipeline runs. This module prints the
// human-facing summaries on stdout once a command is done: section headers,
// aligned status lines and per-stage results. Color is disabled when the
// NO_COLOR environment variable is set or stdout is not a terminal.
//
// AI-ASSISTANT-INFO: Terminal styling helpers for the CLI

use cinestage_core::StageStatus;
use console::{Term, style};
use owo_colors::OwoColorize;

const LABEL_WIDTH: usize = 18;

/// Visual hierarchy of summary output.
#[derive(Debug, Clone, Copy)]
pub enum OutputLevel {
    Section,
    Item,
    Status,
}

impl OutputLevel {
    fn indent(&self) -> &'static str {
        match self {
            OutputLevel::Section => "",
            OutputLevel::Item => "  ",
            OutputLevel::Status => "    ",
        }
    }
}

fn should_use_color() -> bool {
    std::env::var_os("NO_COLOR").is_none() && Term::stdout().features().colors_supported()
}

/// Print a section header for a summary block
pub fn print_section(title: &str) {
    println!();
    if should_use_color() {
        println!("===== {} =====", title.to_uppercase().cyan());
    } else {
        println!("===== {} =====", title.to_uppercase());
    }
}

/// Print a key-value status line
pub fn print_status(label: &str, value: &str, highlight: bool) {
    let padded = format!("{label}:");
    let indent = OutputLevel::Status.indent();
    if should_use_color() && highlight {
        println!("{indent}{padded:<LABEL_WIDTH$} {}", style(value).bold());
    } else {
        println!("{indent}{padded:<LABEL_WIDTH$} {value}");
    }
}

/// Print one line of the stage table
pub fn print_stage(name: &str, status: StageStatus, detail: Option<&str>) {
    let indent = OutputLevel::Item.indent();
    let (symbol, word) = match status {
        StageStatus::Completed => ("✓", "completed"),
        StageStatus::Skipped => ("-", "skipped"),
        StageStatus::Degraded => ("!", "degraded"),
        StageStatus::Failed => ("✗", "failed"),
    };
    let label = format!("{name:<14}");
    let tail = detail.map(|d| format!("  {d}")).unwrap_or_default();

    if !should_use_color() {
        println!("{indent}{symbol} {label}{word}{tail}");
        return;
    }
    match status {
        StageStatus::Completed => println!("{indent}{} {label}{}{tail}", symbol.green(), word.green()),
        StageStatus::Skipped => println!("{indent}{} {label}{}{}", symbol.dimmed(), word.dimmed(), tail.dimmed()),
        StageStatus::Degraded => println!("{indent}{} {label}{}{tail}", symbol.yellow(), word.yellow()),
        StageStatus::Failed => println!("{indent}{} {label}{}{tail}", symbol.red(), word.red().bold()),
    }
}

/// Print a bullet item
pub fn print_item(text: &str) {
    println!("{}• {text}", OutputLevel::Item.indent());
}

/// Print a success message
pub fn print_success(message: &str) {
    println!();
    if should_use_color() {
        println!("  ✓ {}", message.green());
    } else {
        println!("  ✓ {message}");
    }
}

/// Print an error message on stderr
pub fn print_error(message: &str) {
    if std::env::var_os("NO_COLOR").is_none() && Term::stderr().features().colors_supported() {
        eprintln!("{} {message}", "Error:".red().bold());
    } else {
        eprintln!("Error: {message}");
    }
}

/// Formats seconds as `HH:MM:SS`.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_clock_formatted() {
        assert_eq!(format_duration(0.0), "00:00:00");
        assert_eq!(format_duration(3725.4), "01:02:05");
        assert_eq!(format_duration(f64::NAN), "00:00:00");
    }
}

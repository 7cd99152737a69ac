//! Centralized logging configuration for Cinestage
//!
//! This module handles:
//! - Setting up log4rs with a console appender and a per-run log file
//! - Section and subsection banners that separate pipeline stages in the log
//! - Debug logging of every external command before it runs
//!
//! The core only emits through the `log` facade; binaries decide whether and
//! where to initialize a backend.

use crate::external::ToolCommand;

use anyhow::Result;
use chrono::Local;
use log::{LevelFilter, debug, info};
use log4rs::{
    append::{console::ConsoleAppender, file::FileAppender},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};
use std::path::{Path, PathBuf};

/// Pattern used for the log file.
const FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} [{l}] {m}{n}";

/// Pattern used for the console.
const CONSOLE_PATTERN: &str = "{h({l})} {m}{n}";

/// Builds the log file path for a run started now: `<log_dir>/cinestage_run_<timestamp>.log`.
pub fn run_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!(
        "cinestage_run_{}.log",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Initializes console and file logging at `level`.
///
/// Fails if a global logger has already been installed.
pub fn init_logging(log_file: &Path, level: LevelFilter) -> Result<()> {
    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(log_file)?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .build(
            Root::builder()
                .appender("console")
                .appender("file")
                .build(level),
        )?;

    log4rs::init_config(config)?;
    Ok(())
}

/// Log a section heading
pub fn log_section(title: &str) {
    info!("");
    info!("{}", "=".repeat(50));
    info!("{}", title);
    info!("{}", "=".repeat(50));
}

/// Log a subsection heading
pub fn log_subsection(title: &str) {
    info!("{}", "-".repeat(40));
    info!("{}", title);
    info!("{}", "-".repeat(40));
}

/// Log a command being executed
pub fn log_command(command: &ToolCommand) {
    debug!("Executing [{}]: {}", command.tool(), command);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_log_path_is_inside_log_dir() {
        let path = run_log_path(Path::new("/var/log/cinestage"));
        assert!(path.starts_with("/var/log/cinestage"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("cinestage_run_"));
        assert!(name.ends_with(".log"));
    }
}

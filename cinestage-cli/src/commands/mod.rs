//! Command implementations for the CLI.
//!
//! Each submodule implements one subcommand. `load_config` layers the shared
//! arguments over the defaults and is used by all of them.

pub mod analyze;
pub mod config;
pub mod package;
pub mod run;

use crate::cli::ConfigArgs;
use crate::error::CliResult;

use anyhow::Context;
use cinestage_core::PipelineConfig;
use cinestage_core::logging::{init_logging, run_log_path};
use log::LevelFilter;
use std::path::PathBuf;

/// Loads the file named by `--config`, or the defaults (which already
/// include `CINESTAGE_*` overrides).
pub fn load_config(args: &ConfigArgs) -> CliResult<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &args.log_dir {
        config.paths.log_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Starts console and file logging for a command, returning the log file.
pub fn start_logging(args: &ConfigArgs, config: &PipelineConfig) -> CliResult<PathBuf> {
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let log_file = run_log_path(&config.log_dir());
    init_logging(&log_file, level)
        .with_context(|| format!("Failed to initialize logging at '{}'", log_file.display()))?;
    Ok(log_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn config_file_and_log_dir_are_layered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cinestage.toml");
        fs::write(&path, "[gates]\nnoise_threshold = 12.5\n").unwrap();

        let args = ConfigArgs {
            config: Some(path),
            verbose: false,
            log_dir: Some(dir.path().join("logs")),
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.gates.noise_threshold, 12.5);
        assert_eq!(config.log_dir(), dir.path().join("logs"));
    }

    #[test]
    fn unreadable_config_names_the_file() {
        let args = ConfigArgs {
            config: Some(PathBuf::from("/surely/not/cinestage.toml")),
            ..ConfigArgs::default()
        };
        let err = load_config(&args).unwrap_err();
        assert!(err.to_string().contains("/surely/not/cinestage.toml"));
    }
}

//! Implementation of the `config` subcommand.
//!
//! Prints or saves the configuration a run would use: the defaults with
//! `CINESTAGE_*` overrides applied, or the file named by `--config`.

use crate::cli::ConfigCommandArgs;
use crate::commands::load_config;
use crate::error::CliResult;
use crate::terminal;

use anyhow::{Context, bail};

pub fn run_config(args: ConfigCommandArgs) -> CliResult<()> {
    if !args.dump && args.save.is_none() {
        bail!("Nothing to do: pass --dump or --save <FILE>");
    }

    let config = load_config(&args.common)?;
    config.validate().context("Invalid configuration")?;

    if args.dump {
        print!("{}", config.to_toml_string()?);
    }
    if let Some(path) = &args.save {
        config
            .save_toml_file(path)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
        terminal::print_success(&format!("Configuration written to {}", path.display()));
    }
    Ok(())
}

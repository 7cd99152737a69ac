// cinestage-cli/src/lib.rs
//
// Library portion of the Cinestage CLI application.
// Contains argument definitions and command logic.

pub mod cli;
pub mod commands;
pub mod error;
pub mod terminal;

// Re-export items needed by the binary or integration tests
pub use cli::{AnalyzeArgs, Cli, Commands, ConfigCommandArgs, PackageArgs, RunArgs};
pub use commands::{
    analyze::run_analyze, config::run_config, package::run_package, run::run_pipeline,
};
pub use error::CliResult;

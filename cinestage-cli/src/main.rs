// ============================================================================
// cinestage-cli/src/main.rs
// ============================================================================
//
// CINESTAGE CLI: Main Entry Point
//
// Parses the command line, dispatches to the matching command and maps any
// error to exit status 1 after printing its cause chain.
//
// AI-ASSISTANT-INFO: Entry point for the cinestage binary

use cinestage_cli::error::render_chain;
use cinestage_cli::terminal::print_error;
use cinestage_cli::{Cli, Commands, run_analyze, run_config, run_package, run_pipeline};

use clap::Parser;
use std::process;

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run_pipeline(args),
        Commands::Analyze(args) => run_analyze(args),
        Commands::Package(args) => run_package(args),
        Commands::Config(args) => run_config(args),
    };

    if let Err(e) = result {
        log::error!("{}", render_chain(&e));
        print_error(&render_chain(&e));
        process::exit(1);
    }
}

// ============================================================================
// cinestage-cli/src/cli.rs
// ============================================================================
//
// COMMAND LINE INTERFACE: Argument Definitions
//
// Defines the clap structures for the `cinestage` binary. Every subcommand
// shares the configuration arguments in `ConfigArgs`, which are layered on top
// of the defaults (or a TOML file) before the core sees them.
//
// AI-ASSISTANT-INFO: CLI argument structures for cinestage

use clap::{Args, Parser, Subcommand, ValueEnum};
use cinestage_core::enhance::InterpolationEngine;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Cinestage: analyse, enhance and package videos for adaptive streaming",
    long_about = "Measures a video's motion, complexity, noise and blur, runs the \
                  enhancement stages those measurements call for, and packages the \
                  result as an HLS ladder with a quality report."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline on one video
    Run(RunArgs),

    /// Measure a video and print its classification without enhancing it
    Analyze(AnalyzeArgs),

    /// Package one or more videos as an HLS ladder
    Package(PackageArgs),

    /// Inspect the effective configuration
    Config(ConfigCommandArgs),
}

/// Options shared by every subcommand that builds a `PipelineConfig`.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML configuration file; missing keys fall back to defaults
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory for log files (defaults to OUTPUT_ROOT/logs)
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Video file to process
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Root directory for run outputs
    #[arg(short, long, value_name = "OUTPUT_ROOT")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub common: ConfigArgs,

    /// Skip caption generation
    #[arg(long)]
    pub no_captions: bool,

    /// Denoise when the measured noise variance is below this value
    #[arg(long, value_name = "F")]
    pub noise_threshold: Option<f64>,

    /// Interpolate when the frame rate is below this value
    #[arg(long = "target-fps", value_name = "F")]
    pub target_fps: Option<f64>,

    /// Frame interpolation engine
    #[arg(long, value_enum, value_name = "ENGINE")]
    pub interpolation: Option<EngineArg>,

    /// Maximum number of ladder rungs encoded at once
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// HLS segment duration in seconds
    #[arg(long, value_name = "S")]
    pub segment_duration: Option<u32>,

    /// ntfy topic URL for run notifications (e.g., https://ntfy.sh/your_topic)
    #[arg(long, value_name = "TOPIC_URL", env = "CINESTAGE_NTFY_TOPIC")]
    pub ntfy: Option<String>,

    /// Explicit run identifier instead of one derived from the input file
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Video file to measure
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory for analysis reports (defaults to OUTPUT_ROOT/<name>_analysis)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub common: ConfigArgs,

    /// Print the decision record as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PackageArgs {
    /// Video files to merge and package, in order
    #[arg(value_name = "INPUT", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Directory for the package (defaults to OUTPUT_ROOT/<name>_package)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub common: ConfigArgs,

    /// Maximum number of ladder rungs encoded at once
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// HLS segment duration in seconds
    #[arg(long, value_name = "S")]
    pub segment_duration: Option<u32>,

    /// Package the merged source as-is instead of mastering it first
    #[arg(long)]
    pub no_master: bool,
}

#[derive(Args, Debug)]
pub struct ConfigCommandArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Print the effective configuration as TOML
    #[arg(long)]
    pub dump: bool,

    /// Write the effective configuration to FILE
    #[arg(long, value_name = "FILE")]
    pub save: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineArg {
    Minterpolate,
    Rife,
}

impl From<EngineArg> for InterpolationEngine {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Minterpolate => InterpolationEngine::Minterpolate,
            EngineArg::Rife => InterpolationEngine::Rife,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_every_override() {
        let cli = Cli::parse_from([
            "cinestage",
            "run",
            "clip.mp4",
            "-o",
            "out",
            "--no-captions",
            "--noise-threshold",
            "80",
            "--target-fps",
            "48",
            "--jobs",
            "2",
            "--segment-duration",
            "4",
            "--interpolation",
            "rife",
            "--verbose",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.input, PathBuf::from("clip.mp4"));
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert!(args.no_captions);
        assert_eq!(args.noise_threshold, Some(80.0));
        assert_eq!(args.target_fps, Some(48.0));
        assert_eq!(args.jobs, Some(2));
        assert_eq!(args.segment_duration, Some(4));
        assert_eq!(args.interpolation, Some(EngineArg::Rife));
        assert!(args.common.verbose);
    }

    #[test]
    fn package_takes_several_inputs() {
        let cli = Cli::parse_from(["cinestage", "package", "a.mp4", "b.mp4", "-o", "pkg"]);
        let Commands::Package(args) = cli.command else {
            panic!("expected package");
        };
        assert_eq!(args.inputs, vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]);
        assert_eq!(args.output, Some(PathBuf::from("pkg")));
        assert!(!args.no_master);
    }

    #[test]
    fn package_requires_an_input() {
        assert!(Cli::try_parse_from(["cinestage", "package"]).is_err());
    }

    #[test]
    fn config_subcommand_reads_file_flag() {
        let cli = Cli::parse_from(["cinestage", "config", "--dump", "--config", "c.toml"]);
        let Commands::Config(args) = cli.command else {
            panic!("expected config");
        };
        assert!(args.dump);
        assert_eq!(args.common.config, Some(PathBuf::from("c.toml")));
    }
}

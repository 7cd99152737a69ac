//! Implementation of the `run` subcommand.
//!
//! Layers the command-line overrides over the loaded configuration, checks
//! for ffmpeg and ffprobe, drives one `Coordinator` run and prints a stage
//! summary. A failed run still leaves its reports on disk; the command then
//! returns an error so the process exits with status 1.

use crate::cli::RunArgs;
use crate::commands::{load_config, start_logging};
use crate::error::{CliResult, require_input_file};
use crate::terminal;

use anyhow::{Context, bail};
use cinestage_core::analysis::SignalExtractor;
use cinestage_core::config::{PipelineConfig, PipelineConfigBuilder};
use cinestage_core::external::{ProcessInvoker, check_dependency};
use cinestage_core::media::FfprobeProber;
use cinestage_core::notifications::NtfyNotificationSender;
use cinestage_core::pipeline::Coordinator;
use cinestage_core::RunOutcome;

use log::{info, warn};

/// Applies the `run` flags on top of `config`.
pub fn apply_overrides(config: PipelineConfig, args: &RunArgs) -> PipelineConfig {
    let mut builder = PipelineConfigBuilder::from_config(config);
    if let Some(output) = &args.output {
        builder = builder.output_root(output);
    }
    if args.no_captions {
        builder = builder.captions_enabled(false);
    }
    if let Some(threshold) = args.noise_threshold {
        builder = builder.noise_threshold(threshold);
    }
    if let Some(fps) = args.target_fps {
        builder = builder.target_frame_rate(fps);
    }
    if let Some(engine) = args.interpolation {
        builder = builder.interpolation_engine(engine.into());
    }
    if let Some(jobs) = args.jobs {
        builder = builder.max_parallel_encodes(jobs);
    }
    if let Some(secs) = args.segment_duration {
        builder = builder.segment_duration_secs(secs);
    }
    if let Some(topic) = &args.ntfy {
        builder = builder.ntfy_topic(topic);
    }
    if let Some(run_id) = &args.run_id {
        builder = builder.run_id(run_id);
    }
    builder.build()
}

pub fn run_pipeline(args: RunArgs) -> CliResult<()> {
    let input = require_input_file(&args.input)?;
    let config = apply_overrides(load_config(&args.common)?, &args);
    config.validate().context("Invalid configuration")?;

    let log_file = start_logging(&args.common, &config)?;
    info!("Input: {}", input.display());
    info!("Output root: {}", config.paths.output_root.display());
    info!("Log file: {}", log_file.display());

    check_dependency(&config.tools.ffmpeg, "-version").context("ffmpeg is required")?;
    check_dependency(&config.tools.ffprobe, "-version").context("ffprobe is required")?;

    let notifier = match &config.ntfy_topic {
        Some(topic) => match NtfyNotificationSender::new(topic) {
            Ok(sender) => Some(sender),
            Err(e) => {
                warn!("Notifications disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let invoker = ProcessInvoker::default();
    let prober = FfprobeProber;
    let analyzer = SignalExtractor::with_ffmpeg(&config.tools, config.analysis);

    let mut coordinator = Coordinator::new(&invoker, &prober, &analyzer, &config);
    if let Some(sender) = &notifier {
        coordinator = coordinator.with_notifier(sender);
    }

    let outcome = coordinator
        .run(&input)
        .with_context(|| format!("Could not start a run for '{}'", input.display()))?;

    print_summary(&outcome);

    if let Some(error) = &outcome.error {
        bail!("Pipeline failed: {}", error);
    }
    if !outcome.succeeded() {
        bail!("Pipeline did not complete");
    }
    Ok(())
}

fn print_summary(outcome: &RunOutcome) {
    let run = &outcome.run;

    terminal::print_section("Run summary");
    terminal::print_status("Run id", run.run_id(), false);
    terminal::print_status("Input", &run.original().path.display().to_string(), false);
    terminal::print_status("Run directory", &outcome.layout.run_dir().display().to_string(), false);
    if let Some(secs) = run.duration_secs() {
        terminal::print_status("Duration", &terminal::format_duration(secs), false);
    }
    if let Some(record) = run.decision_record() {
        terminal::print_status(
            "Quality score",
            &format!("{:.2}", record.overall_quality_score),
            true,
        );
    }

    terminal::print_section("Stages");
    for stage in run.stages() {
        let detail = stage.error.as_deref().or(stage.skip_reason.as_deref());
        terminal::print_stage(&stage.stage_name, stage.status, detail);
    }

    if let Some(report) = run.final_report_path() {
        terminal::print_status("Final report", &report.display().to_string(), true);
    }
    if let Some(video) = run.delivery_video() {
        terminal::print_status("Delivery video", &video.display().to_string(), true);
    }
    terminal::print_status(
        "Run report",
        &outcome.layout.run_report().display().to_string(),
        false,
    );

    match run.failure() {
        Some(trace) => {
            terminal::print_status("Failed stage", &trace.stage, true);
            terminal::print_status("Failure kind", &trace.kind, false);
        }
        None if outcome.succeeded() => terminal::print_success("Pipeline completed"),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use cinestage_core::enhance::InterpolationEngine;
    use clap::Parser;
    use std::path::PathBuf;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["cinestage", "run", "clip.mp4"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn flags_override_loaded_configuration() {
        let args = run_args(&[
            "-o",
            "renders",
            "--no-captions",
            "--noise-threshold",
            "55",
            "--target-fps",
            "50",
            "--interpolation",
            "rife",
            "--jobs",
            "3",
            "--segment-duration",
            "4",
            "--run-id",
            "take_2",
        ]);
        let config = apply_overrides(PipelineConfig::default(), &args);

        assert_eq!(config.paths.output_root, PathBuf::from("renders"));
        assert!(!config.captions.enabled);
        assert_eq!(config.gates.noise_threshold, 55.0);
        assert_eq!(config.gates.target_frame_rate, 50.0);
        assert_eq!(config.enhance.interpolation_engine, InterpolationEngine::Rife);
        assert_eq!(config.packaging.max_parallel_encodes, Some(3));
        assert_eq!(config.packaging.segment_duration_secs, 4);
        assert_eq!(config.run_id.as_deref(), Some("take_2"));
    }

    #[test]
    fn absent_flags_keep_loaded_values() {
        let mut base = PipelineConfig::default();
        base.gates.noise_threshold = 12.0;
        base.captions.enabled = true;
        let config = apply_overrides(base, &run_args(&[]));
        assert_eq!(config.gates.noise_threshold, 12.0);
        assert!(config.captions.enabled);
    }
}

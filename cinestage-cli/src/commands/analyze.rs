//! Implementation of the `analyze` subcommand.
//!
//! Runs signal extraction and the decision engine on one file without any
//! enhancement, writes the analysis reports and prints the classification.

use crate::cli::AnalyzeArgs;
use crate::commands::{load_config, start_logging};
use crate::error::{CliResult, require_input_file};
use crate::terminal;

use anyhow::Context;
use cinestage_core::analysis::{AnalysisContext, AnalysisOutcome, SignalExtractor, run_analysis};
use cinestage_core::decision::{ChannelSummary, DecisionEngine};
use cinestage_core::external::{CancelToken, ProcessInvoker, check_dependency};
use cinestage_core::media::{FfprobeProber, MediaProber};

use std::path::{Path, PathBuf};

/// Directory the reports go to when `--output` is absent.
pub fn default_analysis_dir(output_root: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    output_root.join(format!("{stem}_analysis"))
}

pub fn run_analyze(args: AnalyzeArgs) -> CliResult<()> {
    let input = require_input_file(&args.input)?;
    let config = load_config(&args.common)?;
    config.validate().context("Invalid configuration")?;
    start_logging(&args.common, &config)?;

    check_dependency(&config.tools.ffmpeg, "-version").context("ffmpeg is required")?;
    check_dependency(&config.tools.ffprobe, "-version").context("ffprobe is required")?;

    let artifact = FfprobeProber
        .probe(&input)
        .with_context(|| format!("Failed to probe '{}'", input.display()))?;

    let out_dir = args
        .output
        .clone()
        .unwrap_or_else(|| default_analysis_dir(&config.paths.output_root, &input));

    let invoker = ProcessInvoker::default();
    let analyzer = SignalExtractor::with_ffmpeg(&config.tools, config.analysis);
    let engine = DecisionEngine::new(config.thresholds);
    let cancel = CancelToken::new();
    let ctx = AnalysisContext {
        analyzer: &analyzer,
        invoker: &invoker,
        engine: &engine,
        tools: &config.tools,
        settings: &config.analysis,
        cancel: &cancel,
    };

    let outcome = run_analysis(&ctx, &artifact, &out_dir)
        .with_context(|| format!("Analysis of '{}' failed", input.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.record)?);
    } else {
        print_analysis(&outcome, &out_dir);
    }
    Ok(())
}

fn channel_line(summary: &ChannelSummary) -> String {
    match summary.peak {
        Some(peak) => format!(
            "{} (avg {:.4}, peak {:.4})",
            summary.classification, summary.average, peak
        ),
        None => format!("{} (avg {:.4})", summary.classification, summary.average),
    }
}

fn print_analysis(outcome: &AnalysisOutcome, out_dir: &Path) {
    let record = &outcome.record;

    terminal::print_section("Analysis");
    terminal::print_status("Video", &record.video_name, true);
    terminal::print_status("Frame rate", &format!("{:.3} fps", record.frame_rate), false);
    terminal::print_status("Frames analyzed", &record.frames_analyzed.to_string(), false);
    if let Some(scenes) = &outcome.scenes {
        terminal::print_status("Scene cuts", &scenes.len().to_string(), false);
    }

    terminal::print_section("Classification");
    terminal::print_status("Motion", &channel_line(&record.metrics.motion), false);
    terminal::print_status("Complexity", &channel_line(&record.metrics.complexity), false);
    terminal::print_status("Noise", &channel_line(&record.metrics.noise), false);
    terminal::print_status("Blur", &channel_line(&record.metrics.blur), false);
    terminal::print_status(
        "Quality score",
        &format!("{:.2}", record.overall_quality_score),
        true,
    );

    terminal::print_section("Recommendations");
    for recommendation in &record.recommendations {
        terminal::print_item(recommendation);
    }

    terminal::print_status("Reports", &out_dir.display().to_string(), false);
    terminal::print_status("Decision", &outcome.decision_path.display().to_string(), false);
}

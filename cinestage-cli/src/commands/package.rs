//! Implementation of the `package` subcommand.
//!
//! Merges one or more sources and packages them as an HLS ladder without
//! running analysis or enhancement.

use crate::cli::PackageArgs;
use crate::commands::{load_config, start_logging};
use crate::error::{CliResult, require_input_file};
use crate::terminal;

use anyhow::Context;
use cinestage_core::config::{PipelineConfig, PipelineConfigBuilder};
use cinestage_core::external::{CancelToken, ProcessInvoker, check_dependency};
use cinestage_core::media::{FfprobeProber, MediaProber};
use cinestage_core::packaging::{PackageResult, package};
use cinestage_core::pipeline::StageContext;

use log::info;
use std::path::Path;

pub fn apply_overrides(config: PipelineConfig, args: &PackageArgs) -> PipelineConfig {
    let mut builder = PipelineConfigBuilder::from_config(config);
    if let Some(jobs) = args.jobs {
        builder = builder.max_parallel_encodes(jobs);
    }
    if let Some(secs) = args.segment_duration {
        builder = builder.segment_duration_secs(secs);
    }
    if args.no_master {
        builder = builder.normalize_master(false);
    }
    builder.build()
}

/// Package name taken from the first source's file stem.
pub fn package_name(first: &Path) -> String {
    first
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string())
}

pub fn run_package(args: PackageArgs) -> CliResult<()> {
    let inputs = args
        .inputs
        .iter()
        .map(|p| require_input_file(p))
        .collect::<CliResult<Vec<_>>>()?;

    let config = apply_overrides(load_config(&args.common)?, &args);
    config.validate().context("Invalid configuration")?;
    start_logging(&args.common, &config)?;

    check_dependency(&config.tools.ffmpeg, "-version").context("ffmpeg is required")?;
    check_dependency(&config.tools.ffprobe, "-version").context("ffprobe is required")?;

    let prober = FfprobeProber;
    let sources = inputs
        .iter()
        .map(|path| {
            prober
                .probe(path)
                .with_context(|| format!("Failed to probe '{}'", path.display()))
        })
        .collect::<CliResult<Vec<_>>>()?;

    let name = package_name(&inputs[0]);
    let out_dir = args
        .output
        .clone()
        .unwrap_or_else(|| config.paths.output_root.join(format!("{name}_package")));
    info!("Packaging {} source(s) into {}", sources.len(), out_dir.display());

    let invoker = ProcessInvoker::default();
    let cancel = CancelToken::new();
    let ctx = StageContext {
        invoker: &invoker,
        prober: &prober,
        config: &config,
        cancel: &cancel,
    };

    let result = package(&ctx, &sources, &name, &out_dir).context("Packaging failed")?;
    print_package(&result);
    Ok(())
}

fn print_package(result: &PackageResult) {
    terminal::print_section("Package");
    terminal::print_status("Video", &result.video_name, true);
    terminal::print_status("Merge", &format!("{:?}", result.merge_method).to_lowercase(), false);
    terminal::print_status("Master video", &result.final_video.display().to_string(), false);

    terminal::print_section("Variants");
    for variant in &result.variants {
        terminal::print_item(&format!(
            "{} {} @ {} kbps ({} segments)",
            variant.profile.name,
            variant.profile.resolution,
            variant.profile.bitrate_kbps,
            variant.segment_paths.len()
        ));
    }
    terminal::print_status("Manifest", &result.master_manifest.display().to_string(), true);
    terminal::print_success("Packaging completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn package_flags_are_applied() {
        let Commands::Package(args) = Cli::parse_from([
            "cinestage",
            "package",
            "a.mp4",
            "--jobs",
            "1",
            "--segment-duration",
            "2",
            "--no-master",
        ])
        .command
        else {
            panic!("expected package");
        };
        let config = apply_overrides(PipelineConfig::default(), &args);
        assert_eq!(config.packaging.max_parallel_encodes, Some(1));
        assert_eq!(config.packaging.segment_duration_secs, 2);
        assert!(!config.packaging.normalize_master);
    }

    #[test]
    fn name_comes_from_first_source() {
        assert_eq!(package_name(Path::new("/in/part_1.mp4")), "part_1");
    }
}

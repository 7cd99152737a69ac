// ============================================================================
// cinestage-core/src/enhance/interpolate.rs
// ============================================================================
//
// FRAME INTERPOLATION: Raising the Frame Rate to the Target
//
// Two engines are supported. `minterpolate` runs entirely inside the
// transcode engine. `rife` extracts a PNG sequence into a scoped temp
// directory, lets the RIFE binary synthesize the missing frames, and encodes
// the result at the target rate. The temp directory is dropped on every exit
// path.

use super::{EnhanceOutput, FRAME_PATTERN, InterpolationEngine, extract_frames_command, fps_arg, h264_encode};
use crate::error::{CoreError, CoreResult};
use crate::external::{ExpectedOutput, Filter, FilterGraph, Tool};
use crate::logging::log_subsection;
use crate::media::MediaArtifact;
use crate::pipeline::StageContext;
use crate::temp_files::create_temp_dir;

use log::{debug, info};
use serde_json::json;
use std::path::Path;

/// The motion-compensated interpolation filter targeting `target_fps`.
pub fn minterpolate_filter(target_fps: f64) -> FilterGraph {
    FilterGraph::simple([Filter::new("minterpolate")
        .kv("mi_mode", "mci")
        .kv("mc_mode", "aobmc")
        .kv("vsbmc", 1)
        .kv("fps", fps_arg(target_fps))])
}

/// Interpolates `input` to `target_fps`, writing `output`.
pub fn interpolate(
    ctx: &StageContext<'_>,
    input: &MediaArtifact,
    output: &Path,
    target_fps: f64,
) -> CoreResult<EnhanceOutput> {
    log_subsection("Frame Interpolation");
    if !(input.frame_rate.is_finite() && input.frame_rate > 0.0) {
        return Err(CoreError::Configuration(format!(
            "cannot interpolate {}: source frame rate unknown",
            input.path.display()
        )));
    }
    let multiplier = target_fps / input.frame_rate;
    let engine = ctx.config.enhance.interpolation_engine;
    info!(
        "Interpolating {} from {:.3} to {} fps ({:.2}x) with {}",
        input.path.display(),
        input.frame_rate,
        fps_arg(target_fps),
        multiplier,
        engine
    );

    match engine {
        InterpolationEngine::Minterpolate => run_minterpolate(ctx, input, output, target_fps)?,
        InterpolationEngine::Rife => run_rife(ctx, input, output, target_fps, multiplier)?,
    }

    let artifact = ctx.prober.probe(output)?;
    Ok(EnhanceOutput {
        metadata: json!({
            "engine": engine,
            "original_fps": input.frame_rate,
            "target_fps": target_fps,
            "multiplier": (multiplier * 100.0).round() / 100.0,
            "output_fps": artifact.frame_rate,
        }),
        artifact,
    })
}

fn run_minterpolate(
    ctx: &StageContext<'_>,
    input: &MediaArtifact,
    output: &Path,
    target_fps: f64,
) -> CoreResult<()> {
    let command = ctx
        .config
        .tools
        .ffmpeg()
        .opt("-i", &input.path)
        .filter("-filter:v", &minterpolate_filter(target_fps));
    let command = h264_encode(command, &ctx.config.enhance)
        .opt("-c:a", "copy")
        .output(output);
    ctx.invoker.execute(&command, ctx.cancel)?;
    Ok(())
}

fn run_rife(
    ctx: &StageContext<'_>,
    input: &MediaArtifact,
    output: &Path,
    target_fps: f64,
    multiplier: f64,
) -> CoreResult<()> {
    let tools = &ctx.config.tools;
    let stage_dir = output.parent().unwrap_or_else(|| Path::new("."));
    let scratch = create_temp_dir(&ctx.config.paths, stage_dir, "interpolate")?;
    let frames_dir = scratch.path().join("frames");
    let interpolated_dir = scratch.path().join("interpolated");

    ctx.invoker
        .execute(&extract_frames_command(tools, &input.path, &frames_dir), ctx.cancel)?;

    let source_frames = input
        .frame_count
        .unwrap_or_else(|| (input.duration_secs * input.frame_rate).round() as u64)
        .max(1);
    let target_frames = (source_frames as f64 * multiplier).ceil() as u64;
    debug!("RIFE: {} source frames -> {} target frames", source_frames, target_frames);

    let rife = tools
        .command(Tool::FrameInterpolation)
        .opt("-i", &frames_dir)
        .opt("-o", &interpolated_dir)
        .opt("-m", &ctx.config.enhance.rife_model)
        .opt("-n", target_frames.to_string())
        .opt("-f", FRAME_PATTERN)
        .expect(ExpectedOutput::NonEmptyDir(interpolated_dir.clone()));
    ctx.invoker.execute(&rife, ctx.cancel)?;

    let encode = tools
        .ffmpeg()
        .opt("-framerate", fps_arg(target_fps))
        .opt("-i", interpolated_dir.join(FRAME_PATTERN));
    let encode = h264_encode(encode, &ctx.config.enhance).output(output);
    ctx.invoker.execute(&encode, ctx.cancel)?;
    Ok(())
}

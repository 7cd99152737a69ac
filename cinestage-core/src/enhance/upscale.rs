// ============================================================================
// cinestage-core/src/enhance/upscale.rs
// ============================================================================
//
// SUPER-RESOLUTION UPSCALE
//
// 1. Extract every frame to PNG inside a scoped temp directory
// 2. Run the super-resolution engine over the whole directory
// 3. Re-encode the upscaled sequence at the source frame rate
//
// The result carries no audio; the final report muxes the original audio
// back in.

use super::{EnhanceOutput, FRAME_PATTERN, extract_frames_command, fps_arg, h264_encode};
use crate::error::CoreResult;
use crate::external::{ExpectedOutput, Tool};
use crate::logging::log_subsection;
use crate::media::MediaArtifact;
use crate::pipeline::StageContext;
use crate::temp_files::create_temp_dir;

use log::{info, warn};
use serde_json::json;
use std::path::Path;

/// Frame rate used to re-encode when the source rate is unknown.
const FALLBACK_FRAME_RATE: f64 = 30.0;

/// Upscales `input` by the configured factor, writing `output`.
pub fn upscale(ctx: &StageContext<'_>, input: &MediaArtifact, output: &Path) -> CoreResult<EnhanceOutput> {
    log_subsection("Upscale");
    let tools = &ctx.config.tools;
    let enhance = &ctx.config.enhance;
    let stage_dir = output.parent().unwrap_or_else(|| Path::new("."));

    let fps = if input.frame_rate.is_finite() && input.frame_rate > 0.0 {
        input.frame_rate
    } else {
        warn!(
            "Frame rate of {} unknown; re-encoding at {} fps",
            input.path.display(),
            FALLBACK_FRAME_RATE
        );
        FALLBACK_FRAME_RATE
    };

    let scratch = create_temp_dir(&ctx.config.paths, stage_dir, "upscale")?;
    let frames_dir = scratch.path().join("frames");
    let upscaled_dir = scratch.path().join("upscaled");

    info!("Extracting frames from {}", input.path.display());
    ctx.invoker
        .execute(&extract_frames_command(tools, &input.path, &frames_dir), ctx.cancel)?;

    info!(
        "Running super-resolution ({}, {}x)",
        enhance.upscale_model, enhance.upscale_factor
    );
    let sr = tools
        .command(Tool::SuperResolution)
        .opt("-i", &frames_dir)
        .opt("-o", &upscaled_dir)
        .opt("-n", &enhance.upscale_model)
        .opt("-s", enhance.upscale_factor.to_string())
        .opt("-f", "png")
        .expect(ExpectedOutput::NonEmptyDir(upscaled_dir.clone()));
    ctx.invoker.execute(&sr, ctx.cancel)?;

    let encode = tools
        .ffmpeg()
        .opt("-framerate", fps_arg(fps))
        .opt("-i", upscaled_dir.join(FRAME_PATTERN));
    let encode = h264_encode(encode, enhance).output(output);
    ctx.invoker.execute(&encode, ctx.cancel)?;
    drop(scratch);

    let artifact = ctx.prober.probe(output)?;
    info!(
        "Upscaled {} -> {}",
        input.resolution, artifact.resolution
    );
    Ok(EnhanceOutput {
        metadata: json!({
            "model": enhance.upscale_model,
            "scale_factor": format!("{}x", enhance.upscale_factor),
            "input_resolution": input.resolution.to_string(),
            "output_resolution": artifact.resolution.to_string(),
            "frame_rate": fps,
        }),
        artifact,
    })
}

// ============================================================================
// cinestage-core/src/enhance/denoise.rs
// ============================================================================
//
// DENOISE: hqdn3d Through the Transcode Engine

use super::{EnhanceOutput, h264_encode};
use crate::config::DenoiseParams;
use crate::error::CoreResult;
use crate::external::{Filter, FilterGraph};
use crate::logging::log_subsection;
use crate::media::MediaArtifact;
use crate::pipeline::StageContext;

use log::info;
use serde_json::json;
use std::path::Path;

/// The hqdn3d filter for `params`.
pub fn denoise_filter(params: &DenoiseParams) -> FilterGraph {
    FilterGraph::simple([Filter::new("hqdn3d")
        .pos(params.luma_spatial)
        .pos(params.chroma_spatial)
        .pos(params.luma_temporal)
        .pos(params.chroma_temporal)])
}

/// Denoises `input` into `output`.
///
/// `noise_variance` is the evidence the gate used; it is recorded in the
/// stage metadata.
pub fn denoise(
    ctx: &StageContext<'_>,
    input: &MediaArtifact,
    output: &Path,
    noise_variance: f64,
) -> CoreResult<EnhanceOutput> {
    log_subsection("Denoise");
    let enhance = &ctx.config.enhance;
    let filter = denoise_filter(&enhance.denoise);
    info!("Applying {} to {}", filter.render(), input.path.display());

    let command = ctx
        .config
        .tools
        .ffmpeg()
        .opt("-i", &input.path)
        .filter("-vf", &filter);
    let command = h264_encode(command, enhance)
        .opt("-c:a", "copy")
        .output(output);
    ctx.invoker.execute(&command, ctx.cancel)?;

    let artifact = ctx.prober.probe(output)?;
    info!("Denoised artifact: {}", artifact.path.display());
    Ok(EnhanceOutput {
        metadata: json!({
            "noise_variance": noise_variance,
            "filter": filter.render(),
            "crf": enhance.crf,
            "preset": enhance.preset,
            "input": input.path,
        }),
        artifact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_renders_like_ffmpeg_expects() {
        assert_eq!(denoise_filter(&DenoiseParams::default()).render(), "hqdn3d=4:3:6:4.5");
    }
}

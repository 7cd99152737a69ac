// ============================================================================
// cinestage-core/src/packaging/merge.rs
// ============================================================================
//
// SOURCE MERGE: Single Copy-Through or Validated Concatenation
//
// A single source is stream-copied. Several sources are only concatenated
// losslessly when their codec parameters agree; otherwise the merge either
// fails with `IncompatibleSources` or, when configured, re-encodes every
// source onto the first source's resolution and frame rate before joining.

use crate::enhance::{fps_arg, h264_encode};
use crate::error::{CoreError, CoreResult};
use crate::external::{Filter, FilterChain, FilterGraph};
use crate::media::{CodecParameters, MediaArtifact};
use crate::pipeline::StageContext;
use crate::temp_files::create_temp_dir;

use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// How the sources were joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    Copy,
    Concat,
    Normalized,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub artifact: MediaArtifact,
    pub method: MergeMethod,
}

/// Returns a description of the first mismatch, if any.
pub fn check_compatibility(sources: &[MediaArtifact]) -> Option<String> {
    let (first, rest) = sources.split_first()?;
    let baseline: CodecParameters = first.codec_parameters();
    rest.iter().find_map(|s| {
        let params = s.codec_parameters();
        (params != baseline).then(|| {
            format!(
                "{} ({}) does not match {} ({})",
                s.path.display(),
                params,
                first.path.display(),
                baseline
            )
        })
    })
}

/// Joins `sources` into `output`.
pub fn merge_sources(
    ctx: &StageContext<'_>,
    sources: &[MediaArtifact],
    output: &Path,
) -> CoreResult<MergeOutcome> {
    let method = match sources {
        [] => {
            return Err(CoreError::Configuration(
                "packaging needs at least one source".to_string(),
            ));
        }
        [single] => {
            info!("Single source, copying {}", single.path.display());
            let command = ctx
                .config
                .tools
                .ffmpeg()
                .opt("-i", &single.path)
                .opt("-c", "copy")
                .output(output);
            ctx.invoker.execute(&command, ctx.cancel)?;
            MergeMethod::Copy
        }
        _ => match check_compatibility(sources) {
            None => {
                concat_copy(ctx, sources, output)?;
                MergeMethod::Concat
            }
            Some(mismatch) if ctx.config.packaging.normalize_mismatched_sources => {
                warn!("Sources differ, re-encoding to a common baseline: {}", mismatch);
                concat_normalized(ctx, sources, output)?;
                MergeMethod::Normalized
            }
            Some(mismatch) => return Err(CoreError::IncompatibleSources(mismatch)),
        },
    };

    let artifact = ctx.prober.probe(output)?;
    Ok(MergeOutcome { artifact, method })
}

fn concat_copy(ctx: &StageContext<'_>, sources: &[MediaArtifact], output: &Path) -> CoreResult<()> {
    info!("Concatenating {} compatible sources", sources.len());
    let stage_dir = output.parent().unwrap_or_else(|| Path::new("."));
    let scratch = create_temp_dir(&ctx.config.paths, stage_dir, "concat")?;
    let list = scratch.path().join("sources.txt");
    fs::write(&list, concat_list(sources))?;

    let command = ctx
        .config
        .tools
        .ffmpeg()
        .opt("-f", "concat")
        .opt("-safe", "0")
        .opt("-i", &list)
        .opt("-c", "copy")
        .output(output);
    ctx.invoker.execute(&command, ctx.cancel)?;
    Ok(())
}

/// Body of an ffmpeg concat-demuxer list.
pub fn concat_list(sources: &[MediaArtifact]) -> String {
    sources
        .iter()
        .map(|s| {
            let path = s.canonical_path.to_string_lossy().replace('\'', "'\\''");
            format!("file '{path}'\n")
        })
        .collect()
}

/// Scale/pad/fps/format graph joining every input onto the first one's baseline.
pub fn normalize_graph(sources: &[MediaArtifact]) -> Option<FilterGraph> {
    let first = sources.first()?;
    let (w, h) = (first.resolution.width, first.resolution.height);
    let fps = if first.frame_rate > 0.0 { first.frame_rate } else { 30.0 };

    let mut graph = FilterGraph::new();
    let mut concat = FilterChain::new();
    for i in 0..sources.len() {
        let label = format!("v{i}");
        graph = graph.chain(
            FilterChain::new()
                .input(&format!("{i}:v"))
                .then(
                    Filter::new("scale")
                        .pos(w)
                        .pos(h)
                        .kv("force_original_aspect_ratio", "decrease"),
                )
                .then(
                    Filter::new("pad")
                        .pos(w)
                        .pos(h)
                        .pos("(ow-iw)/2")
                        .pos("(oh-ih)/2"),
                )
                .then(Filter::new("fps").pos(fps_arg(fps)))
                .then(Filter::new("format").pos("yuv420p"))
                .then(Filter::new("setsar").pos(1))
                .output(&label),
        );
        concat = concat.input(&label);
    }
    let concat = concat
        .then(
            Filter::new("concat")
                .kv("n", sources.len())
                .kv("v", 1)
                .kv("a", 0),
        )
        .output("outv");
    Some(graph.chain(concat))
}

fn concat_normalized(
    ctx: &StageContext<'_>,
    sources: &[MediaArtifact],
    output: &Path,
) -> CoreResult<()> {
    let graph = normalize_graph(sources).ok_or_else(|| {
        CoreError::Configuration("packaging needs at least one source".to_string())
    })?;
    let mut command = ctx.config.tools.ffmpeg();
    for source in sources {
        command = command.opt("-i", &source.path);
    }
    let command = command
        .filter("-filter_complex", &graph)
        .opt("-map", "[outv]");
    let command = h264_encode(command, &ctx.config.enhance).output(output);
    ctx.invoker.execute(&command, ctx.cancel)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mocks::sample_artifact;
    use crate::media::Resolution;

    #[test]
    fn identical_sources_are_compatible() {
        let a = sample_artifact(Path::new("/v/a.mp4"), 30.0);
        let b = sample_artifact(Path::new("/v/b.mp4"), 30.0);
        assert_eq!(check_compatibility(&[a, b]), None);
    }

    #[test]
    fn mismatch_names_the_offending_source() {
        let a = sample_artifact(Path::new("/v/a.mp4"), 30.0);
        let mut b = sample_artifact(Path::new("/v/b.mp4"), 30.0);
        b.resolution = Resolution::new(1920, 1080);
        let detail = check_compatibility(&[a.clone(), b]).unwrap();
        assert!(detail.contains("/v/b.mp4"));
        assert!(detail.contains("1920x1080"));

        let c = sample_artifact(Path::new("/v/c.mp4"), 25.0);
        assert!(check_compatibility(&[a, c]).is_some());
    }

    #[test]
    fn concat_list_quotes_paths() {
        let a = sample_artifact(Path::new("/v/it's here.mp4"), 30.0);
        assert_eq!(concat_list(&[a]), "file '/v/it'\\''s here.mp4'\n");
    }

    #[test]
    fn normalize_graph_labels_every_input() {
        let a = sample_artifact(Path::new("/v/a.mp4"), 30.0);
        let b = sample_artifact(Path::new("/v/b.mp4"), 24.0);
        let rendered = normalize_graph(&[a, b]).unwrap().render();
        assert!(rendered.starts_with(
            "[0:v]scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2,fps=30,format=yuv420p,setsar=1[v0];"
        ));
        assert!(rendered.contains("[1:v]scale=1280:720"));
        assert!(rendered.ends_with("[v0][v1]concat=n=2:v=1:a=0[outv]"));
    }
}

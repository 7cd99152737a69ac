// ============================================================================
// cinestage-core/src/packaging/mod.rs
// ============================================================================
//
// ABR PACKAGING: Merge, Master, Ladder Encodes and Master Manifest
//
// This module turns one or more enhanced sources into an HLS package:
//
// 1. Merge the sources (copy-through or validated concatenation)
// 2. Optionally normalize the merged file to the top rung and master frame rate
// 3. Encode every ladder rung in a bounded worker pool
// 4. Once all rungs are done, write the master manifest in canonical order
//
// A failing rung cancels its siblings and fails the whole package; no
// manifest is written in that case.
//
// KEY COMPONENTS:
// - EncodingProfile: One ladder rung
// - Variant / MasterManifest: Encoded rungs and the playlist that lists them
// - package: The packaging stage
// - encode_ladder: Parallel rung encodes

pub mod ladder;
pub mod manifest;
pub mod merge;

// ---- Internal crate imports ----
use crate::error::{CoreError, CoreResult};
use crate::external::{CancelToken, Filter, FilterGraph};
use crate::logging::log_subsection;
use crate::media::MediaArtifact;
use crate::pipeline::StageContext;

// ---- External crate imports ----
use log::{debug, error, info};
use rayon::prelude::*;
use serde::Serialize;

// ---- Standard library imports ----
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub use ladder::EncodingProfile;
pub use manifest::{MasterManifest, Variant};
pub use merge::{MergeMethod, MergeOutcome};

/// Name of the master playlist inside the HLS directory.
pub const MASTER_PLAYLIST: &str = "master.m3u8";

/// Everything the packaging stage produced.
#[derive(Debug, Clone, Serialize)]
pub struct PackageResult {
    pub video_name: String,
    pub merged_video: PathBuf,
    pub merge_method: MergeMethod,
    pub final_video: PathBuf,
    pub master_manifest: PathBuf,
    pub variants: Vec<Variant>,
    pub hls_directory: PathBuf,
}

/// Packages `sources` under `out_dir`, naming derived files after `name`.
pub fn package(
    ctx: &StageContext<'_>,
    sources: &[MediaArtifact],
    name: &str,
    out_dir: &Path,
) -> CoreResult<PackageResult> {
    let packaging = &ctx.config.packaging;
    fs::create_dir_all(out_dir)?;

    log_subsection("Merge");
    let merged_path = out_dir.join("merged").join(format!("{name}_merged.mp4"));
    let merged = merge::merge_sources(ctx, sources, &merged_path)?;

    let master = if packaging.normalize_master {
        log_subsection("Master");
        let master_path = out_dir.join("master").join(format!("{name}_master.mp4"));
        create_master(ctx, &merged.artifact, &master_path)?
    } else {
        merged.artifact.clone()
    };

    log_subsection("Ladder");
    let hls_dir = out_dir.join("hls");
    if hls_dir.exists() {
        fs::remove_dir_all(&hls_dir)?;
    }
    fs::create_dir_all(&hls_dir)?;

    let variants = encode_ladder(ctx, &master, &hls_dir.join("variants"))?;

    let manifest = MasterManifest::assemble(&packaging.ladder, &variants, &hls_dir)?;
    let manifest_path = hls_dir.join(MASTER_PLAYLIST);
    manifest.write(&manifest_path)?;
    info!(
        "Master manifest with {} variants: {}",
        manifest.variant_count(),
        manifest_path.display()
    );

    let result = PackageResult {
        video_name: name.to_string(),
        merged_video: merged.artifact.path.clone(),
        merge_method: merged.method,
        final_video: master.path.clone(),
        master_manifest: manifest_path,
        variants,
        hls_directory: hls_dir,
    };
    fs::write(
        out_dir.join(format!("{name}_package.json")),
        serde_json::to_string_pretty(&result)?,
    )?;
    Ok(result)
}

/// The mastering filter: lanczos scale to the top rung plus light sharpening.
pub fn master_filter(width: u32, height: u32) -> FilterGraph {
    FilterGraph::simple([
        Filter::new("scale").pos(width).pos(height).kv("flags", "lanczos"),
        Filter::new("unsharp")
            .pos(5)
            .pos(5)
            .pos("1.0")
            .pos(5)
            .pos(5)
            .pos("0.0"),
    ])
}

fn create_master(
    ctx: &StageContext<'_>,
    merged: &MediaArtifact,
    output: &Path,
) -> CoreResult<MediaArtifact> {
    let packaging = &ctx.config.packaging;
    let resolution = packaging.master_resolution().ok_or_else(|| {
        CoreError::Configuration("encoding ladder must contain at least one profile".to_string())
    })?;
    info!(
        "Normalizing master to {} @ {} fps",
        resolution, packaging.master_frame_rate
    );

    let command = ctx
        .config
        .tools
        .ffmpeg()
        .opt("-i", &merged.path)
        .filter("-vf", &master_filter(resolution.width, resolution.height))
        .opt("-r", crate::enhance::fps_arg(packaging.master_frame_rate))
        .opt("-c:v", "libx264")
        .opt("-preset", &packaging.master_preset)
        .opt("-crf", ctx.config.enhance.crf.to_string())
        .opt("-pix_fmt", "yuv420p")
        .opt("-c:a", "copy")
        .opt("-movflags", "+faststart")
        .output(output);
    ctx.invoker.execute(&command, ctx.cancel)?;
    ctx.prober.probe(output)
}

/// Encodes every rung of the configured ladder from `source`.
///
/// Rungs run on a dedicated pool of `worker_count()` threads. Results come
/// back in ladder order. The first rung failure cancels the rest and is
/// returned.
pub fn encode_ladder(
    ctx: &StageContext<'_>,
    source: &MediaArtifact,
    variants_dir: &Path,
) -> CoreResult<Vec<Variant>> {
    let packaging = &ctx.config.packaging;
    let ladder = &packaging.ladder;
    let workers = packaging.worker_count();
    let frame_rate = if source.frame_rate > 0.0 {
        source.frame_rate
    } else {
        packaging.master_frame_rate
    };
    info!(
        "Encoding {} rungs with {} workers ({}s segments, GOP {} frames)",
        ladder.len(),
        workers,
        packaging.segment_duration_secs,
        ladder::gop_frames(packaging.segment_duration_secs, frame_rate)
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("ladder-{i}"))
        .build()
        .map_err(|e| CoreError::WorkerPool(format!("failed to build ladder pool: {e}")))?;

    let rung_cancel = ctx.cancel.child();
    let finished: Mutex<Vec<Variant>> = Mutex::new(Vec::with_capacity(ladder.len()));
    let failures: Mutex<Vec<(usize, CoreError)>> = Mutex::new(Vec::new());

    pool.install(|| {
        ladder.par_iter().enumerate().for_each(|(index, profile)| {
            if rung_cancel.is_cancelled() {
                return;
            }
            let variant_dir = variants_dir.join(&profile.name);
            match encode_rung(ctx, source, profile, index, frame_rate, &variant_dir, &rung_cancel) {
                Ok(variant) => {
                    debug!("Rung {} finished", profile.name);
                    lock(&finished).push(variant);
                }
                Err(e) => {
                    if !e.is_cancelled() {
                        error!("Rung {} failed: {}", profile.name, e);
                    }
                    rung_cancel.cancel();
                    lock(&failures).push((index, e));
                }
            }
        });
    });

    let failures = failures
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(err) = first_failure(failures) {
        return Err(err);
    }
    if ctx.cancel.is_cancelled() {
        return Err(CoreError::Cancelled("ladder encode".to_string()));
    }

    let mut variants = finished
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    variants.sort_by_key(|v| v.ladder_index);
    Ok(variants)
}

fn encode_rung(
    ctx: &StageContext<'_>,
    source: &MediaArtifact,
    profile: &EncodingProfile,
    index: usize,
    frame_rate: f64,
    variant_dir: &Path,
    cancel: &CancelToken,
) -> CoreResult<Variant> {
    let packaging = &ctx.config.packaging;
    fs::create_dir_all(variant_dir)?;
    info!(
        "Encoding {} ({} @ {}k)",
        profile.name, profile.resolution, profile.bitrate_kbps
    );

    let command = ladder::rung_arguments(
        ctx.config.tools.ffmpeg().opt("-i", &source.path),
        profile,
        packaging.segment_duration_secs,
        frame_rate,
        &packaging.rung_preset,
        variant_dir,
    );
    ctx.invoker.execute(&command, cancel)?;

    Ok(Variant {
        profile: profile.clone(),
        playlist_path: variant_dir.join(format!("{}.m3u8", profile.name)),
        segment_paths: list_segments(variant_dir, &profile.name)?,
        ladder_index: index,
    })
}

fn list_segments(dir: &Path, name: &str) -> CoreResult<Vec<PathBuf>> {
    let prefix = format!("{name}_");
    let mut segments: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "ts")
                && p.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(&prefix))
        })
        .collect();
    segments.sort();
    Ok(segments)
}

/// Picks the error to report: the lowest-index genuine failure, otherwise
/// the first cancellation.
fn first_failure(mut failures: Vec<(usize, CoreError)>) -> Option<CoreError> {
    failures.sort_by_key(|(index, _)| *index);
    let genuine = failures.iter().position(|(_, e)| !e.is_cancelled());
    match genuine {
        Some(pos) => Some(failures.swap_remove(pos).1),
        None => failures.into_iter().next().map(|(_, e)| e),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::external::mocks::{MockInvoker, MockProber, MockResponse, sample_artifact};
    use crate::external::Tool;
    use std::time::Duration;
    use tempfile::tempdir;

    fn config(root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.paths.output_root = root.to_path_buf();
        config.paths.temp_dir = None;
        config.packaging.max_parallel_encodes = Some(4);
        config
    }

    #[test]
    fn manifest_order_ignores_completion_order() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let invoker = MockInvoker::new();
        // Lowest rung finishes first, top rung last.
        invoker.expect_delayed(Tool::Ffmpeg, Some("1080p.m3u8"), MockResponse::ok(), Duration::from_millis(120));
        invoker.expect_delayed(Tool::Ffmpeg, Some("720p.m3u8"), MockResponse::ok(), Duration::from_millis(80));
        invoker.expect_delayed(Tool::Ffmpeg, Some("480p.m3u8"), MockResponse::ok(), Duration::from_millis(40));
        let prober = MockProber::with_frame_rate(60.0);
        let cancel = CancelToken::new();
        let ctx = StageContext { invoker: &invoker, prober: &prober, config: &config, cancel: &cancel };

        let source = sample_artifact(&dir.path().join("clip_upscaled.mp4"), 60.0);
        let result = package(&ctx, &[source], "clip", &dir.path().join("packaging")).unwrap();

        let text = fs::read_to_string(&result.master_manifest).unwrap();
        let bandwidths: Vec<&str> = text
            .lines()
            .filter_map(|l| l.strip_prefix("#EXT-X-STREAM-INF:BANDWIDTH="))
            .map(|rest| rest.split(',').next().unwrap_or_default())
            .collect();
        assert_eq!(bandwidths, vec!["5000000", "2800000", "1400000", "800000"]);
        assert_eq!(result.variants.len(), 4);
        assert_eq!(result.merge_method, MergeMethod::Copy);
        assert!(result.final_video.ends_with("clip_master.mp4"));
    }

    #[test]
    fn failed_rung_cancels_siblings_and_writes_no_manifest() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let invoker = MockInvoker::new();
        invoker.expect(
            Tool::Ffmpeg,
            Some("480p.m3u8"),
            MockResponse::Exit { code: 1, stderr: "encoder exploded".into() },
        );
        invoker.expect_delayed(Tool::Ffmpeg, Some(".m3u8"), MockResponse::ok(), Duration::from_millis(150));
        let prober = MockProber::with_frame_rate(30.0);
        let cancel = CancelToken::new();
        let ctx = StageContext { invoker: &invoker, prober: &prober, config: &config, cancel: &cancel };

        let source = sample_artifact(&dir.path().join("clip.mp4"), 30.0);
        let err = package(&ctx, &[source], "clip", &dir.path().join("packaging")).unwrap_err();
        assert!(matches!(err, CoreError::ToolExecution { .. }), "got {err:?}");
        assert!(!dir.path().join("packaging/hls").join(MASTER_PLAYLIST).exists());
    }

    #[test]
    fn incompatible_sources_fail_without_normalization() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.packaging.normalize_mismatched_sources = false;
        let invoker = MockInvoker::new();
        let prober = MockProber::with_frame_rate(30.0);
        let cancel = CancelToken::new();
        let ctx = StageContext { invoker: &invoker, prober: &prober, config: &config, cancel: &cancel };

        let a = sample_artifact(Path::new("/v/a.mp4"), 30.0);
        let b = sample_artifact(Path::new("/v/b.mp4"), 24.0);
        let err = package(&ctx, &[a, b], "clip", &dir.path().join("packaging")).unwrap_err();
        assert!(matches!(err, CoreError::IncompatibleSources(_)));
        assert!(invoker.calls().is_empty());
    }

    #[test]
    fn compatible_sources_use_the_concat_demuxer() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.packaging.normalize_master = false;
        let invoker = MockInvoker::new();
        let prober = MockProber::with_frame_rate(30.0);
        let cancel = CancelToken::new();
        let ctx = StageContext { invoker: &invoker, prober: &prober, config: &config, cancel: &cancel };

        let a = sample_artifact(Path::new("/v/a.mp4"), 30.0);
        let b = sample_artifact(Path::new("/v/b.mp4"), 30.0);
        let result = package(&ctx, &[a, b], "clip", &dir.path().join("packaging")).unwrap();
        assert_eq!(result.merge_method, MergeMethod::Concat);
        assert_eq!(result.final_video, result.merged_video);

        let first = &invoker.calls_for(Tool::Ffmpeg)[0];
        assert_eq!(first.value_of("-f").as_deref(), Some("concat"));
    }

    #[test]
    fn master_filter_scales_and_sharpens() {
        assert_eq!(
            master_filter(1920, 1080).render(),
            "scale=1920:1080:flags=lanczos,unsharp=5:5:1.0:5:5:0.0"
        );
    }

    #[test]
    fn genuine_failure_wins_over_cancellation() {
        let failures = vec![
            (0, CoreError::Cancelled("rung".into())),
            (2, CoreError::ManifestIntegrity { expected: 1, actual: 0 }),
        ];
        assert!(matches!(first_failure(failures), Some(CoreError::ManifestIntegrity { .. })));
        assert!(first_failure(Vec::new()).is_none());
    }
}

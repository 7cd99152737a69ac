// ============================================================================
// cinestage-core/src/analysis/mod.rs
// ============================================================================
//
// SIGNAL EXTRACTION: Measuring Motion, Complexity, Noise and Blur
//
// This module turns a video into a `SignalProfile`: the handful of averages
// the decision engine and the stage gates work from. Frames are streamed from
// a `FrameSource` and measured one at a time, so memory stays bounded by two
// frames regardless of the input length.
//
// KEY COMPONENTS:
// - SignalProfile: Full-sequence averages for one artifact
// - FrameMeasurements: Per-frame samples behind a profile
// - SignalAnalyzer: Seam used by the coordinator to obtain fresh evidence
// - SignalExtractor: Production analyzer over any `FrameSource`
// - run_analysis: The analysis stage (profile, decision, scenes, reports)
//
// Full-sequence values drive classification and gating. Only the text
// reports are sampled with a stride.

pub mod frames;
pub mod metrics;
pub mod report;
pub mod scenes;

#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks;

// ---- Internal crate imports ----
use crate::config::{AnalysisConfig, ToolPaths};
use crate::decision::{Decision, DecisionEngine, DecisionRecord};
use crate::error::CoreResult;
use crate::external::{CancelToken, ToolInvoker};
use crate::media::MediaArtifact;

// ---- External crate imports ----
use chrono::Local;
use image::GrayImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

// ---- Standard library imports ----
use std::fs;
use std::path::{Path, PathBuf};

pub use frames::{FfmpegFrameSource, FrameSource};
pub use scenes::SceneCut;

// ============================================================================
// PROFILE AND SAMPLES
// ============================================================================

/// Full-sequence signal averages for one artifact.
///
/// `avg_noise_variance` and `avg_blur_variance` hold the same Laplacian
/// statistic. They are kept as separate fields because the decision engine
/// bands them in opposite directions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalProfile {
    pub avg_motion: f64,
    pub peak_motion: f64,
    pub avg_edge_density: f64,
    pub avg_noise_variance: f64,
    pub avg_blur_variance: f64,
    pub frame_rate: f64,
    pub frames_analyzed: usize,
}

impl SignalProfile {
    /// Profile of an artifact with no decodable frames.
    pub fn empty(frame_rate: f64) -> Self {
        Self {
            avg_motion: 0.0,
            peak_motion: 0.0,
            avg_edge_density: 0.0,
            avg_noise_variance: 0.0,
            avg_blur_variance: 0.0,
            frame_rate,
            frames_analyzed: 0,
        }
    }
}

/// Motion between frame `frame - 1` and `frame`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub frame: usize,
    pub timestamp: f64,
    pub average: f64,
    pub peak: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplexitySample {
    pub frame: usize,
    pub timestamp: f64,
    pub density: f64,
    pub edge_pixels: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaplacianSample {
    pub frame: usize,
    pub timestamp: f64,
    pub variance: f64,
}

/// Every per-frame sample collected while measuring an artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMeasurements {
    pub frames: usize,
    pub motion: Vec<MotionSample>,
    pub complexity: Vec<ComplexitySample>,
    pub laplacian: Vec<LaplacianSample>,
}

impl FrameMeasurements {
    /// Reduces the samples to full-sequence averages.
    ///
    /// With zero frames every average is 0.
    pub fn profile(&self, frame_rate: f64) -> SignalProfile {
        if self.frames == 0 {
            return SignalProfile::empty(frame_rate);
        }
        let laplacian = mean(self.laplacian.iter().map(|s| s.variance));
        SignalProfile {
            avg_motion: mean(self.motion.iter().map(|s| s.average)),
            peak_motion: self.motion.iter().map(|s| s.peak).fold(0.0, f64::max),
            avg_edge_density: mean(self.complexity.iter().map(|s| s.density)),
            avg_noise_variance: laplacian,
            avg_blur_variance: laplacian,
            frame_rate,
            frames_analyzed: self.frames,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn timestamp(frame: usize, frame_rate: f64) -> f64 {
    if frame_rate > 0.0 {
        frame as f64 / frame_rate
    } else {
        0.0
    }
}

// ============================================================================
// ANALYZER SEAM
// ============================================================================

/// Produces signal evidence for an artifact.
pub trait SignalAnalyzer: Send + Sync {
    /// Measures every frame of `artifact`, stopping early once `cancel` fires.
    fn measure(&self, artifact: &MediaArtifact, cancel: &CancelToken) -> CoreResult<FrameMeasurements>;

    /// Full-sequence profile of `artifact`, computed fresh on every call.
    fn profile(&self, artifact: &MediaArtifact, cancel: &CancelToken) -> CoreResult<SignalProfile> {
        Ok(self.measure(artifact, cancel)?.profile(artifact.frame_rate))
    }
}

/// Measures frames supplied by a `FrameSource` with the kernels in `metrics`.
#[derive(Debug, Clone)]
pub struct SignalExtractor<F: FrameSource> {
    source: F,
    settings: AnalysisConfig,
}

impl<F: FrameSource> SignalExtractor<F> {
    pub fn new(source: F, settings: AnalysisConfig) -> Self {
        Self { source, settings }
    }
}

impl SignalExtractor<FfmpegFrameSource> {
    /// Extractor decoding through the configured ffmpeg binary.
    pub fn with_ffmpeg(tools: &ToolPaths, settings: AnalysisConfig) -> Self {
        Self::new(FfmpegFrameSource::new(tools.ffmpeg.clone()), settings)
    }
}

impl<F: FrameSource> SignalAnalyzer for SignalExtractor<F> {
    fn measure(&self, artifact: &MediaArtifact, cancel: &CancelToken) -> CoreResult<FrameMeasurements> {
        let fps = artifact.frame_rate;
        let settings = self.settings;
        let mut out = FrameMeasurements::default();
        let mut previous: Option<GrayImage> = None;
        let mut index = 0usize;

        let decoded = self.source.for_each_frame(artifact, cancel, &mut |frame: GrayImage| {
            let ts = timestamp(index, fps);

            let edges = metrics::edge_density(&frame, settings.canny_low, settings.canny_high);
            out.complexity.push(ComplexitySample {
                frame: index,
                timestamp: ts,
                density: edges.density,
                edge_pixels: edges.edge_pixels,
            });
            out.laplacian.push(LaplacianSample {
                frame: index,
                timestamp: ts,
                variance: metrics::laplacian_variance(&frame),
            });
            if let Some(prev) = previous.as_ref() {
                let flow = metrics::flow_magnitude(prev, &frame, settings.flow_window);
                out.motion.push(MotionSample {
                    frame: index,
                    timestamp: ts,
                    average: flow.average,
                    peak: flow.peak,
                });
            }

            previous = Some(frame);
            index += 1;
            Ok(())
        })?;

        out.frames = decoded;
        debug!(
            "Measured {} frames of {} ({} motion pairs)",
            out.frames,
            artifact.path.display(),
            out.motion.len()
        );
        Ok(out)
    }
}

// ============================================================================
// ANALYSIS STAGE
// ============================================================================

/// First video stream properties, persisted next to the other analysis outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub r_frame_rate: f64,
    pub duration: f64,
    pub nb_frames: Option<u64>,
    pub pix_fmt: Option<String>,
    pub codec_name: Option<String>,
    pub container: String,
    pub has_audio: bool,
}

impl From<&MediaArtifact> for VideoMetadata {
    fn from(artifact: &MediaArtifact) -> Self {
        Self {
            width: artifact.resolution.width,
            height: artifact.resolution.height,
            r_frame_rate: artifact.frame_rate,
            duration: artifact.duration_secs,
            nb_frames: artifact.frame_count,
            pix_fmt: artifact.pix_fmt.clone(),
            codec_name: artifact.codec.clone(),
            container: artifact.container.clone(),
            has_audio: artifact.has_audio,
        }
    }
}

/// Collaborators and settings for one analysis pass.
pub struct AnalysisContext<'a> {
    pub analyzer: &'a dyn SignalAnalyzer,
    pub invoker: &'a dyn ToolInvoker,
    pub engine: &'a DecisionEngine,
    pub tools: &'a ToolPaths,
    pub settings: &'a AnalysisConfig,
    pub cancel: &'a CancelToken,
}

/// Everything the analysis stage produced.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub profile: SignalProfile,
    pub decision: Decision,
    pub record: DecisionRecord,
    /// `None` when scene detection was disabled or failed.
    pub scenes: Option<Vec<SceneCut>>,
    pub metadata_path: PathBuf,
    pub decision_path: PathBuf,
    pub scenes_path: Option<PathBuf>,
    pub report_paths: Vec<PathBuf>,
}

/// Runs the analysis stage for `artifact`, writing every report into `out_dir`.
///
/// Measurement failures abort. Scene detection is best effort.
pub fn run_analysis(
    ctx: &AnalysisContext<'_>,
    artifact: &MediaArtifact,
    out_dir: &Path,
) -> CoreResult<AnalysisOutcome> {
    fs::create_dir_all(out_dir)?;
    let name = artifact.stem();

    let metadata_path = out_dir.join(format!("{name}_metadata.json"));
    fs::write(
        &metadata_path,
        serde_json::to_string_pretty(&VideoMetadata::from(artifact))?,
    )?;

    let (scenes, scenes_path) = if ctx.settings.detect_scenes {
        match scenes::detect_scenes(
            ctx.invoker,
            ctx.tools,
            artifact,
            ctx.settings.scene_threshold,
            ctx.cancel,
        ) {
            Ok(cuts) => {
                let path = out_dir.join(format!("{name}_scenes.txt"));
                scenes::write_scene_report(&path, &cuts, ctx.settings.scene_threshold)?;
                info!("Detected {} scene cuts", cuts.len());
                (Some(cuts), Some(path))
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("Scene detection failed, continuing without it: {}", e);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let measurements = ctx.analyzer.measure(artifact, ctx.cancel)?;
    let profile = measurements.profile(artifact.frame_rate);
    let decision = ctx.engine.classify(&profile);

    info!(
        "Signal profile: motion {:.2}, edge density {:.4}, laplacian variance {:.2} over {} frames",
        profile.avg_motion, profile.avg_edge_density, profile.avg_noise_variance, profile.frames_analyzed
    );
    info!(
        "Classification: {} | {} | {} | {} (score {:.2})",
        decision.classification.motion.label(),
        decision.classification.complexity.label(),
        decision.classification.noise.label(),
        decision.classification.blur.label(),
        decision.score.value()
    );

    let report_paths = report::write_channel_reports(
        out_dir,
        &name,
        &measurements,
        &profile,
        &decision,
        ctx.settings.report_stride,
    )?;

    let record = DecisionRecord::new(&name, &profile, &decision, Local::now());
    let decision_path = out_dir.join(format!("{name}_decision.json"));
    record.write(&decision_path)?;

    Ok(AnalysisOutcome {
        profile,
        decision,
        record,
        scenes,
        metadata_path,
        decision_path,
        scenes_path,
        report_paths,
    })
}

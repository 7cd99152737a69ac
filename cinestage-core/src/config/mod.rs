//! Configuration structures for the cinestage-core library.
//!
//! `PipelineConfig` gathers every tunable used by the coordinator: paths,
//! classification thresholds, gate predicates, analysis kernels, enhancement
//! and packaging parameters, quality targets and tool locations. Every section
//! is `#[serde(default)]`, so a TOML file only needs the keys it overrides.
//! Section defaults honour `CINESTAGE_*` environment variables.

mod builder;
pub mod utils;

use crate::decision::ClassificationThresholds;
use crate::enhance::InterpolationEngine;
use crate::error::{CoreError, CoreResult};
use crate::external::{Tool, ToolCommand};
use crate::media::Resolution;
use crate::packaging::EncodingProfile;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use builder::PipelineConfigBuilder;
use utils::{get_env_bool, get_env_f64, get_env_string, get_env_u32, get_env_usize};

// Default constants

/// Noise variance below which the denoise stage runs.
pub const DEFAULT_NOISE_THRESHOLD: f64 = 100.0;

/// Frame rate the interpolation stage raises content to.
pub const DEFAULT_TARGET_FRAME_RATE: f64 = 60.0;

/// HLS segment length in seconds.
pub const DEFAULT_SEGMENT_DURATION_SECS: u32 = 6;

/// Encoder quality used by the enhancement re-encodes.
pub const DEFAULT_ENHANCE_CRF: u8 = 18;

/// Main configuration structure for a pipeline run.
///
/// # Examples
///
/// ```rust
/// use cinestage_core::config::PipelineConfigBuilder;
///
/// let config = PipelineConfigBuilder::new()
///     .output_root("/tmp/cinestage")
///     .noise_threshold(80.0)
///     .target_frame_rate(48.0)
///     .segment_duration_secs(4)
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Optional ntfy.sh topic URL for run notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ntfy_topic: Option<String>,

    /// Explicit run identifier; when absent one is derived from the input file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    pub paths: PathsConfig,
    pub thresholds: ClassificationThresholds,
    pub gates: GateConfig,
    pub analysis: AnalysisConfig,
    pub enhance: EnhanceConfig,
    pub captions: CaptionConfig,
    pub quality: QualityConfig,
    pub tools: ToolPaths,
    pub packaging: PackagingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ntfy_topic: std::env::var("CINESTAGE_NTFY_TOPIC").ok(),
            run_id: None,
            paths: PathsConfig::default(),
            thresholds: ClassificationThresholds::default(),
            gates: GateConfig::default(),
            analysis: AnalysisConfig::default(),
            enhance: EnhanceConfig::default(),
            captions: CaptionConfig::default(),
            quality: QualityConfig::default(),
            tools: ToolPaths::default(),
            packaging: PackagingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration file; missing keys fall back to defaults.
    pub fn from_toml_file(path: &Path) -> CoreResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            CoreError::Configuration(format!(
                "Cannot read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: PipelineConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_toml_file(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Rejects configurations that would make the run meaningless.
    pub fn validate(&self) -> CoreResult<()> {
        self.thresholds.validate()?;
        self.gates.validate()?;
        self.analysis.validate()?;
        self.enhance.validate()?;
        self.packaging.validate()?;
        self.quality.validate()?;
        Ok(())
    }

    /// Directory for log files, defaulting to `<output_root>/logs`.
    pub fn log_dir(&self) -> PathBuf {
        self.paths
            .log_dir
            .clone()
            .unwrap_or_else(|| self.paths.output_root.join("logs"))
    }
}

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root under which every run gets its own directory.
    pub output_root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// Parent for scoped temporary directories (defaults to the stage directory).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_root: utils::get_env_path("CINESTAGE_OUTPUT_ROOT", PathBuf::from("output")),
            log_dir: std::env::var("CINESTAGE_LOG_DIR").ok().map(PathBuf::from),
            temp_dir: std::env::var("CINESTAGE_TEMP_DIR").ok().map(PathBuf::from),
        }
    }
}

/// Predicates for the conditional enhancement stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Denoise runs when the average noise variance is below this value.
    pub noise_threshold: f64,
    /// Interpolation runs when the current frame rate is below this value.
    pub target_frame_rate: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            noise_threshold: get_env_f64("CINESTAGE_NOISE_THRESHOLD", DEFAULT_NOISE_THRESHOLD),
            target_frame_rate: get_env_f64(
                "CINESTAGE_TARGET_FRAME_RATE",
                DEFAULT_TARGET_FRAME_RATE,
            ),
        }
    }
}

impl GateConfig {
    fn validate(&self) -> CoreResult<()> {
        if !self.noise_threshold.is_finite() || self.noise_threshold < 0.0 {
            return Err(CoreError::Configuration(format!(
                "noise_threshold must be a non-negative number (got {})",
                self.noise_threshold
            )));
        }
        if !self.target_frame_rate.is_finite() || self.target_frame_rate <= 0.0 {
            return Err(CoreError::Configuration(format!(
                "target_frame_rate must be positive (got {})",
                self.target_frame_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Every n-th frame is written to the human-readable reports.
    pub report_stride: usize,
    /// Scene-change score above which a cut is reported.
    pub scene_threshold: f64,
    pub canny_low: f64,
    pub canny_high: f64,
    /// Block size for optical-flow estimation.
    pub flow_window: usize,
    /// Whether to run scene-cut detection during analysis.
    pub detect_scenes: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            report_stride: get_env_usize("CINESTAGE_REPORT_STRIDE", 10),
            scene_threshold: get_env_f64("CINESTAGE_SCENE_THRESHOLD", 0.1),
            canny_low: 50.0,
            canny_high: 150.0,
            flow_window: 8,
            detect_scenes: get_env_bool("CINESTAGE_DETECT_SCENES", true),
        }
    }
}

impl AnalysisConfig {
    fn validate(&self) -> CoreResult<()> {
        if self.report_stride == 0 {
            return Err(CoreError::Configuration(
                "report_stride must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.scene_threshold) {
            return Err(CoreError::Configuration(format!(
                "scene_threshold must be within [0, 1] (got {})",
                self.scene_threshold
            )));
        }
        if self.canny_low >= self.canny_high {
            return Err(CoreError::Configuration(
                "canny_low must be below canny_high".to_string(),
            ));
        }
        if self.flow_window < 2 {
            return Err(CoreError::Configuration(
                "flow_window must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the hqdn3d denoise filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseParams {
    pub luma_spatial: f64,
    pub chroma_spatial: f64,
    pub luma_temporal: f64,
    pub chroma_temporal: f64,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            luma_spatial: 4.0,
            chroma_spatial: 3.0,
            luma_temporal: 6.0,
            chroma_temporal: 4.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    pub crf: u8,
    pub preset: String,
    pub upscale_model: String,
    pub upscale_factor: u32,
    pub interpolation_engine: InterpolationEngine,
    pub rife_model: String,
    pub denoise: DenoiseParams,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            crf: DEFAULT_ENHANCE_CRF,
            preset: get_env_string("CINESTAGE_PRESET", "medium".to_string()),
            upscale_model: get_env_string(
                "CINESTAGE_UPSCALE_MODEL",
                "realesrgan-x4plus".to_string(),
            ),
            upscale_factor: get_env_u32("CINESTAGE_UPSCALE_FACTOR", 4),
            interpolation_engine: InterpolationEngine::default(),
            rife_model: "rife-v4.6".to_string(),
            denoise: DenoiseParams::default(),
        }
    }
}

impl EnhanceConfig {
    fn validate(&self) -> CoreResult<()> {
        if self.crf > 51 {
            return Err(CoreError::Configuration(format!(
                "crf must be within 0-51 (got {})",
                self.crf
            )));
        }
        if !matches!(self.upscale_factor, 2..=4) {
            return Err(CoreError::Configuration(format!(
                "upscale_factor must be 2, 3 or 4 (got {})",
                self.upscale_factor
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub enabled: bool,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Keep the extracted WAV next to the captions instead of deleting it.
    pub keep_audio: bool,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            enabled: get_env_bool("CINESTAGE_CAPTIONS", true),
            model: get_env_string("CINESTAGE_CAPTION_MODEL", "base".to_string()),
            language: std::env::var("CINESTAGE_CAPTION_LANGUAGE").ok(),
            keep_audio: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    pub segment_duration_secs: u32,
    /// Upper bound on concurrent ladder encodes; defaults to the CPU count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel_encodes: Option<usize>,
    /// Rescale and sharpen the merged source before building the ladder.
    pub normalize_master: bool,
    pub master_frame_rate: f64,
    /// Re-encode mismatched multi-source inputs to a common baseline instead of failing.
    pub normalize_mismatched_sources: bool,
    pub rung_preset: String,
    pub master_preset: String,
    pub ladder: Vec<EncodingProfile>,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: get_env_u32(
                "CINESTAGE_SEGMENT_DURATION",
                DEFAULT_SEGMENT_DURATION_SECS,
            ),
            max_parallel_encodes: std::env::var("CINESTAGE_MAX_PARALLEL_ENCODES")
                .ok()
                .and_then(|v| v.parse().ok()),
            normalize_master: get_env_bool("CINESTAGE_NORMALIZE_MASTER", true),
            master_frame_rate: 60.0,
            normalize_mismatched_sources: false,
            rung_preset: "medium".to_string(),
            master_preset: "slow".to_string(),
            ladder: EncodingProfile::default_ladder(),
        }
    }
}

impl PackagingConfig {
    fn validate(&self) -> CoreResult<()> {
        if self.segment_duration_secs == 0 {
            return Err(CoreError::Configuration(
                "segment_duration_secs must be at least 1".to_string(),
            ));
        }
        if self.max_parallel_encodes == Some(0) {
            return Err(CoreError::Configuration(
                "max_parallel_encodes must be at least 1".to_string(),
            ));
        }
        if !self.master_frame_rate.is_finite() || self.master_frame_rate <= 0.0 {
            return Err(CoreError::Configuration(
                "master_frame_rate must be positive".to_string(),
            ));
        }
        if self.ladder.is_empty() {
            return Err(CoreError::Configuration(
                "encoding ladder must contain at least one profile".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for profile in &self.ladder {
            profile.validate()?;
            if !names.insert(profile.name.as_str()) {
                return Err(CoreError::Configuration(format!(
                    "duplicate ladder profile name '{}'",
                    profile.name
                )));
            }
        }
        Ok(())
    }

    /// Resolution the master is normalized to: the largest rung.
    pub fn master_resolution(&self) -> Option<Resolution> {
        self.ladder
            .iter()
            .map(|p| p.resolution)
            .max_by_key(|r| r.pixels())
    }

    /// Worker count for the ladder pool.
    pub fn worker_count(&self) -> usize {
        self.max_parallel_encodes
            .unwrap_or_else(num_cpus::get)
            .clamp(1, self.ladder.len().max(1))
    }
}

/// Pass/fail targets for the perceptual-quality stage and overall grading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub vmaf_target: f64,
    pub psnr_target: f64,
    pub ssim_target: f64,
    pub grade_excellent: f64,
    pub grade_good: f64,
    pub grade_acceptable: f64,
    pub vmaf_threads: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            vmaf_target: get_env_f64("CINESTAGE_VMAF_TARGET", 75.0),
            psnr_target: get_env_f64("CINESTAGE_PSNR_TARGET", 30.0),
            ssim_target: get_env_f64("CINESTAGE_SSIM_TARGET", 0.9),
            grade_excellent: 90.0,
            grade_good: 75.0,
            grade_acceptable: 60.0,
            vmaf_threads: 4,
        }
    }
}

impl QualityConfig {
    fn validate(&self) -> CoreResult<()> {
        if !(self.grade_acceptable < self.grade_good && self.grade_good < self.grade_excellent) {
            return Err(CoreError::Configuration(
                "quality grade bands must be strictly increasing".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ssim_target) {
            return Err(CoreError::Configuration(
                "ssim_target must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Executable names or paths for every external tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub speech_to_text: String,
    pub super_resolution: String,
    pub frame_interpolation: String,
    /// Per-invocation time limit in seconds; unlimited when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: get_env_string("CINESTAGE_FFMPEG", "ffmpeg".to_string()),
            ffprobe: get_env_string("CINESTAGE_FFPROBE", "ffprobe".to_string()),
            speech_to_text: get_env_string("CINESTAGE_WHISPER", "whisper".to_string()),
            super_resolution: get_env_string(
                "CINESTAGE_REALESRGAN",
                "realesrgan-ncnn-vulkan".to_string(),
            ),
            frame_interpolation: get_env_string("CINESTAGE_RIFE", "rife-ncnn-vulkan".to_string()),
            timeout_secs: std::env::var("CINESTAGE_TOOL_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

impl ToolPaths {
    pub fn program(&self, tool: Tool) -> &str {
        match tool {
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::Ffprobe => &self.ffprobe,
            Tool::SpeechToText => &self.speech_to_text,
            Tool::SuperResolution => &self.super_resolution,
            Tool::FrameInterpolation => &self.frame_interpolation,
        }
    }

    /// Starts a command for `tool` with the configured executable and time limit.
    pub fn command(&self, tool: Tool) -> ToolCommand {
        ToolCommand::new(tool, self.program(tool))
            .timeout(self.timeout_secs.map(Duration::from_secs))
    }

    /// Starts an ffmpeg command with the flags every invocation shares.
    pub fn ffmpeg(&self) -> ToolCommand {
        self.command(Tool::Ffmpeg)
            .flag("-hide_banner")
            .flag("-nostdin")
            .flag("-y")
    }
}

// ============================================================================
// cinestage-core/src/enhance/mod.rs
// ============================================================================
//
// ENHANCEMENT STAGES: Gates, Denoise, Interpolate, Upscale
//
// Each enhancement consumes one artifact and produces a new one next to the
// run's other outputs; nothing is modified in place. Denoise and interpolate
// are gated on the signal profile of the artifact they would consume. Upscale
// always runs.
//
// KEY COMPONENTS:
// - GateDecision / denoise_gate / interpolate_gate: Pure gate predicates
// - EnhanceOutput: The produced artifact plus stage metadata
// - denoise / interpolate / upscale: The stage bodies

pub mod denoise;
pub mod interpolate;
pub mod upscale;

// ---- Internal crate imports ----
use crate::analysis::SignalProfile;
use crate::config::{EnhanceConfig, GateConfig, ToolPaths};
use crate::external::{ExpectedOutput, ToolCommand};
use crate::media::MediaArtifact;

// ---- External crate imports ----
use serde::{Deserialize, Serialize};

// ---- Standard library imports ----
use std::fmt;
use std::path::Path;

pub use denoise::denoise;
pub use interpolate::interpolate;
pub use upscale::upscale;

/// File name pattern for extracted and processed frame sequences.
pub const FRAME_PATTERN: &str = "frame_%06d.png";

/// How missing frames are synthesized when raising the frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationEngine {
    /// ffmpeg's motion-compensated `minterpolate` filter.
    #[default]
    Minterpolate,
    /// The RIFE neural interpolator on an extracted frame sequence.
    Rife,
}

impl fmt::Display for InterpolationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpolationEngine::Minterpolate => write!(f, "minterpolate"),
            InterpolationEngine::Rife => write!(f, "rife"),
        }
    }
}

// ============================================================================
// GATES
// ============================================================================

/// Outcome of a stage gate, with the reason recorded in the run report.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Run(String),
    Skip(String),
}

impl GateDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, GateDecision::Run(_))
    }

    pub fn reason(&self) -> &str {
        match self {
            GateDecision::Run(r) | GateDecision::Skip(r) => r,
        }
    }
}

/// Denoise runs iff the Laplacian variance is below the threshold.
pub fn denoise_gate(profile: &SignalProfile, gates: &GateConfig) -> GateDecision {
    let variance = profile.avg_noise_variance;
    if variance < gates.noise_threshold {
        GateDecision::Run(format!(
            "noise variance {:.2} below threshold {:.2}",
            variance, gates.noise_threshold
        ))
    } else {
        GateDecision::Skip(format!(
            "noise variance {:.2} at or above threshold {:.2}",
            variance, gates.noise_threshold
        ))
    }
}

/// Interpolation runs iff the current frame rate is below the target.
///
/// An unknown (non-positive) frame rate skips the stage, since no
/// interpolation multiplier can be derived from it.
pub fn interpolate_gate(profile: &SignalProfile, gates: &GateConfig) -> GateDecision {
    let fps = profile.frame_rate;
    if !(fps.is_finite() && fps > 0.0) {
        return GateDecision::Skip("frame rate unknown".to_string());
    }
    if fps < gates.target_frame_rate {
        GateDecision::Run(format!(
            "frame rate {:.3} below target {:.3}",
            fps, gates.target_frame_rate
        ))
    } else {
        GateDecision::Skip(format!(
            "frame rate {:.3} already at or above target {:.3}",
            fps, gates.target_frame_rate
        ))
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Artifact produced by an enhancement, with metadata for the run report.
#[derive(Debug, Clone)]
pub struct EnhanceOutput {
    pub artifact: MediaArtifact,
    pub metadata: serde_json::Value,
}

/// Appends the H.264 encoder settings every enhancement shares.
pub(crate) fn h264_encode(command: ToolCommand, enhance: &EnhanceConfig) -> ToolCommand {
    command
        .opt("-c:v", "libx264")
        .opt("-preset", &enhance.preset)
        .opt("-crf", enhance.crf.to_string())
        .opt("-pix_fmt", "yuv420p")
}

/// Builds the command that dumps every frame of `input` into `frames_dir`.
pub(crate) fn extract_frames_command(tools: &ToolPaths, input: &Path, frames_dir: &Path) -> ToolCommand {
    tools
        .ffmpeg()
        .opt("-i", input)
        .opt("-fps_mode", "passthrough")
        .arg(frames_dir.join(FRAME_PATTERN))
        .expect(ExpectedOutput::NonEmptyDir(frames_dir.to_path_buf()))
}

/// Formats a frame rate for ffmpeg options.
pub(crate) fn fps_arg(fps: f64) -> String {
    let rounded = (fps * 1000.0).round() / 1000.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(noise: f64, fps: f64) -> SignalProfile {
        SignalProfile {
            avg_noise_variance: noise,
            avg_blur_variance: noise,
            ..SignalProfile::empty(fps)
        }
    }

    #[test]
    fn denoise_gate_is_strict() {
        let gates = GateConfig { noise_threshold: 100.0, target_frame_rate: 60.0 };
        assert!(denoise_gate(&profile(50.0, 30.0), &gates).should_run());
        assert!(denoise_gate(&profile(99.99, 30.0), &gates).should_run());
        assert!(!denoise_gate(&profile(100.0, 30.0), &gates).should_run());
        assert!(!denoise_gate(&profile(200.0, 30.0), &gates).should_run());
    }

    #[test]
    fn interpolate_gate_compares_against_target() {
        let gates = GateConfig { noise_threshold: 100.0, target_frame_rate: 60.0 };
        assert!(interpolate_gate(&profile(0.0, 30.0), &gates).should_run());
        assert!(interpolate_gate(&profile(0.0, 59.94), &gates).should_run());
        assert!(!interpolate_gate(&profile(0.0, 60.0), &gates).should_run());
        assert!(!interpolate_gate(&profile(0.0, 90.0), &gates).should_run());

        let unknown = interpolate_gate(&profile(0.0, 0.0), &gates);
        assert_eq!(unknown, GateDecision::Skip("frame rate unknown".to_string()));
    }

    #[test]
    fn fps_arg_drops_trailing_zeroes() {
        assert_eq!(fps_arg(60.0), "60");
        assert_eq!(fps_arg(29.97002997), "29.97");
        assert_eq!(fps_arg(23.976), "23.976");
    }

    #[test]
    fn engine_serializes_snake_case() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            engine: InterpolationEngine,
        }
        let text = toml::to_string(&Wrapper { engine: InterpolationEngine::Rife }).unwrap();
        assert_eq!(text.trim(), "engine = \"rife\"");
        let back: Wrapper = toml::from_str("engine = \"minterpolate\"").unwrap();
        assert_eq!(back.engine, InterpolationEngine::Minterpolate);
    }
}

// cinestage-core/src/analysis/mocks.rs

// --- Mock frame source and analyzer (for testing) ---

#![cfg(any(test, feature = "test-mocks"))]

use super::{
    ComplexitySample, FrameMeasurements, FrameSource, LaplacianSample, MotionSample,
    SignalAnalyzer, SignalProfile,
};
use crate::error::{CoreError, CoreResult};
use crate::external::CancelToken;
use crate::media::{MediaArtifact, canonicalize};
use image::GrayImage;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Serves a fixed list of synthetic frames for every artifact.
#[derive(Debug, Clone, Default)]
pub struct MockFrameSource {
    frames: Vec<GrayImage>,
}

impl MockFrameSource {
    pub fn new(frames: Vec<GrayImage>) -> Self {
        Self { frames }
    }
}

impl FrameSource for MockFrameSource {
    fn for_each_frame(
        &self,
        _artifact: &MediaArtifact,
        cancel: &CancelToken,
        visit: &mut dyn FnMut(GrayImage) -> CoreResult<()>,
    ) -> CoreResult<usize> {
        for frame in &self.frames {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled("mock frame source cancelled".to_string()));
            }
            visit(frame.clone())?;
        }
        Ok(self.frames.len())
    }
}

/// Answers with scripted profiles and records which artifacts were measured.
///
/// Profiles are looked up by canonical path; unknown paths get the default.
pub struct MockSignalAnalyzer {
    default: SignalProfile,
    per_path: Mutex<HashMap<PathBuf, SignalProfile>>,
    failing: Mutex<HashSet<PathBuf>>,
    measured: Mutex<Vec<PathBuf>>,
}

impl MockSignalAnalyzer {
    pub fn new(default: SignalProfile) -> Self {
        Self {
            default,
            per_path: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            measured: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for gate tests: only noise and frame rate matter.
    pub fn with_noise_and_fps(noise_variance: f64, frame_rate: f64) -> Self {
        Self::new(SignalProfile {
            avg_motion: 2.0,
            peak_motion: 4.0,
            avg_edge_density: 0.1,
            avg_noise_variance: noise_variance,
            avg_blur_variance: noise_variance,
            frame_rate,
            frames_analyzed: 100,
        })
    }

    pub fn set_profile(&self, path: &Path, profile: SignalProfile) {
        lock(&self.per_path).insert(canonicalize(path), profile);
    }

    pub fn fail_on(&self, path: &Path) {
        lock(&self.failing).insert(canonicalize(path));
    }

    /// Canonical paths of every artifact analysed so far, in call order.
    pub fn measured(&self) -> Vec<PathBuf> {
        lock(&self.measured).clone()
    }

    fn lookup(&self, artifact: &MediaArtifact, cancel: &CancelToken) -> CoreResult<SignalProfile> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled(format!(
                "mock analysis of {} cancelled",
                artifact.path.display()
            )));
        }
        lock(&self.measured).push(artifact.canonical_path.clone());
        if lock(&self.failing).contains(&artifact.canonical_path) {
            return Err(CoreError::Analysis(format!(
                "mock analysis failure for {}",
                artifact.path.display()
            )));
        }
        Ok(lock(&self.per_path)
            .get(&artifact.canonical_path)
            .copied()
            .unwrap_or(self.default))
    }
}

impl SignalAnalyzer for MockSignalAnalyzer {
    /// Synthesizes one frame pair whose averages reproduce the profile.
    fn measure(&self, artifact: &MediaArtifact, cancel: &CancelToken) -> CoreResult<FrameMeasurements> {
        let p = self.lookup(artifact, cancel)?;
        if p.frames_analyzed == 0 {
            return Ok(FrameMeasurements::default());
        }
        Ok(FrameMeasurements {
            frames: p.frames_analyzed,
            motion: vec![MotionSample {
                frame: 1,
                timestamp: 0.0,
                average: p.avg_motion,
                peak: p.peak_motion,
            }],
            complexity: vec![ComplexitySample {
                frame: 0,
                timestamp: 0.0,
                density: p.avg_edge_density,
                edge_pixels: 0,
            }],
            laplacian: vec![LaplacianSample {
                frame: 0,
                timestamp: 0.0,
                variance: p.avg_noise_variance,
            }],
        })
    }

    fn profile(&self, artifact: &MediaArtifact, cancel: &CancelToken) -> CoreResult<SignalProfile> {
        let p = self.lookup(artifact, cancel)?;
        Ok(SignalProfile {
            frame_rate: artifact.frame_rate,
            ..p
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

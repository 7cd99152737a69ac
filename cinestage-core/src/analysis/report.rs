// ============================================================================
// cinestage-core/src/analysis/report.rs
// ============================================================================
//
// PER-CHANNEL TEXT REPORTS
//
// One plain-text file per signal channel: a header, the totals and the
// classification derived from the full sequence, then every `stride`-th
// sample for a human reader. The stride never affects the numbers above it.

use super::{FrameMeasurements, SignalProfile};
use crate::decision::Decision;
use crate::error::CoreResult;

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes the motion, complexity, noise and blur reports into `dir`.
///
/// Returns the written paths in that order.
pub fn write_channel_reports(
    dir: &Path,
    name: &str,
    measurements: &FrameMeasurements,
    profile: &SignalProfile,
    decision: &Decision,
    stride: usize,
) -> CoreResult<Vec<PathBuf>> {
    let stride = stride.max(1);
    let c = &decision.classification;
    let mut written = Vec::with_capacity(4);

    let mut motion = header("Motion Analysis (Optical Flow)");
    let _ = writeln!(motion, "Total frames analyzed: {}", measurements.frames);
    let _ = writeln!(motion, "Frame pairs compared: {}", measurements.motion.len());
    let _ = writeln!(motion, "Average motion: {:.2}", profile.avg_motion);
    let _ = writeln!(motion, "Peak motion: {:.2}", profile.peak_motion);
    let _ = writeln!(motion, "Motion classification: {}\n", c.motion.label());
    let _ = writeln!(motion, "Frame-by-frame motion:");
    for s in measurements.motion.iter().step_by(stride) {
        let _ = writeln!(
            motion,
            "Frame {} ({:.2}s): avg={:.2}, max={:.2}",
            s.frame, s.timestamp, s.average, s.peak
        );
    }
    written.push(save(dir, name, "motion", &motion)?);

    let mut complexity = header("Complexity Analysis (Edge Detection)");
    let _ = writeln!(complexity, "Total frames analyzed: {}", measurements.frames);
    let _ = writeln!(complexity, "Average edge density: {:.4}", profile.avg_edge_density);
    let _ = writeln!(complexity, "Complexity classification: {}\n", c.complexity.label());
    let _ = writeln!(complexity, "Frame-by-frame complexity:");
    for s in measurements.complexity.iter().step_by(stride) {
        let _ = writeln!(
            complexity,
            "Frame {} ({:.2}s): density={:.4}, edges={}",
            s.frame, s.timestamp, s.density, s.edge_pixels
        );
    }
    written.push(save(dir, name, "complexity", &complexity)?);

    let mut noise = header("Noise Estimation (Laplacian Variance)");
    let _ = writeln!(noise, "Total frames analyzed: {}", measurements.frames);
    let _ = writeln!(noise, "Average Laplacian variance: {:.2}", profile.avg_noise_variance);
    let _ = writeln!(noise, "Noise level: {}\n", c.noise.label());
    let _ = writeln!(noise, "Frame-by-frame noise:");
    for s in measurements.laplacian.iter().step_by(stride) {
        let _ = writeln!(
            noise,
            "Frame {} ({:.2}s): variance={:.2}",
            s.frame, s.timestamp, s.variance
        );
    }
    written.push(save(dir, name, "noise", &noise)?);

    let mut blur = header("Blur Detection (Laplacian Variance)");
    let _ = writeln!(blur, "Total frames analyzed: {}", measurements.frames);
    let _ = writeln!(blur, "Average Laplacian variance: {:.2}", profile.avg_blur_variance);
    let _ = writeln!(blur, "Blur classification: {}\n", c.blur.label());
    let _ = writeln!(blur, "Frame-by-frame blur:");
    for s in measurements.laplacian.iter().step_by(stride) {
        let _ = writeln!(
            blur,
            "Frame {} ({:.2}s): laplacian={:.2}",
            s.frame, s.timestamp, s.variance
        );
    }
    written.push(save(dir, name, "blur", &blur)?);

    Ok(written)
}

fn header(title: &str) -> String {
    format!("{title}\n{}\n\n", "=".repeat(50))
}

fn save(dir: &Path, name: &str, channel: &str, text: &str) -> CoreResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{name}_{channel}.txt"));
    fs::write(&path, text)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ComplexitySample, LaplacianSample, MotionSample};
    use crate::decision::DecisionEngine;
    use tempfile::tempdir;

    fn measurements(frames: usize) -> FrameMeasurements {
        FrameMeasurements {
            frames,
            motion: (1..frames)
                .map(|i| MotionSample { frame: i, timestamp: i as f64 / 10.0, average: 0.5, peak: 1.5 })
                .collect(),
            complexity: (0..frames)
                .map(|i| ComplexitySample { frame: i, timestamp: i as f64 / 10.0, density: 0.02, edge_pixels: 40 })
                .collect(),
            laplacian: (0..frames)
                .map(|i| LaplacianSample { frame: i, timestamp: i as f64 / 10.0, variance: 80.0 })
                .collect(),
        }
    }

    #[test]
    fn stride_limits_frame_lines_but_not_totals() {
        let dir = tempdir().unwrap();
        let m = measurements(25);
        let profile = m.profile(10.0);
        let decision = DecisionEngine::default().classify(&profile);

        let paths = write_channel_reports(dir.path(), "clip", &m, &profile, &decision, 10).unwrap();
        assert_eq!(paths.len(), 4);
        assert!(paths[0].ends_with("clip_motion.txt"));
        assert!(paths[3].ends_with("clip_blur.txt"));

        let noise = fs::read_to_string(&paths[2]).unwrap();
        assert!(noise.contains("Total frames analyzed: 25"));
        assert!(noise.contains("Noise level: High Noise"));
        let lines = noise.lines().filter(|l| l.starts_with("Frame ")).count();
        assert_eq!(lines, 3);

        let blur = fs::read_to_string(&paths[3]).unwrap();
        assert!(blur.contains("Blur classification: Heavily Blurred"));

        let complexity = fs::read_to_string(&paths[1]).unwrap();
        assert!(complexity.contains("Frame 10 (1.00s): density=0.0200, edges=40"));
    }

    #[test]
    fn empty_measurements_still_produce_reports() {
        let dir = tempdir().unwrap();
        let m = FrameMeasurements::default();
        let profile = m.profile(0.0);
        let decision = DecisionEngine::default().classify(&profile);
        let paths = write_channel_reports(dir.path(), "empty", &m, &profile, &decision, 10).unwrap();
        let motion = fs::read_to_string(&paths[0]).unwrap();
        assert!(motion.contains("Total frames analyzed: 0"));
        assert!(motion.contains("Average motion: 0.00"));
    }
}

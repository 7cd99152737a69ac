// ============================================================================
// cinestage-core/src/pipeline/layout.rs
// ============================================================================
//
// RUN LAYOUT: Run Identifiers and the Per-Run Output Tree
//
// Every run writes under `<output_root>/<stem>_<run_id>/`. The run id is
// content-addressed: a SHA-256 over the input's canonical path, size and
// modification time, truncated to 12 hex digits. Re-running the same input
// therefore lands in the same directory, and no path depends on the clock.
//
// <run_dir>/
//   analysis/    metadata, decision record, scene and channel reports
//   captions/    .srt / .vtt (and the kept .wav)
//   enhance/     <stem>_denoised.mp4, <stem>_interpolated.mp4, <stem>_upscaled.mp4
//   packaging/   merged/, master/, hls/
//   quality/     quality JSON, CSV and the VMAF log
//   reports/     final report, delivery video, minimal fallback report
//   run_report.json

use crate::error::{CoreError, CoreResult};
use crate::media::canonicalize;

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const RUN_ID_LEN: usize = 12;

/// Stable identifier of one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    /// Derives the id from the input file's identity.
    pub fn derive(input: &Path) -> CoreResult<Self> {
        let canonical = canonicalize(input);
        let meta = fs::metadata(&canonical)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string_lossy().as_bytes());
        hasher.update(meta.len().to_le_bytes());
        hasher.update(mtime.to_le_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Ok(Self(digest[..RUN_ID_LEN].to_string()))
    }

    /// Accepts a caller-supplied id made of ASCII letters, digits, `-` and `_`.
    pub fn from_explicit(id: &str) -> CoreResult<Self> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CoreError::Configuration(format!(
                "run id '{id}' may only contain letters, digits, '-' and '_'"
            )));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directory tree of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLayout {
    name: String,
    run_dir: PathBuf,
}

impl RunLayout {
    pub fn new(output_root: &Path, name: &str, run_id: &RunId) -> Self {
        Self {
            name: name.to_string(),
            run_dir: output_root.join(format!("{name}_{run_id}")),
        }
    }

    /// Creates the run directory and every stage directory.
    pub fn create_all(&self) -> CoreResult<()> {
        for dir in [
            self.analysis_dir(),
            self.captions_dir(),
            self.enhance_dir(),
            self.packaging_dir(),
            self.quality_dir(),
            self.reports_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn analysis_dir(&self) -> PathBuf {
        self.run_dir.join("analysis")
    }

    pub fn captions_dir(&self) -> PathBuf {
        self.run_dir.join("captions")
    }

    pub fn enhance_dir(&self) -> PathBuf {
        self.run_dir.join("enhance")
    }

    pub fn packaging_dir(&self) -> PathBuf {
        self.run_dir.join("packaging")
    }

    pub fn quality_dir(&self) -> PathBuf {
        self.run_dir.join("quality")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.run_dir.join("reports")
    }

    pub fn denoised(&self) -> PathBuf {
        self.enhance_dir().join(format!("{}_denoised.mp4", self.name))
    }

    pub fn interpolated(&self) -> PathBuf {
        self.enhance_dir().join(format!("{}_interpolated.mp4", self.name))
    }

    pub fn upscaled(&self) -> PathBuf {
        self.enhance_dir().join(format!("{}_upscaled.mp4", self.name))
    }

    pub fn run_report(&self) -> PathBuf {
        self.run_dir.join("run_report.json")
    }

    pub fn final_report(&self) -> PathBuf {
        self.reports_dir().join(format!("{}_final_report.json", self.name))
    }

    pub fn delivery_video(&self) -> PathBuf {
        self.reports_dir().join(format!("{}_final.mp4", self.name))
    }

    pub fn minimal_report(&self) -> PathBuf {
        self.reports_dir()
            .join(format!("pipeline_report_{}.json", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn derived_id_is_stable_for_the_same_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        fs::write(&input, b"frames").unwrap();

        let first = RunId::derive(&input).unwrap();
        let second = RunId::derive(&input).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 12);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));

        let other = dir.path().join("other.mp4");
        fs::write(&other, b"frames").unwrap();
        assert_ne!(first, RunId::derive(&other).unwrap());
    }

    #[test]
    fn missing_input_cannot_be_identified() {
        let dir = tempdir().unwrap();
        assert!(RunId::derive(&dir.path().join("absent.mp4")).is_err());
    }

    #[test]
    fn explicit_ids_are_restricted() {
        assert_eq!(RunId::from_explicit("nightly-01_a").unwrap().as_str(), "nightly-01_a");
        assert!(RunId::from_explicit("").is_err());
        assert!(RunId::from_explicit("../escape").is_err());
        assert!(RunId::from_explicit("has space").is_err());
    }

    #[test]
    fn layout_paths_hang_off_the_run_dir() {
        let dir = tempdir().unwrap();
        let id = RunId::from_explicit("abc123").unwrap();
        let layout = RunLayout::new(dir.path(), "clip", &id);
        layout.create_all().unwrap();

        assert_eq!(layout.run_dir(), dir.path().join("clip_abc123"));
        assert!(layout.quality_dir().is_dir());
        assert_eq!(
            layout.interpolated(),
            dir.path().join("clip_abc123/enhance/clip_interpolated.mp4")
        );
        assert_eq!(
            layout.minimal_report(),
            dir.path().join("clip_abc123/reports/pipeline_report_clip.json")
        );
    }
}

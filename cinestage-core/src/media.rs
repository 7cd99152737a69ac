// ============================================================================
// cinestage-core/src/media.rs
// ============================================================================
//
// MEDIA ARTIFACTS: Probed Description of a Video File
//
// A `MediaArtifact` is the immutable value threaded between pipeline stages.
// Each stage consumes one artifact and, when it produces a new file, returns a
// freshly probed artifact for it. Probing goes through the `MediaProber` trait
// so the coordinator can be exercised without real media.
//
// KEY COMPONENTS:
// - Resolution: Width and height pair
// - MediaArtifact: Path, canonical identity and container/codec parameters
// - CodecParameters: The subset that must agree for stream-copy concatenation
// - MediaProber / FfprobeProber: Inspection seam and its ffprobe implementation

// ---- Internal crate imports ----
use crate::error::{CoreError, CoreResult};

// ---- External crate imports ----
use ffprobe::{FfProbeError, ffprobe};
use serde::{Deserialize, Serialize};

// ---- Standard library imports ----
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// RESOLUTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| CoreError::Configuration(format!("Invalid resolution '{s}'")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| CoreError::Configuration(format!("Invalid resolution '{s}'")))
        };
        Ok(Self::new(parse(w)?, parse(h)?))
    }
}

// ============================================================================
// MEDIA ARTIFACT
// ============================================================================

/// A probed video file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaArtifact {
    pub path: PathBuf,
    /// Resolved absolute path, used for identity comparisons.
    pub canonical_path: PathBuf,
    pub container: String,
    pub codec: Option<String>,
    pub resolution: Resolution,
    pub frame_rate: f64,
    pub duration_secs: f64,
    pub pix_fmt: Option<String>,
    pub frame_count: Option<u64>,
    pub has_audio: bool,
}

impl MediaArtifact {
    /// True when both artifacts resolve to the same file on disk.
    pub fn is_same_file(&self, other: &MediaArtifact) -> bool {
        self.canonical_path == other.canonical_path
    }

    /// File stem used to name derived artifacts.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string())
    }

    pub fn codec_parameters(&self) -> CodecParameters {
        CodecParameters {
            codec: self.codec.clone(),
            resolution: self.resolution,
            pix_fmt: self.pix_fmt.clone(),
            frame_rate_millis: (self.frame_rate * 1000.0).round() as u64,
        }
    }
}

/// Stream parameters that must match for lossless concatenation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecParameters {
    pub codec: Option<String>,
    pub resolution: Resolution,
    pub pix_fmt: Option<String>,
    /// Frame rate in thousandths of a frame per second.
    pub frame_rate_millis: u64,
}

impl fmt::Display for CodecParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {:.3}fps",
            self.codec.as_deref().unwrap_or("unknown"),
            self.resolution,
            self.pix_fmt.as_deref().unwrap_or("unknown"),
            self.frame_rate_millis as f64 / 1000.0
        )
    }
}

/// Resolves `path` to an absolute, symlink-free form when possible.
pub fn canonicalize(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Parses an ffprobe rational such as `30000/1001` or a plain number.
pub fn parse_frame_rate(value: &str) -> Option<f64> {
    let value = value.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

// ============================================================================
// PROBING
// ============================================================================

/// Inspection seam used by the coordinator, analysis and packaging.
pub trait MediaProber: Send + Sync {
    fn probe(&self, path: &Path) -> CoreResult<MediaArtifact>;
}

/// `MediaProber` backed by the ffprobe crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfprobeProber;

impl MediaProber for FfprobeProber {
    fn probe(&self, path: &Path) -> CoreResult<MediaArtifact> {
        log::debug!("Running ffprobe on: {}", path.display());
        let metadata = ffprobe(path).map_err(|err| map_ffprobe_error(err, path))?;

        let video_stream = metadata
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| CoreError::Probe {
                path: path.to_path_buf(),
                message: "no video stream found".to_string(),
            })?;

        let (width, height) = match (video_stream.width, video_stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w as u32, h as u32),
            (w, h) => {
                return Err(CoreError::Probe {
                    path: path.to_path_buf(),
                    message: format!("invalid dimensions: width={w:?}, height={h:?}"),
                });
            }
        };

        let frame_rate = parse_frame_rate(&video_stream.r_frame_rate)
            .or_else(|| parse_frame_rate(&video_stream.avg_frame_rate))
            .unwrap_or(0.0);

        let duration_secs = metadata
            .format
            .duration
            .as_deref()
            .or(video_stream.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let frame_count = video_stream
            .nb_frames
            .as_deref()
            .and_then(|f| f.parse::<u64>().ok())
            .or_else(|| {
                (duration_secs > 0.0 && frame_rate > 0.0)
                    .then(|| (duration_secs * frame_rate).round() as u64)
            });

        let has_audio = metadata
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"));

        Ok(MediaArtifact {
            path: path.to_path_buf(),
            canonical_path: canonicalize(path),
            container: metadata.format.format_name.clone(),
            codec: video_stream.codec_name.clone(),
            resolution: Resolution::new(width, height),
            frame_rate,
            duration_secs,
            pix_fmt: video_stream.pix_fmt.clone(),
            frame_count,
            has_audio,
        })
    }
}

fn map_ffprobe_error(err: FfProbeError, path: &Path) -> CoreError {
    match err {
        FfProbeError::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {
            CoreError::ToolUnavailable {
                tool: "ffprobe".to_string(),
            }
        }
        FfProbeError::Io(io_err) => CoreError::Probe {
            path: path.to_path_buf(),
            message: io_err.to_string(),
        },
        FfProbeError::Status(output) => CoreError::Probe {
            path: path.to_path_buf(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        },
        FfProbeError::Deserialize(err) => CoreError::Probe {
            path: path.to_path_buf(),
            message: format!("unreadable ffprobe output: {err}"),
        },
        other => CoreError::Probe {
            path: path.to_path_buf(),
            message: format!("{other:?}"),
        },
    }
}

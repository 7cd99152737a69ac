// ============================================================================
// cinestage-core/src/packaging/ladder.rs
// ============================================================================
//
// ENCODING LADDER: Resolution/Bitrate Rungs and Their Encoder Arguments

use crate::error::{CoreError, CoreResult};
use crate::external::{ExpectedOutput, Filter, FilterGraph, ToolCommand};
use crate::media::Resolution;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// One rung of the ABR ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingProfile {
    pub name: String,
    #[serde(with = "resolution_string")]
    pub resolution: Resolution,
    pub bitrate_kbps: u32,
}

impl EncodingProfile {
    pub fn new(name: &str, width: u32, height: u32, bitrate_kbps: u32) -> Self {
        Self {
            name: name.to_string(),
            resolution: Resolution::new(width, height),
            bitrate_kbps,
        }
    }

    /// 1080p/5000k, 720p/2800k, 480p/1400k, 360p/800k.
    pub fn default_ladder() -> Vec<EncodingProfile> {
        vec![
            EncodingProfile::new("1080p", 1920, 1080, 5000),
            EncodingProfile::new("720p", 1280, 720, 2800),
            EncodingProfile::new("480p", 854, 480, 1400),
            EncodingProfile::new("360p", 640, 360, 800),
        ]
    }

    /// Advertised bandwidth in bits per second.
    pub fn bandwidth(&self) -> u64 {
        u64::from(self.bitrate_kbps) * 1000
    }

    pub fn validate(&self) -> CoreResult<()> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(CoreError::Configuration(format!(
                "ladder profile name '{}' must be non-empty and use only [A-Za-z0-9_-]",
                self.name
            )));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(CoreError::Configuration(format!(
                "ladder profile '{}' has an empty resolution",
                self.name
            )));
        }
        if self.resolution.width % 2 != 0 || self.resolution.height % 2 != 0 {
            return Err(CoreError::Configuration(format!(
                "ladder profile '{}' resolution {} must have even dimensions for yuv420p",
                self.name, self.resolution
            )));
        }
        if self.bitrate_kbps == 0 {
            return Err(CoreError::Configuration(format!(
                "ladder profile '{}' needs a positive bitrate",
                self.name
            )));
        }
        Ok(())
    }
}

/// Keyframe interval in frames so every segment starts on a keyframe.
pub fn gop_frames(segment_secs: u32, frame_rate: f64) -> u32 {
    let frames = (f64::from(segment_secs) * frame_rate).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as u32
    } else {
        1
    }
}

/// Appends the rung encode and HLS segmenting arguments to `command`.
///
/// Playlist and segments land in `variant_dir` as `<name>.m3u8` and
/// `<name>_%03d.ts`.
pub fn rung_arguments(
    command: ToolCommand,
    profile: &EncodingProfile,
    segment_secs: u32,
    frame_rate: f64,
    preset: &str,
    variant_dir: &Path,
) -> ToolCommand {
    let gop = gop_frames(segment_secs, frame_rate).to_string();
    let bitrate = format!("{}k", profile.bitrate_kbps);
    let scale = FilterGraph::simple([Filter::new("scale")
        .pos(profile.resolution.width)
        .pos(profile.resolution.height)
        .kv("flags", "lanczos")]);

    command
        .filter("-vf", &scale)
        .opt("-c:v", "libx264")
        .opt("-b:v", &bitrate)
        .opt("-maxrate", &bitrate)
        .opt("-bufsize", format!("{}k", u64::from(profile.bitrate_kbps) * 2))
        .opt("-preset", preset)
        .opt("-g", &gop)
        .opt("-keyint_min", &gop)
        .opt("-sc_threshold", "0")
        .opt(
            "-force_key_frames",
            format!("expr:gte(t,n_forced*{segment_secs})"),
        )
        .opt("-flags", "+cgop")
        .opt("-pix_fmt", "yuv420p")
        .opt("-c:a", "aac")
        .opt("-b:a", "128k")
        .opt("-hls_time", segment_secs.to_string())
        .opt("-hls_playlist_type", "vod")
        .opt(
            "-hls_segment_filename",
            variant_dir.join(format!("{}_%03d.ts", profile.name)),
        )
        .output(variant_dir.join(format!("{}.m3u8", profile.name)))
        // Segments are owned by the rung directory so a failed encode leaves none behind.
        .expect(ExpectedOutput::NonEmptyDir(variant_dir.to_path_buf()))
}

mod resolution_string {
    use crate::media::Resolution;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Resolution, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Resolution, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

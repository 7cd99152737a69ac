// ============================================================================
// cinestage-core/src/packaging/manifest.rs
// ============================================================================
//
// MASTER MANIFEST: Deterministic HLS Master Playlist
//
// The manifest is assembled only after every rung has finished. Entries are
// ordered by descending bandwidth (ties keep ladder order), so the output is
// identical for a given ladder no matter which encode finished first.

use super::EncodingProfile;
use crate::error::{CoreError, CoreResult};

use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// One finished rung: its playlist and segments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
    pub profile: EncodingProfile,
    pub playlist_path: PathBuf,
    pub segment_paths: Vec<PathBuf>,
    /// Position of the profile in the configured ladder.
    #[serde(skip)]
    pub ladder_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct ManifestEntry {
    bandwidth: u64,
    resolution: String,
    uri: String,
}

/// The master playlist referencing every variant playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterManifest {
    entries: Vec<ManifestEntry>,
}

impl MasterManifest {
    /// Builds the manifest that will live in `manifest_dir`.
    ///
    /// Fails with `ManifestIntegrity` when the variant count differs from
    /// the ladder length, and with `Configuration` when a variant playlist is
    /// missing or lies outside `manifest_dir`.
    pub fn assemble(
        ladder: &[EncodingProfile],
        variants: &[Variant],
        manifest_dir: &Path,
    ) -> CoreResult<Self> {
        if variants.len() != ladder.len() {
            return Err(CoreError::ManifestIntegrity {
                expected: ladder.len(),
                actual: variants.len(),
            });
        }

        let mut ordered: Vec<&Variant> = variants.iter().collect();
        ordered.sort_by(|a, b| {
            b.profile
                .bandwidth()
                .cmp(&a.profile.bandwidth())
                .then(a.ladder_index.cmp(&b.ladder_index))
        });

        let mut entries = Vec::with_capacity(ordered.len());
        for variant in ordered {
            if !variant.playlist_path.is_file() {
                return Err(CoreError::Configuration(format!(
                    "variant playlist {} does not exist",
                    variant.playlist_path.display()
                )));
            }
            let relative = variant
                .playlist_path
                .strip_prefix(manifest_dir)
                .map_err(|_| {
                    CoreError::Configuration(format!(
                        "variant playlist {} is outside {}",
                        variant.playlist_path.display(),
                        manifest_dir.display()
                    ))
                })?;
            let uri = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(ManifestEntry {
                bandwidth: variant.profile.bandwidth(),
                resolution: variant.profile.resolution.to_string(),
                uri,
            });
        }
        Ok(Self { entries })
    }

    pub fn variant_count(&self) -> usize {
        self.entries.len()
    }

    /// Bandwidths in manifest order.
    #[cfg(test)]
    pub fn bandwidths(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.bandwidth).collect()
    }

    pub fn render(&self) -> String {
        let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        for entry in &self.entries {
            let _ = writeln!(
                text,
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}",
                entry.bandwidth, entry.resolution
            );
            let _ = writeln!(text, "{}", entry.uri);
        }
        text
    }

    pub fn write(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())?;
        Ok(())
    }
}

// ============================================================================
// cinestage-core/src/analysis/frames.rs
// ============================================================================
//
// FRAME SOURCES: Streaming Decoded Luma Frames to the Signal Extractor
//
// The extractor never decodes video itself. It asks a `FrameSource` to visit
// every frame of an artifact in order. The production source streams raw RGB
// frames out of ffmpeg through ffmpeg-sidecar and converts them to luma.
//
// Malformed or truncated inputs are tolerated: if ffmpeg produces no frames
// the source reports zero frames instead of failing, and the extractor then
// yields an all-zero profile.

// ---- Internal crate imports ----
use crate::error::{CoreError, CoreResult};
use crate::external::CancelToken;
use crate::media::MediaArtifact;

// ---- External crate imports ----
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::iter::FfmpegIterator;
use image::{GrayImage, Luma, RgbImage};

// ---- Standard library imports ----
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// How often the watcher looks at the cancel token while ffmpeg is silent.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Visits decoded frames in presentation order.
pub trait FrameSource: Send + Sync {
    /// Calls `visit` once per frame and returns the number of frames visited.
    ///
    /// An error returned by `visit` stops decoding and is propagated. A
    /// cancelled `cancel` stops decoding with `CoreError::Cancelled`.
    fn for_each_frame(
        &self,
        artifact: &MediaArtifact,
        cancel: &CancelToken,
        visit: &mut dyn FnMut(GrayImage) -> CoreResult<()>,
    ) -> CoreResult<usize>;
}

/// Decodes with an ffmpeg child process via ffmpeg-sidecar.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    ffmpeg: String,
}

impl FfmpegFrameSource {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FrameSource for FfmpegFrameSource {
    fn for_each_frame(
        &self,
        artifact: &MediaArtifact,
        cancel: &CancelToken,
        visit: &mut dyn FnMut(GrayImage) -> CoreResult<()>,
    ) -> CoreResult<usize> {
        if cancel.is_cancelled() {
            return Err(cancelled(artifact));
        }

        let input = artifact.path.to_string_lossy().into_owned();
        let mut cmd = FfmpegCommand::new_with_path(&self.ffmpeg);
        cmd.hide_banner().input(&input).args(["-an", "-sn"]).rawvideo();
        log::debug!("Decoding frames for analysis: {}", artifact.path.display());

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CoreError::ToolUnavailable {
                tool: self.ffmpeg.clone(),
            },
            _ => CoreError::Analysis(format!("failed to start frame decoder: {e}")),
        })?;

        let iter = match child.iter() {
            Ok(iter) => iter,
            Err(e) => {
                terminate(&mut child);
                return Err(CoreError::Analysis(format!(
                    "failed to read decoder output: {e}"
                )));
            }
        };

        // The iterator owns the pipes; the child is shared with a watcher that
        // kills it on cancellation even when no frame arrives.
        let child = Mutex::new(child);
        let finished = AtomicBool::new(false);
        let decoded = thread::scope(|scope| {
            scope.spawn(|| {
                while !finished.load(Ordering::SeqCst) {
                    if cancel.is_cancelled() {
                        log::warn!("Cancelling frame decoder");
                        terminate(&mut lock(&child));
                        return;
                    }
                    thread::sleep(CANCEL_POLL_INTERVAL);
                }
            });
            let decoded = decode(iter, artifact, cancel, visit);
            finished.store(true, Ordering::SeqCst);
            decoded
        });

        let mut child = child.into_inner().unwrap_or_else(|p| p.into_inner());
        let count = match decoded {
            Ok(count) => count,
            Err(e) => {
                terminate(&mut child);
                return Err(e);
            }
        };

        match child.wait() {
            Ok(status) if !status.success() => {
                log::warn!(
                    "Frame decoder exited with {} after {} frames for {}",
                    status,
                    count,
                    artifact.path.display()
                );
            }
            Ok(_) => {}
            Err(e) => log::warn!("Failed to reap frame decoder: {}", e),
        }

        if count == 0 {
            log::warn!(
                "No decodable frames in {}; metrics default to zero",
                artifact.path.display()
            );
        }
        Ok(count)
    }
}

fn decode(
    iter: FfmpegIterator,
    artifact: &MediaArtifact,
    cancel: &CancelToken,
    visit: &mut dyn FnMut(GrayImage) -> CoreResult<()>,
) -> CoreResult<usize> {
    let mut count = 0usize;
    for frame in iter.filter_frames() {
        if cancel.is_cancelled() {
            return Err(cancelled(artifact));
        }
        let Some(rgb) = RgbImage::from_raw(frame.width, frame.height, frame.data) else {
            log::warn!(
                "Skipping malformed frame {} ({}x{}) in {}",
                frame.frame_num,
                frame.width,
                frame.height,
                artifact.path.display()
            );
            continue;
        };
        visit(to_luma(&rgb))?;
        count += 1;
    }
    // A killed decoder simply closes its pipes.
    if cancel.is_cancelled() {
        return Err(cancelled(artifact));
    }
    Ok(count)
}

/// Rec.601 luma (0.299 R + 0.587 G + 0.114 B), the weighting the noise and
/// blur bands are calibrated against.
pub fn to_luma(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let y = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
        Luma([y.round().clamp(0.0, 255.0) as u8])
    })
}

fn cancelled(artifact: &MediaArtifact) -> CoreError {
    CoreError::Cancelled(format!(
        "frame decoding of {} was cancelled",
        artifact.path.display()
    ))
}

fn terminate(child: &mut FfmpegChild) {
    if let Err(e) = child.kill() {
        log::debug!("kill failed (decoder may have exited): {}", e);
    }
    let _ = child.wait();
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

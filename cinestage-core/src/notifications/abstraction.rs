// ============================================================================
// cinestage-core/src/notifications/abstraction.rs
// ============================================================================
//
// NOTIFICATION ABSTRACTION: Message Types and the Sender Trait

use crate::error::CoreResult;

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

// ============================================================================
// NOTIFICATION TYPES
// ============================================================================

/// Messages emitted over the life of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationType {
    RunStart {
        input_path: PathBuf,
        run_id: String,
        hostname: String,
    },

    RunComplete {
        input_path: PathBuf,
        /// Delivery video, when the final report produced one.
        final_video: Option<PathBuf>,
        duration: Duration,
        hostname: String,
    },

    RunFailed {
        input_path: PathBuf,
        /// Stage that aborted the run.
        stage: String,
        message: String,
        hostname: String,
    },
}

impl NotificationType {
    pub fn get_title(&self) -> String {
        match self {
            NotificationType::RunStart { .. } => "Pipeline Started".to_string(),
            NotificationType::RunComplete { .. } => "Pipeline Complete".to_string(),
            NotificationType::RunFailed { .. } => "Pipeline Failed".to_string(),
        }
    }

    pub fn get_message(&self) -> String {
        match self {
            NotificationType::RunStart {
                input_path,
                run_id,
                hostname,
            } => format!(
                "Started processing {} (run {}) on {}",
                file_name(input_path),
                run_id,
                hostname
            ),
            NotificationType::RunComplete {
                input_path,
                final_video,
                duration,
                hostname,
            } => {
                let output = final_video
                    .as_deref()
                    .map(file_name)
                    .unwrap_or_else(|| "no delivery video".to_string());
                format!(
                    "Finished {} on {} in {}: {}",
                    file_name(input_path),
                    hostname,
                    format_duration(*duration),
                    output
                )
            }
            NotificationType::RunFailed {
                input_path,
                stage,
                message,
                hostname,
            } => format!(
                "Processing {} failed at stage '{}' on {}: {}",
                file_name(input_path),
                stage,
                hostname,
                message
            ),
        }
    }

    /// Priority on ntfy's 1-5 scale.
    pub fn get_priority(&self) -> u8 {
        match self {
            NotificationType::RunStart { .. } => 3,
            NotificationType::RunComplete { .. } => 4,
            NotificationType::RunFailed { .. } => 5,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            NotificationType::RunStart { .. } => "start",
            NotificationType::RunComplete { .. } => "complete",
            NotificationType::RunFailed { .. } => "error",
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Name of the machine running the pipeline.
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            Command::new("hostname")
                .output()
                .ok()
                .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

// ============================================================================
// NOTIFICATION SENDER
// ============================================================================

/// Delivers notifications to some backend.
pub trait NotificationSender: Send + Sync {
    fn send_notification(&self, notification: &NotificationType) -> CoreResult<()>;
}

/// Sender that drops every notification.
#[derive(Debug, Clone, Default)]
pub struct NullNotificationSender;

impl NotificationSender for NullNotificationSender {
    fn send_notification(&self, _notification: &NotificationType) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_input_file() {
        let start = NotificationType::RunStart {
            input_path: PathBuf::from("/media/clips/beach.mp4"),
            run_id: "0123456789ab".to_string(),
            hostname: "render01".to_string(),
        };
        assert_eq!(
            start.get_message(),
            "Started processing beach.mp4 (run 0123456789ab) on render01"
        );
        assert_eq!(start.get_priority(), 3);

        let done = NotificationType::RunComplete {
            input_path: PathBuf::from("/media/clips/beach.mp4"),
            final_video: Some(PathBuf::from("/out/beach_final.mp4")),
            duration: Duration::from_secs(3725),
            hostname: "render01".to_string(),
        };
        assert!(done.get_message().contains("1h 2m 5s"));
        assert!(done.get_message().ends_with("beach_final.mp4"));

        let failed = NotificationType::RunFailed {
            input_path: PathBuf::from("beach.mp4"),
            stage: "upscale".to_string(),
            message: "tool missing".to_string(),
            hostname: "render01".to_string(),
        };
        assert_eq!(failed.get_priority(), 5);
        assert_eq!(failed.tag(), "error");
        assert!(failed.get_message().contains("'upscale'"));
    }

    #[test]
    fn durations_are_compact() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(61)), "1m 1s");
    }
}

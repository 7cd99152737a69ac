// ============================================================================
// cinestage-core/src/notifications/ntfy.rs
// ============================================================================
//
// NTFY IMPLEMENTATION: Notifications Delivered Through ntfy.sh

use super::{NotificationSender, NotificationType};
use crate::error::{CoreError, CoreResult};

use ntfy::DispatcherBuilder;
use ntfy::payload::{Payload, Priority as NtfyPriority};

/// Sends notifications to an ntfy topic URL such as `https://ntfy.sh/my_topic`.
///
/// ```rust
/// use cinestage_core::notifications::NtfyNotificationSender;
///
/// assert!(NtfyNotificationSender::new("https://ntfy.sh/renders").is_ok());
/// assert!(NtfyNotificationSender::new("http://ntfy.sh/renders").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct NtfyNotificationSender {
    base_url: String,
    topic: String,
}

impl NtfyNotificationSender {
    /// Validates `topic_url` and splits it into server and topic.
    pub fn new(topic_url: &str) -> CoreResult<Self> {
        let Some(after_scheme) = topic_url.strip_prefix("https://") else {
            return Err(CoreError::Notification(format!(
                "Invalid ntfy topic URL '{}': must start with https://",
                topic_url
            )));
        };

        let (host, topic) = after_scheme.split_once('/').unwrap_or((after_scheme, ""));
        if host.is_empty() {
            return Err(CoreError::Notification(format!(
                "URL '{}' must have a non-empty host",
                topic_url
            )));
        }
        let topic = topic.trim_end_matches('/');
        if topic.is_empty() {
            return Err(CoreError::Notification(format!(
                "URL '{}' is missing topic path",
                topic_url
            )));
        }

        Ok(Self {
            base_url: format!("https://{}", host),
            topic: topic.to_string(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl NotificationSender for NtfyNotificationSender {
    fn send_notification(&self, notification: &NotificationType) -> CoreResult<()> {
        let dispatcher = DispatcherBuilder::new(&self.base_url)
            .build_blocking()
            .map_err(|e| {
                CoreError::Notification(format!(
                    "Failed to build ntfy dispatcher for {}: {}",
                    self.base_url, e
                ))
            })?;

        let priority = map_priority(notification.get_priority()).unwrap_or(NtfyPriority::Default);
        let payload = Payload::new(&self.topic)
            .message(notification.get_message())
            .title(notification.get_title())
            .priority(priority)
            .tags(vec!["cinestage".to_string(), notification.tag().to_string()]);

        dispatcher.send(&payload).map_err(|e| {
            CoreError::Notification(format!(
                "Failed to send ntfy notification to {}/{}: {}",
                self.base_url, self.topic, e
            ))
        })?;
        Ok(())
    }
}

fn map_priority(p: u8) -> Option<NtfyPriority> {
    match p {
        1 => Some(NtfyPriority::Min),
        2 => Some(NtfyPriority::Low),
        3 => Some(NtfyPriority::Default),
        4 => Some(NtfyPriority::High),
        5 => Some(NtfyPriority::Max),
        _ => None,
    }
}

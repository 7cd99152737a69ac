// cinestage-core/src/notifications/mocks.rs

#![cfg(any(test, feature = "test-mocks"))]

use super::{NotificationSender, NotificationType};
use crate::error::{CoreError, CoreResult};
use std::sync::Mutex;

/// Records notifications instead of sending them; can be told to fail.
#[derive(Default)]
pub struct MockNotificationSender {
    sent: Mutex<Vec<NotificationType>>,
    fail: bool,
}

impl MockNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender whose every delivery errors.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<NotificationType> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl NotificationSender for MockNotificationSender {
    fn send_notification(&self, notification: &NotificationType) -> CoreResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification.clone());
        if self.fail {
            return Err(CoreError::Notification("mock delivery failure".to_string()));
        }
        Ok(())
    }
}

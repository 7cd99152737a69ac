// ============================================================================
// cinestage-core/src/notifications/mod.rs
// ============================================================================
//
// NOTIFICATIONS: Run Start/Success/Failure Push Messages
//
// The coordinator announces the start and end of every run through a
// `NotificationSender`. Sending is best effort: a failed notification is
// logged and never changes the outcome of the run.
//
// KEY COMPONENTS:
// - NotificationType: The messages a run can emit
// - NotificationSender: Trait implemented by backends
// - NtfyNotificationSender: ntfy.sh backend
// - NullNotificationSender: No-op backend

mod abstraction;
mod ntfy;

#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks;

pub use abstraction::{NotificationSender, NotificationType, NullNotificationSender, hostname};
pub use ntfy::NtfyNotificationSender;

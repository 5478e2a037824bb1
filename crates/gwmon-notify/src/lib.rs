//! Notification delivery boundary.
//!
//! Alerts and reports leave the system through a [`NotificationChannel`].
//! The built-in implementation is [`channels::telegram::TelegramChannel`].
//! Sends are single-shot: a failed delivery is surfaced to the caller for
//! logging and never retried synchronously, so one slow or broken channel
//! cannot block subsequent dispatches.

pub mod channels;
pub mod error;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use error::NotifyError;

/// An inline action offered alongside a notification (rendered as a
/// button by channels that support it). `callback` is the opaque payload
/// returned when the operator taps the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAction {
    pub label: String,
    pub callback: String,
}

impl InlineAction {
    pub fn new(label: &str, callback: &str) -> Self {
        Self {
            label: label.to_string(),
            callback: callback.to_string(),
        }
    }
}

/// A notification delivery channel that pushes formatted text to an
/// external service.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers `text`, optionally offering inline actions.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails; callers log and move on.
    async fn send(&self, text: &str, actions: &[InlineAction]) -> Result<(), NotifyError>;

    /// Returns the channel type name (e.g., `"telegram"`).
    fn channel_name(&self) -> &str;
}

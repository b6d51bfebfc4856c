//! Elapsed-time status notifications for an active session.

use crate::platform::Notifier;

/// Notification slot used for the session status card.
pub const SESSION_NOTIFICATION_ID: u32 = 4001;

/// Status payload pushed to the notification collaborator once a second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPayload {
    pub elapsed_seconds: u64,
    pub horse_name: String,
    pub training_type: String,
}

impl StatusPayload {
    /// Title and body for the status card.
    pub fn render(&self) -> (String, String) {
        let h = self.elapsed_seconds / 3600;
        let m = (self.elapsed_seconds % 3600) / 60;
        let s = self.elapsed_seconds % 60;
        let elapsed = if h > 0 {
            format!("{}:{:02}:{:02}", h, m, s)
        } else {
            format!("{}:{:02}", m, s)
        };
        (
            format!("Training {}", self.horse_name),
            format!("{} · {}", self.training_type, elapsed),
        )
    }
}

/// Pushes the status card through the notifier.
///
/// Pure status relay: a delivery failure is logged and ignored, never fed
/// back into the session.
#[derive(Debug, Default)]
pub struct NotificationTicker {
    shown: bool,
}

impl NotificationTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, notifier: &mut dyn Notifier, payload: &StatusPayload) {
        let (title, body) = payload.render();
        match notifier.show(SESSION_NOTIFICATION_ID, &title, &body) {
            Ok(()) => self.shown = true,
            Err(e) => tracing::warn!(error = %e, "status notification failed"),
        }
    }

    /// Take the status card down at session end.
    pub fn dismiss(&mut self, notifier: &mut dyn Notifier) {
        if self.shown {
            notifier.dismiss(SESSION_NOTIFICATION_ID);
            self.shown = false;
        }
    }
}

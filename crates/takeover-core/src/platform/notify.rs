use serde::{Deserialize, Serialize};

use crate::models::Reminder;

/// Platform notification used when no tab could show a takeover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn for_reminder(reminder: &Reminder) -> Self {
        let title = match reminder.title.trim() {
            "" => crate::constants::DEFAULT_REMINDER_TITLE.to_string(),
            title => title.to_string(),
        };
        let mut body = format!("Due at {}", reminder.display_time());
        if !reminder.note.trim().is_empty() {
            body.push_str(" - ");
            body.push_str(reminder.note.trim());
        }
        Self { title, body }
    }
}

/// Fire-and-forget; implementations swallow their own failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

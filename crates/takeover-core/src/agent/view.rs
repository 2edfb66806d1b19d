//! What the takeover modal displays. All reminder text is plain text.

use chrono::Duration;
use serde::Serialize;

use crate::constants::{DEFAULT_REMINDER_TITLE, DISMISS_LABEL, MAX_RENDERED_TEXT, SNOOZE_LABEL};
use crate::models::Reminder;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayView {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub due_time: String,
    pub dismiss_label: String,
    /// `None` once snoozing would no longer move the reminder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snooze_label: Option<String>,
}

impl OverlayView {
    pub fn for_reminder(reminder: &Reminder, snooze_minutes_before: i64, tolerance_secs: i64) -> Self {
        let title = match sanitize_text(&reminder.title) {
            title if title.is_empty() => DEFAULT_REMINDER_TITLE.to_string(),
            title => title,
        };
        let note = Some(sanitize_text(&reminder.note)).filter(|note| !note.is_empty());

        Self {
            title,
            note,
            due_time: reminder.display_time(),
            dismiss_label: DISMISS_LABEL.to_string(),
            snooze_label: snooze_available(reminder, snooze_minutes_before, tolerance_secs)
                .then(|| SNOOZE_LABEL.to_string()),
        }
    }

    pub fn offers_snooze(&self) -> bool {
        self.snooze_label.is_some()
    }
}

/// Snooze is offered until the reminder already sits at its snooze target.
pub fn snooze_available(reminder: &Reminder, snooze_minutes_before: i64, tolerance_secs: i64) -> bool {
    let distance = reminder.due_at() - reminder.snooze_target(snooze_minutes_before);
    distance.abs() > Duration::seconds(tolerance_secs)
}

/// Drop anything that looks like a tag, trim, cap the length.
pub fn sanitize_text(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find('<') {
        text.push_str(&rest[..open]);
        match rest[open..].find('>') {
            Some(close) => rest = &rest[open + close + 1..],
            None => {
                // Unclosed bracket is literal text
                text.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    text.push_str(rest);
    text.trim().chars().take(MAX_RENDERED_TEXT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReminderId;
    use chrono::NaiveDate;

    fn reminder(title: &str, note: &str) -> Reminder {
        let due = NaiveDate::from_ymd_opt(2030, 2, 2)
            .unwrap()
            .and_hms_opt(11, 30, 0)
            .unwrap();
        Reminder::new(ReminderId::new("v"), title, note, due)
    }

    #[test]
    fn test_markup_is_stripped() {
        assert_eq!(sanitize_text("<b>Sync</b> with <script>alert(1)</script>team"), "Sync with alert(1)team");
        assert_eq!(sanitize_text("  a < b  "), "a < b");
        assert_eq!(sanitize_text(&"x".repeat(1500)).len(), 1000);
    }

    #[test]
    fn test_view_defaults_and_labels() {
        let view = OverlayView::for_reminder(&reminder("<img src=x>", "  "), 2, 30);
        assert_eq!(view.title, "Reminder");
        assert_eq!(view.note, None);
        assert_eq!(view.due_time, "11:30");
        assert_eq!(view.dismiss_label, "Dismiss");
        assert_eq!(view.snooze_label.as_deref(), Some("Snooze until 2m before"));
    }

    #[test]
    fn test_snooze_hidden_at_snooze_target() {
        let original = reminder("Call", "");
        let snoozed = original.rescheduled(original.snooze_target(2));
        let view = OverlayView::for_reminder(&snoozed, 2, 30);
        assert!(!view.offers_snooze());
        assert_eq!(view.due_time, "11:30");

        let earlier = original.rescheduled(original.snooze_target(3));
        assert!(OverlayView::for_reminder(&earlier, 2, 30).offers_snooze());
    }
}

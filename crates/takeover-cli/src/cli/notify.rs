use takeover_core::platform::{Notification, Notifier};
use tracing::info;

/// Stands in for the desktop notification when no tab could show a
/// takeover: logs it and prints one JSON line to stdout.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        info!("Notification: {} ({})", notification.title, notification.body);
        println!(
            "{}",
            serde_json::json!({ "event": "notification", "notification": notification })
        );
    }
}

//! Application-wide constants
//!
//! Centralized location for magic strings and default tunables that are
//! shared by the controller, the tab agent and the control surface.

/// Prefix of every timer owned by a reminder: `reminder-<id>`.
pub const ALARM_NAME_PREFIX: &str = "reminder-";

/// Default minutes before the due instant that a new reminder's alarm fires.
pub const DEFAULT_LEAD_MINUTES: i64 = 10;

/// Snooze target: this many minutes before the original due instant.
pub const SNOOZE_MINUTES_BEFORE: i64 = 2;

/// Snooze is hidden when the current due time is within this many seconds
/// of the snooze target.
pub const SNOOZE_TOLERANCE_SECS: i64 = 30;

// Storage keys
pub const REMINDERS_KEY: &str = "reminders";
pub const WHITELIST_KEY: &str = "whitelist";

// Store limits
pub const MAX_REMINDERS: usize = 100;
pub const MAX_WHITELIST_SITES: usize = 50;

/// Sync storage quota in bytes.
pub const STORAGE_QUOTA_BYTES: u64 = 102_400;

/// Cache freshness window in seconds (5 minutes).
pub const CACHE_TTL_SECS: u64 = 5 * 60;

// Reminder field limits
pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_NOTE_LENGTH: usize = 500;

/// Plain-text fields rendered in a takeover are capped at this many chars.
pub const MAX_RENDERED_TEXT: usize = 1000;

// Delivery pipeline defaults
pub const INJECTION_BATCH_SIZE: usize = 5;
pub const BATCH_PAUSE_MS: u64 = 100;
pub const HANDSHAKE_TIMEOUT_MS: u64 = 1000;
pub const MAX_DELIVERY_RETRIES: u32 = 3;
pub const RETRY_DELAY_MS: u64 = 500;

// Tab agent timings
pub const CLOSE_ANIMATION_MS: u64 = 300;
pub const SAFETY_CHECK_MS: u64 = 1000;

// Takeover copy
pub const DEFAULT_REMINDER_TITLE: &str = "Reminder";
pub const SNOOZE_LABEL: &str = "Snooze until 2m before";
pub const DISMISS_LABEL: &str = "Dismiss";
pub const TEST_REMINDER_TITLE: &str = "Test Reminder";
pub const TEST_REMINDER_NOTE: &str = "This is a test of the takeover functionality.";

/// Hostnames exempted from takeovers out of the box (meeting and
/// interview tools).
pub const DEFAULT_WHITELIST: &[&str] = &[
    "meet.google.com",
    "zoom.us",
    "slack.com",
    "teams.microsoft.com",
    "goodtime.io",
    "webex.com",
    "discord.com",
    "web.skype.com",
    "gotomeeting.com",
    "bluejeans.com",
    "whereby.com",
    "ringcentral.com",
    "hackerrank.com",
    "coderpad.io",
    "hirevue.com",
    "karat.com",
    "miro.com",
    "mural.co",
    "figma.com",
    "notion.so",
    "airtable.com",
];

/// Browser-owned surfaces that reject or must never receive an injected
/// agent, as `(host, path prefix)` pairs.
pub const BROWSER_INTERNAL_SURFACES: &[(&str, &str)] = &[
    ("chrome.google.com", "/webstore"),
    ("chromewebstore.google.com", "/"),
    ("microsoftedge.microsoft.com", "/addons"),
    ("addons.mozilla.org", "/"),
];

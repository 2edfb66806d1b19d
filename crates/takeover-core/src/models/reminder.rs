use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::constants::{TEST_REMINDER_NOTE, TEST_REMINDER_TITLE};

/// Opaque reminder identifier.
///
/// New ids are UUIDv7 strings (time-ordered). Older stores kept numeric
/// ids, which still deserialize and keep their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ReminderId(String);

impl ReminderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ids travel inside timer names, so they are restricted to a
    /// conservative alphabet.
    pub fn is_well_formed(id: &str) -> bool {
        !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    }
}

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReminderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl<'de> Deserialize<'de> for ReminderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Ok(Self(text)),
            RawId::Number(number) => Ok(Self(number.to_string())),
        }
    }
}

/// A scheduled takeover.
///
/// `date`/`time` is the instant the reminder is currently due (moved by
/// snoozing), `original_date`/`original_time` is the instant it was first
/// scheduled for and anchors every snooze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ReminderRecord")]
pub struct Reminder {
    pub id: ReminderId,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub original_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub original_time: NaiveTime,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_test: bool,
}

/// Wire shape accepted on input: records written before the original
/// date/time existed fall back to the current one.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReminderRecord {
    id: ReminderId,
    title: String,
    #[serde(default)]
    note: Option<String>,
    date: NaiveDate,
    #[serde(with = "hhmm")]
    time: NaiveTime,
    #[serde(default)]
    original_date: Option<NaiveDate>,
    #[serde(default, with = "hhmm::option")]
    original_time: Option<NaiveTime>,
    #[serde(default)]
    is_test: bool,
}

impl From<ReminderRecord> for Reminder {
    fn from(record: ReminderRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            note: record.note.unwrap_or_default(),
            date: record.date,
            time: record.time,
            original_date: record.original_date.unwrap_or(record.date),
            original_time: record.original_time.unwrap_or(record.time),
            is_test: record.is_test,
        }
    }
}

impl Reminder {
    pub fn new(
        id: ReminderId,
        title: impl Into<String>,
        note: impl Into<String>,
        due: NaiveDateTime,
    ) -> Self {
        let due = truncate_to_minute(due);
        Self {
            id,
            title: title.into(),
            note: note.into(),
            date: due.date(),
            time: due.time(),
            original_date: due.date(),
            original_time: due.time(),
            is_test: false,
        }
    }

    /// Synthetic reminder due now, flagged so it never touches storage or
    /// timers.
    pub fn test_at(now: NaiveDateTime) -> Self {
        let mut reminder = Self::new(
            ReminderId::generate(),
            TEST_REMINDER_TITLE,
            TEST_REMINDER_NOTE,
            now,
        );
        reminder.is_test = true;
        reminder
    }

    pub fn due_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn original_due_at(&self) -> NaiveDateTime {
        self.original_date.and_time(self.original_time)
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.due_at() <= now
    }

    /// `minutes_before` the original due instant; independent of how often
    /// the reminder has been snoozed already.
    pub fn snooze_target(&self, minutes_before: i64) -> NaiveDateTime {
        self.original_due_at() - Duration::minutes(minutes_before)
    }

    /// Copy with the current due instant moved; id and original instant
    /// are preserved.
    pub fn rescheduled(&self, due: NaiveDateTime) -> Self {
        let due = truncate_to_minute(due);
        Self {
            date: due.date(),
            time: due.time(),
            ..self.clone()
        }
    }

    pub fn display_time(&self) -> String {
        self.original_time.format("%H:%M").to_string()
    }
}

fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// `HH:MM` wall-clock times; `HH:MM:SS` is accepted on input.
pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(value: &str) -> Option<NaiveTime> {
        let value = value.trim();
        NaiveTime::parse_from_str(value, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time: {raw}")))
    }

    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveTime>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            match raw {
                None => Ok(None),
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid time: {raw}"))),
            }
        }
    }
}

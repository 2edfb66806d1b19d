//! Reminder and whitelist input validation
//!
//! Rejects bad input at the boundary with a user-facing message, before any
//! state is touched.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_NOTE_LENGTH, MAX_TITLE_LENGTH};
use crate::models::reminder::hhmm;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please provide a title, date, and time.")]
    MissingFields,
    #[error("Title must be {max} characters or less.")]
    TitleTooLong { max: usize, actual: usize },
    #[error("Note must be {max} characters or less.")]
    NoteTooLong { max: usize, actual: usize },
    #[error("Invalid date or time format.")]
    InvalidDateTime,
    #[error("Reminder must be set for a future date and time.")]
    NotInFuture,
    #[error("Please enter a valid website (e.g., example.com).")]
    InvalidSite(String),
}

/// Raw form input from a control surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderDraft {
    pub title: String,
    #[serde(default)]
    pub note: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
}

impl ReminderDraft {
    pub fn new(
        title: impl Into<String>,
        note: impl Into<String>,
        date: impl Into<String>,
        time: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            note: note.into(),
            date: date.into(),
            time: time.into(),
        }
    }
}

/// A draft that passed validation, with trimmed text and a parsed instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub title: String,
    pub note: String,
    pub due: NaiveDateTime,
}

pub struct ReminderValidation {
    pub max_title_length: usize,
    pub max_note_length: usize,
}

impl Default for ReminderValidation {
    fn default() -> Self {
        Self {
            max_title_length: MAX_TITLE_LENGTH,
            max_note_length: MAX_NOTE_LENGTH,
        }
    }
}

impl ReminderValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate_title(&self, title: &str) -> Result<(), ValidationError> {
        let actual = title.trim().chars().count();
        if actual > self.max_title_length {
            return Err(ValidationError::TitleTooLong {
                max: self.max_title_length,
                actual,
            });
        }
        Ok(())
    }

    pub fn validate_note(&self, note: &str) -> Result<(), ValidationError> {
        let actual = note.trim().chars().count();
        if actual > self.max_note_length {
            return Err(ValidationError::NoteTooLong {
                max: self.max_note_length,
                actual,
            });
        }
        Ok(())
    }

    /// Parse `date` + `time` and require the instant to be strictly after `now`.
    pub fn validate_schedule(
        &self,
        date: &str,
        time: &str,
        now: NaiveDateTime,
    ) -> Result<NaiveDateTime, ValidationError> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| ValidationError::InvalidDateTime)?;
        let time = hhmm::parse(time).ok_or(ValidationError::InvalidDateTime)?;
        let due = date.and_time(time);
        if due <= now {
            return Err(ValidationError::NotInFuture);
        }
        Ok(due)
    }

    pub fn validate(
        &self,
        draft: &ReminderDraft,
        now: NaiveDateTime,
    ) -> Result<ValidatedDraft, ValidationError> {
        let title = draft.title.trim();
        if title.is_empty() || draft.date.trim().is_empty() || draft.time.trim().is_empty() {
            return Err(ValidationError::MissingFields);
        }
        self.validate_title(title)?;
        self.validate_note(&draft.note)?;
        let due = self.validate_schedule(&draft.date, &draft.time, now)?;

        Ok(ValidatedDraft {
            title: title.to_string(),
            note: draft.note.trim().to_string(),
            due,
        })
    }
}

//! Messages exchanged between the controller, tab agents and control
//! surfaces.
//!
//! Every request gets an [`Ack`]; failures travel as `success: false` with a
//! message instead of escaping as errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Reminder, ReminderId, TabId};

/// Controller -> tab agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Directive {
    Show { reminder: Reminder },
    Close,
    Ping,
}

impl Directive {
    const TYPES: &'static [&'static str] = &["show", "close", "ping"];

    pub fn from_value(raw: &Value) -> Result<Self, ProtocolError> {
        decode(raw, Self::TYPES)
    }
}

/// Tab agent / control surface -> controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Command {
    TriggerTest,
    Dismiss {
        reminder_id: ReminderId,
        #[serde(default)]
        is_test: bool,
    },
    Snooze {
        reminder_id: ReminderId,
        /// The record the overlay was showing. The stored copy is what gets
        /// rescheduled; this one is informational.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reminder: Option<Reminder>,
        #[serde(default)]
        is_test: bool,
    },
    ReadyHandshake {
        tab_id: TabId,
    },
}

impl Command {
    const TYPES: &'static [&'static str] =
        &["trigger-test", "dismiss", "snooze", "ready-handshake"];

    pub fn from_value(raw: &Value) -> Result<Self, ProtocolError> {
        decode(raw, Self::TYPES)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::TriggerTest => "trigger-test",
            Command::Dismiss { .. } => "dismiss",
            Command::Snooze { .. } => "snooze",
            Command::ReadyHandshake { .. } => "ready-handshake",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for Ack {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Ack::ok(),
            Err(e) => Ack::failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Message has no type")]
    MissingType,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Malformed {kind} message: {message}")]
    Malformed { kind: String, message: String },
}

fn decode<T: serde::de::DeserializeOwned>(
    raw: &Value,
    known: &[&str],
) -> Result<T, ProtocolError> {
    let kind = raw
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;
    if !known.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_string()));
    }
    serde_json::from_value(raw.clone()).map_err(|e| ProtocolError::Malformed {
        kind: kind.to_string(),
        message: e.to_string(),
    })
}

/// Anything that accepts controller commands.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: Command) -> Ack;
}

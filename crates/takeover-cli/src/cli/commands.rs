use anyhow::Result;
use serde_json::json;
use tracing::debug;

use takeover_core::control::ControlError;
use takeover_core::models::{Reminder, ReminderId};
use takeover_core::store::StoreError;
use takeover_core::validation::ReminderDraft;
use takeover_core::TakeoverRuntime;

use super::protocol::{CliCommand, Response, SitesCommand};

/// Run one command against the runtime's store, alarms and tabs.
pub async fn execute(runtime: &TakeoverRuntime, command: CliCommand) -> Response {
    debug!("Executing {}", command.method());
    let control = runtime.control();

    let outcome: Result<serde_json::Value, ControlError> = match command {
        CliCommand::Add {
            title,
            date,
            time,
            note,
        } => {
            let draft = ReminderDraft::new(title, note, date, time);
            control
                .save_reminder(&draft, None)
                .await
                .map(|saved| json!(saved))
        }
        CliCommand::Edit {
            id,
            title,
            date,
            time,
            note,
        } => {
            let draft = ReminderDraft::new(title, note, date, time);
            control
                .save_reminder(&draft, Some(&ReminderId::new(id)))
                .await
                .map(|saved| json!(saved))
        }
        CliCommand::List => control
            .list_reminders()
            .await
            .map(|reminders| json!({ "reminders": reminders })),
        CliCommand::Delete { id } => {
            let id = ReminderId::new(id);
            match control.delete_reminder(&id).await {
                Ok(true) => Ok(json!({ "deleted": id })),
                Ok(false) => {
                    return Response::error("not_found", &format!("Reminder {} not found", id))
                }
                Err(e) => Err(e),
            }
        }
        CliCommand::Clear => control
            .clear_reminders()
            .await
            .map(|cancelled| json!({ "cleared": true, "alarmsCancelled": cancelled })),
        CliCommand::Sites(SitesCommand::List) => control
            .list_sites()
            .await
            .map(|sites| json!({ "sites": sites })),
        CliCommand::Sites(SitesCommand::Add { site }) => control
            .add_site(&site)
            .await
            .map(|added| json!({ "added": added })),
        CliCommand::Sites(SitesCommand::Remove { site }) => control
            .remove_site(&site)
            .await
            .map(|removed| json!({ "removed": removed })),
        CliCommand::Usage => control.usage().await.map(|usage| json!(usage)),
        CliCommand::Test => {
            let reminder = Reminder::test_at(runtime.clock().now());
            let report = runtime.controller().deliver(&reminder).await;
            let overlays: Vec<_> = runtime
                .browser()
                .visible_overlays()
                .into_iter()
                .map(|(tab, view)| json!({ "tab": tab, "overlay": view }))
                .collect();
            Ok(json!({ "report": report, "overlays": overlays }))
        }
    };

    match outcome {
        Ok(result) => Response::success(result),
        Err(e) => Response::error(error_code(&e), &e.user_message()),
    }
}

fn error_code(error: &ControlError) -> &'static str {
    match error {
        ControlError::Validation(_) | ControlError::Store(StoreError::Validation(_)) => {
            "invalid_input"
        }
        ControlError::Store(StoreError::ReminderNotFound(_)) => "not_found",
        ControlError::Store(StoreError::ReminderLimit(_) | StoreError::WhitelistLimit(_)) => {
            "limit_reached"
        }
        ControlError::Store(StoreError::Storage(_)) => "storage_error",
        ControlError::Timer(_) => "timer_error",
    }
}

/// Results go to stdout, errors to stderr.
pub fn print_response(response: &Response, pretty: bool) -> Result<()> {
    if let Some(ref error) = response.error {
        eprintln!("Error [{}]: {}", error.code, error.message);
        return Ok(());
    }
    if let Some(ref result) = response.result {
        print_json(result, pretty)?;
    }
    Ok(())
}

pub fn print_json(value: &serde_json::Value, pretty: bool) -> Result<()> {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}

//! Control surface operations: what the popup does against the store and
//! alarms directly.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::alarms::AlarmScheduler;
use crate::clock::SharedClock;
use crate::models::{Reminder, ReminderId};
use crate::platform::{StorageUsage, TimerError};
use crate::protocol::{Ack, Command, CommandSink};
use crate::store::{StoreError, TakeoverStore};
use crate::validation::{ReminderDraft, ReminderValidation, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Timer(#[from] TimerError),
}

impl ControlError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ControlError::Validation(e) => e.to_string(),
            ControlError::Store(StoreError::Validation(e)) => e.to_string(),
            ControlError::Store(
                e @ (StoreError::ReminderLimit(_)
                | StoreError::WhitelistLimit(_)
                | StoreError::ReminderNotFound(_)),
            ) => e.to_string(),
            _ => "Failed to save. Please try again.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedReminder {
    pub reminder: Reminder,
    pub alarm_set: bool,
}

pub struct ControlSurface {
    store: Arc<TakeoverStore>,
    alarms: Arc<AlarmScheduler>,
    clock: SharedClock,
    validation: ReminderValidation,
    commands: Option<Arc<dyn CommandSink>>,
}

impl ControlSurface {
    pub fn new(store: Arc<TakeoverStore>, alarms: Arc<AlarmScheduler>, clock: SharedClock) -> Self {
        Self {
            store,
            alarms,
            clock,
            validation: ReminderValidation::default(),
            commands: None,
        }
    }

    pub fn with_commands(mut self, commands: Arc<dyn CommandSink>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Create, or update `editing` in place. Nothing is written unless the
    /// draft validates.
    pub async fn save_reminder(
        &self,
        draft: &ReminderDraft,
        editing: Option<&ReminderId>,
    ) -> Result<SavedReminder, ControlError> {
        let validated = self.validation.validate(draft, self.clock.now())?;
        let reminder = match editing {
            Some(id) => self.store.update_reminder(id, validated).await?,
            None => self.store.create_reminder(validated).await?,
        };

        let alarm_set = self.alarms.arm_reminder(&reminder).await?;
        if !alarm_set {
            warn!("No alarm set for reminder {}", reminder.id);
        }
        info!("Saved reminder {} ({})", reminder.id, reminder.title);
        Ok(SavedReminder {
            reminder,
            alarm_set,
        })
    }

    pub async fn delete_reminder(&self, id: &ReminderId) -> Result<bool, ControlError> {
        let deleted = self.store.delete_reminder(id).await?;
        self.alarms.disarm(id).await?;
        Ok(deleted)
    }

    /// Remove every reminder and every reminder alarm.
    pub async fn clear_reminders(&self) -> Result<usize, ControlError> {
        self.store.delete_all_reminders().await?;
        Ok(self.alarms.clear_all().await?)
    }

    /// Active reminders, soonest first.
    pub async fn list_reminders(&self) -> Result<Vec<Reminder>, ControlError> {
        let mut reminders = self.store.get_reminders().await?;
        reminders.sort_by_key(|reminder| reminder.due_at());
        Ok(reminders)
    }

    pub async fn add_site(&self, raw: &str) -> Result<bool, ControlError> {
        Ok(self.store.add_whitelist_site(raw).await?)
    }

    pub async fn remove_site(&self, site: &str) -> Result<bool, ControlError> {
        Ok(self.store.remove_whitelist_site(site).await?)
    }

    pub async fn list_sites(&self) -> Result<Vec<String>, ControlError> {
        Ok(self.store.get_whitelist().await?)
    }

    pub async fn usage(&self) -> Result<StorageUsage, ControlError> {
        Ok(self.store.storage_usage().await?)
    }

    pub async fn trigger_test(&self) -> Ack {
        match &self.commands {
            Some(commands) => commands.send(Command::TriggerTest).await,
            None => Ack::failed("No controller connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CoreConfig;
    use crate::platform::{MemoryStore, MemoryTimerService, TimerService};
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use parking_lot::Mutex;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 9, 9)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn surface() -> (ControlSurface, Arc<MemoryTimerService>) {
        let config = CoreConfig::new("/tmp");
        let clock = Arc::new(ManualClock::new(now()));
        let store = Arc::new(TakeoverStore::new(
            Arc::new(MemoryStore::default()),
            clock.clone(),
            &config,
        ));
        let timers = Arc::new(MemoryTimerService::new());
        let alarms = Arc::new(AlarmScheduler::new(timers.clone(), clock.clone(), 10));
        (ControlSurface::new(store, alarms, clock), timers)
    }

    fn draft(title: &str, date: &str, time: &str) -> ReminderDraft {
        ReminderDraft::new(title, "", date, time)
    }

    #[tokio::test]
    async fn test_save_arms_alarm_with_lead_time() {
        let (control, timers) = surface();
        let saved = control
            .save_reminder(&draft("Standup", "2030-09-09", "10:00"), None)
            .await
            .unwrap();
        assert!(saved.alarm_set);
        let name = crate::alarms::alarm_name(&saved.reminder.id);
        assert_eq!(timers.scheduled_at(&name), Some(now() + Duration::minutes(50)));
    }

    #[tokio::test]
    async fn test_edit_keeps_id_and_moves_alarm() {
        let (control, timers) = surface();
        let saved = control
            .save_reminder(&draft("Standup", "2030-09-09", "10:00"), None)
            .await
            .unwrap();
        let edited = control
            .save_reminder(
                &draft("Standup moved", "2030-09-09", "11:00"),
                Some(&saved.reminder.id),
            )
            .await
            .unwrap();
        assert_eq!(edited.reminder.id, saved.reminder.id);
        assert_eq!(edited.reminder.display_time(), "11:00");
        assert_eq!(timers.list_all().await.unwrap().len(), 1);
        assert_eq!(
            timers.scheduled_at(&crate::alarms::alarm_name(&saved.reminder.id)),
            Some(now() + Duration::minutes(110))
        );
    }

    #[tokio::test]
    async fn test_invalid_drafts_write_nothing() {
        let (control, timers) = surface();
        let cases = [
            (draft("", "2030-09-09", "10:00"), "Please provide a title, date, and time."),
            (draft("Past", "2030-09-09", "08:00"), "Reminder must be set for a future date and time."),
            (draft("Bad", "2030-13-01", "10:00"), "Invalid date or time format."),
            (draft(&"t".repeat(101), "2030-09-09", "10:00"), "Title must be 100 characters or less."),
        ];
        for (draft, message) in cases {
            let err = control.save_reminder(&draft, None).await.unwrap_err();
            assert_eq!(err.user_message(), message);
        }
        assert!(control.list_reminders().await.unwrap().is_empty());
        assert!(timers.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sorted_and_delete_disarms() {
        let (control, timers) = surface();
        let late = control
            .save_reminder(&draft("Late", "2030-09-10", "09:00"), None)
            .await
            .unwrap();
        let early = control
            .save_reminder(&draft("Early", "2030-09-09", "12:00"), None)
            .await
            .unwrap();
        let titles: Vec<String> = control
            .list_reminders()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["Early", "Late"]);

        assert!(control.delete_reminder(&early.reminder.id).await.unwrap());
        assert_eq!(
            timers.list_all().await.unwrap(),
            vec![crate::alarms::alarm_name(&late.reminder.id)]
        );

        assert_eq!(control.clear_reminders().await.unwrap(), 1);
        assert!(control.list_reminders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_site_operations() {
        let (control, _) = surface();
        assert!(control.add_site("www.Example.org").await.unwrap());
        assert!(control.list_sites().await.unwrap().contains(&"example.org".to_string()));
        assert!(control.remove_site("example.org").await.unwrap());
        let err = control.add_site("???").await.unwrap_err();
        assert_eq!(err.user_message(), "Please enter a valid website (e.g., example.com).");
        assert!(control.usage().await.unwrap().used > 0);
    }

    #[derive(Default)]
    struct CountingSink {
        sent: Mutex<Vec<Command>>,
    }

    #[async_trait]
    impl CommandSink for CountingSink {
        async fn send(&self, command: Command) -> Ack {
            self.sent.lock().push(command);
            Ack::ok()
        }
    }

    #[tokio::test]
    async fn test_trigger_test_goes_through_sink() {
        let (control, _) = surface();
        assert!(!control.trigger_test().await.success);

        let sink = Arc::new(CountingSink::default());
        let control = control.with_commands(sink.clone());
        assert!(control.trigger_test().await.success);
        assert_eq!(*sink.sent.lock(), vec![Command::TriggerTest]);
    }
}

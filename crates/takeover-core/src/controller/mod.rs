//! The takeover controller: resolves fired alarms, fans takeovers out to
//! tabs and handles the commands agents and control surfaces send back.

mod delivery;
pub mod filter;
pub mod readiness;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::alarms::{parse_alarm_name, AlarmScheduler, ReconcileSummary};
use crate::clock::SharedClock;
use crate::config::CoreConfig;
use crate::models::{Reminder, ReminderId};
use crate::platform::{Notifier, TabHost, TimerError};
use crate::protocol::{Ack, Command, CommandSink, Directive};
use crate::store::{StoreError, TakeoverStore};

pub use delivery::{DeliveryReport, FailureKind, TabFailure};
pub use readiness::ReadinessTracker;
pub use retry::{RetryDecision, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error("Reminder with ID {0} not found")]
    ReminderNotFound(ReminderId),

    #[error("Snooze time {0} would be in the past, not rescheduling")]
    SnoozeInPast(NaiveDateTime),
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub handshake_timeout: Duration,
    pub retry: RetryPolicy,
    pub snooze_minutes_before: i64,
}

impl ControllerSettings {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            batch_pause: config.batch_pause(),
            handshake_timeout: config.handshake_timeout(),
            retry: RetryPolicy::from_config(config),
            snooze_minutes_before: config.snooze_minutes_before,
        }
    }
}

pub struct TakeoverController {
    store: Arc<TakeoverStore>,
    alarms: Arc<AlarmScheduler>,
    host: Arc<dyn TabHost>,
    notifier: Arc<dyn Notifier>,
    clock: SharedClock,
    readiness: ReadinessTracker,
    settings: ControllerSettings,
}

impl TakeoverController {
    pub fn new(
        store: Arc<TakeoverStore>,
        alarms: Arc<AlarmScheduler>,
        host: Arc<dyn TabHost>,
        notifier: Arc<dyn Notifier>,
        clock: SharedClock,
        config: &CoreConfig,
    ) -> Self {
        Self {
            store,
            alarms,
            host,
            notifier,
            clock,
            readiness: ReadinessTracker::new(),
            settings: ControllerSettings::from_config(config),
        }
    }

    pub fn readiness(&self) -> &ReadinessTracker {
        &self.readiness
    }

    /// Re-arm alarms for every persisted reminder and drop timers that no
    /// longer have one. Runs on start-up and periodically after that; the
    /// cache is bypassed since other processes may have written the store.
    pub async fn restore_alarms(&self) -> Result<ReconcileSummary, ControllerError> {
        self.store.clear_cache();
        let reminders = self.store.get_reminders().await?;
        let summary = self.alarms.reconcile(&reminders).await?;
        info!(
            "Restored alarms for {} reminders ({} armed, {} cancelled)",
            reminders.len(),
            summary.armed,
            summary.cancelled
        );
        Ok(summary)
    }

    /// Timer entry point. Returns `None` when there was nothing to deliver.
    pub async fn handle_alarm(&self, name: &str) -> Option<DeliveryReport> {
        info!("Alarm fired: {}", name);
        let Some(id) = parse_alarm_name(name) else {
            warn!("Invalid alarm name format: {}", name);
            return None;
        };

        // The reminder may have been deleted or edited by another process
        self.store.clear_cache();
        match self.store.find_reminder(&id).await {
            Ok(Some(reminder)) => Some(self.deliver(&reminder).await),
            Ok(None) => {
                info!("Reminder not found for alarm: {}", id);
                None
            }
            Err(e) => {
                error!("Failed to load reminder {} for alarm: {}", id, e);
                None
            }
        }
    }

    /// Raw message entry point; unknown or malformed messages get a
    /// failure ack.
    pub async fn handle_message(&self, raw: &Value) -> Ack {
        match Command::from_value(raw) {
            Ok(command) => self.handle_command(command).await,
            Err(e) => {
                warn!("Rejected controller message: {}", e);
                Ack::failed(e.to_string())
            }
        }
    }

    pub async fn handle_command(&self, command: Command) -> Ack {
        debug!("Handling {} command", command.kind());
        match command {
            Command::TriggerTest => {
                info!("Received request for test takeover");
                let reminder = Reminder::test_at(self.clock.now());
                self.deliver(&reminder).await;
                Ack::ok()
            }
            Command::Dismiss {
                reminder_id,
                is_test,
            } => {
                info!("Dismissing reminder: {}", reminder_id);
                let result = if is_test {
                    Ok(())
                } else {
                    self.dismiss(&reminder_id).await
                };
                self.broadcast_close().await;
                Ack::from(result)
            }
            Command::Snooze {
                reminder_id,
                is_test,
                ..
            } => {
                info!("Snoozing reminder: {}", reminder_id);
                let result = if is_test {
                    Ok(())
                } else {
                    self.snooze(&reminder_id).await.map(|_| ())
                };
                self.broadcast_close().await;
                Ack::from(result)
            }
            Command::ReadyHandshake { tab_id } => {
                self.readiness.mark_ready(tab_id);
                Ack::ok()
            }
        }
    }

    async fn dismiss(&self, id: &ReminderId) -> Result<(), ControllerError> {
        let store_result = self.store.delete_reminder(id).await;
        let alarm_result = self.alarms.disarm(id).await;
        if let Err(e) = &store_result {
            error!("Failed to delete dismissed reminder {}: {}", id, e);
        }
        store_result?;
        alarm_result?;
        Ok(())
    }

    /// Move the reminder to a fixed offset before its original instant.
    /// Repeated snoozes land on the same instant.
    pub async fn snooze(&self, id: &ReminderId) -> Result<Reminder, ControllerError> {
        let reminder = self
            .store
            .find_reminder(id)
            .await?
            .ok_or_else(|| ControllerError::ReminderNotFound(id.clone()))?;

        let target = reminder.snooze_target(self.settings.snooze_minutes_before);
        if target <= self.clock.now() {
            warn!("Snooze time would be in the past for {}, not rescheduling", id);
            return Err(ControllerError::SnoozeInPast(target));
        }

        let snoozed = reminder.rescheduled(target);
        if let Err(e) = self.store.replace_reminder(&snoozed).await {
            error!("Failed to persist snoozed reminder {}: {}", id, e);
            return Err(e.into());
        }
        // Cancels the old alarm before scheduling the new one
        self.alarms.arm(&snoozed, 0).await?;

        info!(
            "Reminder {} snoozed to {} {}",
            id,
            snoozed.date,
            snoozed.time.format("%H:%M")
        );
        Ok(snoozed)
    }

    /// Send `close` to every tab; tabs without an agent are ignored.
    /// Returns how many agents acknowledged.
    pub async fn broadcast_close(&self) -> usize {
        let tabs = self.host.query_tabs().await;
        let results = join_all(
            tabs.iter()
                .map(|tab| self.host.send_directive(tab.id, Directive::Close)),
        )
        .await;
        let acknowledged = results
            .into_iter()
            .filter(|result| matches!(result, Ok(ack) if ack.success))
            .count();
        debug!("Broadcast close to {} tabs ({} agents)", tabs.len(), acknowledged);
        acknowledged
    }

    /// Serve commands from `requests` until every handle is dropped. Each
    /// command runs on its own task so a handshake is never queued behind
    /// the delivery waiting for it.
    pub async fn serve(self: Arc<Self>, mut requests: CommandReceiver) {
        while let Some(request) = requests.recv().await {
            let controller = self.clone();
            tokio::spawn(async move {
                let ack = controller.handle_command(request.command).await;
                let _ = request.reply.send(ack);
            });
        }
        debug!("Controller command channel closed");
    }
}

pub struct CommandRequest {
    pub command: Command,
    pub reply: oneshot::Sender<Ack>,
}

pub type CommandReceiver = mpsc::UnboundedReceiver<CommandRequest>;

/// Cloneable sender side of the controller's command channel.
#[derive(Clone)]
pub struct ControllerHandle {
    command_tx: mpsc::UnboundedSender<CommandRequest>,
}

impl ControllerHandle {
    pub fn channel() -> (Self, CommandReceiver) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (Self { command_tx }, command_rx)
    }
}

#[async_trait]
impl CommandSink for ControllerHandle {
    async fn send(&self, command: Command) -> Ack {
        let (reply, response) = oneshot::channel();
        if self.command_tx.send(CommandRequest { command, reply }).is_err() {
            return Ack::failed("Controller is not running");
        }
        response
            .await
            .unwrap_or_else(|_| Ack::failed("Controller dropped the request"))
    }
}

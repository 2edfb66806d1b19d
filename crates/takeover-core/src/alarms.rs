//! Reminder alarms on top of a [`TimerService`].
//!
//! One timer per reminder, named `reminder-<id>`. Arming always cancels the
//! previous timer for that id first.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::constants::ALARM_NAME_PREFIX;
use crate::models::{Reminder, ReminderId};
use crate::platform::{TimerError, TimerService};

pub fn alarm_name(id: &ReminderId) -> String {
    format!("{ALARM_NAME_PREFIX}{id}")
}

/// Reminder id encoded in an alarm name. Foreign or malformed names yield
/// `None`.
pub fn parse_alarm_name(name: &str) -> Option<ReminderId> {
    let id = name.strip_prefix(ALARM_NAME_PREFIX)?;
    if id.is_empty() || !ReminderId::is_well_formed(id) {
        return None;
    }
    Some(ReminderId::new(id))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub armed: usize,
    pub cancelled: usize,
}

pub struct AlarmScheduler {
    timers: Arc<dyn TimerService>,
    clock: SharedClock,
    lead_minutes: i64,
}

impl AlarmScheduler {
    pub fn new(timers: Arc<dyn TimerService>, clock: SharedClock, lead_minutes: i64) -> Self {
        Self {
            timers,
            clock,
            lead_minutes,
        }
    }

    /// Arm the alarm `offset_minutes` before the reminder's current due
    /// instant. Returns `false` (and clears any stale alarm) when that
    /// instant is not in the future. Test reminders are never armed.
    pub async fn arm(&self, reminder: &Reminder, offset_minutes: i64) -> Result<bool, TimerError> {
        if reminder.is_test {
            return Ok(false);
        }

        let name = alarm_name(&reminder.id);
        let trigger = reminder.due_at() - Duration::minutes(offset_minutes);
        self.timers.cancel(&name).await?;

        if trigger <= self.clock.now() {
            debug!(
                "Alarm for reminder {} would trigger in the past, not setting",
                reminder.id
            );
            return Ok(false);
        }

        self.timers.schedule(&name, trigger).await?;
        info!("Alarm {} set for {}", name, trigger.format("%Y-%m-%d %H:%M"));
        Ok(true)
    }

    /// Where the alarm for `reminder` belongs: the lead time before the due
    /// instant for fresh reminders, the due instant for snoozed ones, and
    /// the due instant when the lead window already started. `None` once
    /// nothing is left in the future.
    pub fn planned_trigger(&self, reminder: &Reminder) -> Option<NaiveDateTime> {
        if reminder.is_test {
            return None;
        }
        let now = self.clock.now();
        let due = reminder.due_at();
        let lead = if due == reminder.original_due_at() {
            due - Duration::minutes(self.lead_minutes)
        } else {
            due
        };
        [lead, due].into_iter().find(|at| *at > now)
    }

    /// Replace the reminder's alarm with one at [`Self::planned_trigger`].
    pub async fn arm_reminder(&self, reminder: &Reminder) -> Result<bool, TimerError> {
        if reminder.is_test {
            return Ok(false);
        }
        let name = alarm_name(&reminder.id);
        self.timers.cancel(&name).await?;

        let Some(trigger) = self.planned_trigger(reminder) else {
            debug!("Reminder {} is no longer in the future, no alarm", reminder.id);
            return Ok(false);
        };
        self.timers.schedule(&name, trigger).await?;
        info!("Alarm {} set for {}", name, trigger.format("%Y-%m-%d %H:%M"));
        Ok(true)
    }

    pub async fn disarm(&self, id: &ReminderId) -> Result<bool, TimerError> {
        let existed = self.timers.cancel(&alarm_name(id)).await?;
        if existed {
            debug!("Alarm deleted for reminder {}", id);
        } else {
            debug!("No alarm found to delete for reminder {}", id);
        }
        Ok(existed)
    }

    /// Names of all live reminder alarms.
    pub async fn reminder_alarms(&self) -> Result<Vec<String>, TimerError> {
        let mut names: Vec<String> = self
            .timers
            .list_all()
            .await?
            .into_iter()
            .filter(|name| name.starts_with(ALARM_NAME_PREFIX))
            .collect();
        names.sort();
        Ok(names)
    }

    pub async fn clear_all(&self) -> Result<usize, TimerError> {
        let names = self.reminder_alarms().await?;
        for name in &names {
            self.timers.cancel(name).await?;
        }
        info!("Cleared {} reminder alarms", names.len());
        Ok(names.len())
    }

    /// Bring the live alarms in line with the stored reminders: cancel
    /// timers whose reminder is gone and re-arm every reminder whose timer
    /// is missing or set for another instant.
    pub async fn reconcile(&self, reminders: &[Reminder]) -> Result<ReconcileSummary, TimerError> {
        let live: HashSet<String> = self.reminder_alarms().await?.into_iter().collect();
        let wanted: HashSet<String> = reminders
            .iter()
            .filter(|reminder| !reminder.is_test)
            .map(|reminder| alarm_name(&reminder.id))
            .collect();

        let mut summary = ReconcileSummary::default();
        for name in live.difference(&wanted) {
            if self.timers.cancel(name).await? {
                summary.cancelled += 1;
            }
        }
        for reminder in reminders.iter().filter(|reminder| !reminder.is_test) {
            let name = alarm_name(&reminder.id);
            let current = self.timers.trigger_at(&name).await?;
            let planned = self.planned_trigger(reminder);
            if current.is_some() && current == planned {
                continue;
            }
            if current.is_some() {
                debug!("Alarm {} is stale ({:?} != {:?}), re-arming", name, current, planned);
            }
            match self.arm_reminder(reminder).await {
                Ok(true) => summary.armed += 1,
                Ok(false) => {
                    if current.is_some() {
                        summary.cancelled += 1;
                    }
                }
                Err(e) => warn!("Failed to arm alarm for {}: {}", reminder.id, e),
            }
        }

        if summary != ReconcileSummary::default() {
            info!(
                "Reconciled alarms: {} armed, {} cancelled",
                summary.armed, summary.cancelled
            );
        }
        Ok(summary)
    }
}

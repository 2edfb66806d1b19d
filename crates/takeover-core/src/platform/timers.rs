//! Named absolute-time timers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clock::SharedClock;

#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("Timer service unavailable: {0}")]
    Unavailable(String),
}

/// Scheduling an existing name replaces its previous instant.
#[async_trait]
pub trait TimerService: Send + Sync {
    async fn schedule(&self, name: &str, at: NaiveDateTime) -> Result<(), TimerError>;
    /// Returns whether a timer with that name existed.
    async fn cancel(&self, name: &str) -> Result<bool, TimerError>;
    async fn list_all(&self) -> Result<Vec<String>, TimerError>;
    /// Instant the named timer will fire at, if it is live.
    async fn trigger_at(&self, name: &str) -> Result<Option<NaiveDateTime>, TimerError>;
}

struct ArmedTimer {
    at: NaiveDateTime,
    generation: u64,
    task: JoinHandle<()>,
}

/// Timers backed by tokio tasks. Fired names arrive on the receiver handed
/// out by [`TokioTimerService::new`].
pub struct TokioTimerService {
    clock: SharedClock,
    fired_tx: mpsc::UnboundedSender<String>,
    timers: Arc<Mutex<HashMap<String, ArmedTimer>>>,
    next_generation: AtomicU64,
}

impl TokioTimerService {
    pub fn new(clock: SharedClock) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let service = Self {
            clock,
            fired_tx,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        };
        (service, fired_rx)
    }

    pub fn scheduled_at(&self, name: &str) -> Option<NaiveDateTime> {
        self.timers.lock().get(name).map(|timer| timer.at)
    }
}

#[async_trait]
impl TimerService for TokioTimerService {
    async fn schedule(&self, name: &str, at: NaiveDateTime) -> Result<(), TimerError> {
        let delay = (at - self.clock.now()).to_std().unwrap_or_default();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // Held across spawn + insert so a zero-delay task cannot look itself
        // up before it is registered.
        let mut armed = self.timers.lock();

        let timers = self.timers.clone();
        let fired_tx = self.fired_tx.clone();
        let fired_name = name.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = timers.lock();
                match timers.get(&fired_name) {
                    Some(timer) if timer.generation == generation => {
                        timers.remove(&fired_name);
                    }
                    // Superseded while sleeping
                    _ => return,
                }
            }
            let _ = fired_tx.send(fired_name);
        });

        let previous = armed.insert(
            name.to_string(),
            ArmedTimer {
                at,
                generation,
                task,
            },
        );
        drop(armed);
        if let Some(previous) = previous {
            previous.task.abort();
        }
        Ok(())
    }

    async fn cancel(&self, name: &str) -> Result<bool, TimerError> {
        match self.timers.lock().remove(name) {
            Some(timer) => {
                timer.task.abort();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_all(&self) -> Result<Vec<String>, TimerError> {
        let mut names: Vec<String> = self.timers.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn trigger_at(&self, name: &str) -> Result<Option<NaiveDateTime>, TimerError> {
        Ok(self.scheduled_at(name))
    }
}

impl Drop for TokioTimerService {
    fn drop(&mut self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.task.abort();
        }
    }
}

/// Timers that only record their instants; the owner decides when they
/// fire via [`MemoryTimerService::fire_due`].
#[derive(Default)]
pub struct MemoryTimerService {
    timers: Mutex<BTreeMap<String, NaiveDateTime>>,
}

impl MemoryTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled_at(&self, name: &str) -> Option<NaiveDateTime> {
        self.timers.lock().get(name).copied()
    }

    /// Remove and return every timer due at or before `now`, earliest first.
    pub fn fire_due(&self, now: NaiveDateTime) -> Vec<String> {
        let mut timers = self.timers.lock();
        let mut due: Vec<(NaiveDateTime, String)> = timers
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(name, at)| (*at, name.clone()))
            .collect();
        due.sort();
        for (_, name) in &due {
            timers.remove(name);
        }
        due.into_iter().map(|(_, name)| name).collect()
    }
}

#[async_trait]
impl TimerService for MemoryTimerService {
    async fn schedule(&self, name: &str, at: NaiveDateTime) -> Result<(), TimerError> {
        self.timers.lock().insert(name.to_string(), at);
        Ok(())
    }

    async fn cancel(&self, name: &str) -> Result<bool, TimerError> {
        Ok(self.timers.lock().remove(name).is_some())
    }

    async fn list_all(&self) -> Result<Vec<String>, TimerError> {
        Ok(self.timers.lock().keys().cloned().collect())
    }

    async fn trigger_at(&self, name: &str) -> Result<Option<NaiveDateTime>, TimerError> {
        Ok(self.scheduled_at(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_fires_once() {
        let clock = Arc::new(ManualClock::new(start()));
        let (timers, mut fired) = TokioTimerService::new(clock);

        timers
            .schedule("reminder-a", start() + Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(timers.list_all().await.unwrap(), vec!["reminder-a"]);

        tokio::time::sleep(std::time::Duration::from_secs(6)).await;
        assert_eq!(fired.recv().await.as_deref(), Some("reminder-a"));
        assert!(timers.list_all().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_reschedule_supersedes() {
        let clock = Arc::new(ManualClock::new(start()));
        let (timers, mut fired) = TokioTimerService::new(clock);

        timers
            .schedule("reminder-a", start() + Duration::seconds(5))
            .await
            .unwrap();
        timers
            .schedule("reminder-a", start() + Duration::seconds(20))
            .await
            .unwrap();
        assert_eq!(timers.list_all().await.unwrap().len(), 1);

        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert!(fired.try_recv().is_err());

        tokio::time::sleep(std::time::Duration::from_secs(15)).await;
        assert_eq!(fired.recv().await.as_deref(), Some("reminder-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_cancel() {
        let clock = Arc::new(ManualClock::new(start()));
        let (timers, mut fired) = TokioTimerService::new(clock);

        timers
            .schedule("reminder-a", start() + Duration::seconds(5))
            .await
            .unwrap();
        assert!(timers.cancel("reminder-a").await.unwrap());
        assert!(!timers.cancel("reminder-a").await.unwrap());

        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert!(fired.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_memory_timers_fire_due_in_order() {
        let timers = MemoryTimerService::new();
        timers.schedule("b", start() + Duration::minutes(2)).await.unwrap();
        timers.schedule("a", start() + Duration::minutes(1)).await.unwrap();
        timers.schedule("c", start() + Duration::minutes(9)).await.unwrap();

        assert_eq!(timers.fire_due(start() + Duration::minutes(5)), vec!["a", "b"]);
        assert_eq!(timers.list_all().await.unwrap(), vec!["c"]);
    }
}

//! Tracks agent readiness handshakes.
//!
//! Interest is registered before injection starts, so a handshake that
//! arrives before the controller begins waiting still resolves the waiter.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::models::TabId;

#[derive(Default)]
pub struct ReadinessTracker {
    waiters: Mutex<HashMap<TabId, Vec<oneshot::Sender<()>>>>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves when `tab` announces readiness. Dropping the receiver
    /// abandons the wait.
    pub fn register(&self, tab: TabId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock();
        let pending = waiters.entry(tab).or_default();
        pending.retain(|waiter| !waiter.is_closed());
        pending.push(tx);
        rx
    }

    /// Returns how many waiters were released.
    pub fn mark_ready(&self, tab: TabId) -> usize {
        let pending = self.waiters.lock().remove(&tab).unwrap_or_default();
        let released = pending
            .into_iter()
            .filter_map(|waiter| waiter.send(()).ok())
            .count();
        if released == 0 {
            debug!("Handshake from tab {} with nobody waiting", tab);
        }
        released
    }

    /// Drop abandoned waiters for `tab`, and the tab's entry once none
    /// are left. Called when a delivery stops waiting without a handshake.
    pub fn forget(&self, tab: TabId) {
        let mut waiters = self.waiters.lock();
        if let Some(pending) = waiters.get_mut(&tab) {
            pending.retain(|waiter| !waiter.is_closed());
            if pending.is_empty() {
                waiters.remove(&tab);
            }
        }
    }

    /// Tabs that still have an entry, live or abandoned.
    pub fn tracked_tabs(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn pending(&self) -> usize {
        self.waiters
            .lock()
            .values()
            .flat_map(|pending| pending.iter())
            .filter(|waiter| !waiter.is_closed())
            .count()
    }
}

//! In-process read-through cache for the store.
//!
//! Holds the last reminders and whitelist snapshots read from (or written
//! to) the key-value backend. A snapshot is served only while it is younger
//! than the TTL, measured on the injected clock.
//!
//! # Cache invalidation
//! A snapshot is discarded when:
//! - it is older than the TTL
//! - the store is about to write that key (`invalidate_*` runs before the
//!   backend write; the snapshot is repopulated only once the write succeeded)
//! - `invalidate()` is called explicitly

use std::time::Duration;

use chrono::NaiveDateTime;
use parking_lot::Mutex;

use crate::clock::SharedClock;
use crate::models::Reminder;

struct Snapshot<T> {
    value: T,
    stamped_at: NaiveDateTime,
}

#[derive(Default)]
struct CacheState {
    reminders: Option<Snapshot<Vec<Reminder>>>,
    whitelist: Option<Snapshot<Vec<String>>>,
}

pub struct StoreCache {
    ttl: chrono::Duration,
    clock: SharedClock,
    state: Mutex<CacheState>,
}

impl StoreCache {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn is_fresh(&self, stamped_at: NaiveDateTime) -> bool {
        let age = self.clock.now().signed_duration_since(stamped_at);
        age >= chrono::Duration::zero() && age < self.ttl
    }

    pub fn reminders(&self) -> Option<Vec<Reminder>> {
        let state = self.state.lock();
        state
            .reminders
            .as_ref()
            .filter(|snapshot| self.is_fresh(snapshot.stamped_at))
            .map(|snapshot| snapshot.value.clone())
    }

    pub fn whitelist(&self) -> Option<Vec<String>> {
        let state = self.state.lock();
        state
            .whitelist
            .as_ref()
            .filter(|snapshot| self.is_fresh(snapshot.stamped_at))
            .map(|snapshot| snapshot.value.clone())
    }

    pub fn put_reminders(&self, reminders: Vec<Reminder>) {
        let stamped_at = self.clock.now();
        self.state.lock().reminders = Some(Snapshot {
            value: reminders,
            stamped_at,
        });
    }

    pub fn put_whitelist(&self, whitelist: Vec<String>) {
        let stamped_at = self.clock.now();
        self.state.lock().whitelist = Some(Snapshot {
            value: whitelist,
            stamped_at,
        });
    }

    pub fn invalidate_reminders(&self) {
        self.state.lock().reminders = None;
    }

    pub fn invalidate_whitelist(&self) {
        self.state.lock().whitelist = None;
    }

    pub fn invalidate(&self) {
        *self.state.lock() = CacheState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            NaiveDate::from_ymd_opt(2030, 1, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        ))
    }

    #[test]
    fn test_snapshot_expires_after_ttl() {
        let clock = clock();
        let cache = StoreCache::new(Duration::from_secs(300), clock.clone());
        cache.put_whitelist(vec!["zoom.us".into()]);
        assert_eq!(cache.whitelist(), Some(vec!["zoom.us".to_string()]));

        clock.advance(chrono::Duration::seconds(299));
        assert!(cache.whitelist().is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert!(cache.whitelist().is_none());
    }

    #[test]
    fn test_invalidate_clears_both_snapshots() {
        let cache = StoreCache::new(Duration::from_secs(300), clock());
        cache.put_whitelist(vec!["a.com".into()]);
        cache.put_reminders(Vec::new());
        cache.invalidate();
        assert!(cache.whitelist().is_none());
        assert!(cache.reminders().is_none());
    }

    #[test]
    fn test_clock_going_backwards_is_stale() {
        let clock = clock();
        let cache = StoreCache::new(Duration::from_secs(300), clock.clone());
        cache.put_reminders(Vec::new());
        clock.advance(chrono::Duration::seconds(-10));
        assert!(cache.reminders().is_none());
    }
}

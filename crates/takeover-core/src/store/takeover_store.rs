//! Reminder and whitelist persistence on top of a [`KeyValueStore`].
//!
//! Both collections are stored whole under one key each, so concurrent
//! writers resolve last-writer-wins on the full collection.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::CoreConfig;
use crate::constants::{DEFAULT_WHITELIST, REMINDERS_KEY, WHITELIST_KEY};
use crate::models::{normalize_site, Reminder, ReminderId};
use crate::platform::{KeyValueStore, StorageError, StorageUsage};
use crate::validation::{ValidatedDraft, ValidationError};

use super::cache::StoreCache;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Reminder with ID {0} not found")]
    ReminderNotFound(ReminderId),

    #[error("Cannot create more than {0} reminders")]
    ReminderLimit(usize),

    #[error("Cannot add more than {0} whitelisted sites")]
    WhitelistLimit(usize),
}

pub struct TakeoverStore {
    backend: Arc<dyn KeyValueStore>,
    cache: StoreCache,
    clock: SharedClock,
    max_reminders: usize,
    max_whitelist: usize,
}

impl TakeoverStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, clock: SharedClock, config: &CoreConfig) -> Self {
        Self {
            cache: StoreCache::new(config.cache_ttl(), clock.clone()),
            backend,
            clock,
            max_reminders: config.max_reminders,
            max_whitelist: config.max_whitelist,
        }
    }

    // --- REMINDERS ---

    /// Every stored reminder, including ones whose instant already passed.
    /// Records that fail to parse are dropped; the count is returned so the
    /// caller can persist the cleanup.
    async fn load_reminders(&self) -> Result<(Vec<Reminder>, usize), StoreError> {
        if let Some(reminders) = self.cache.reminders() {
            return Ok((reminders, 0));
        }

        let raw = self.backend.get(REMINDERS_KEY).await?;
        let entries = match raw {
            Some(Value::Array(entries)) => entries,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                warn!("Stored reminders are not a list, discarding: {}", other);
                Vec::new()
            }
        };

        let total = entries.len();
        let reminders: Vec<Reminder> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<Reminder>(entry) {
                Ok(reminder) => Some(reminder),
                Err(e) => {
                    debug!("Dropping unparseable reminder: {}", e);
                    None
                }
            })
            .collect();
        let invalid = total - reminders.len();

        self.cache.put_reminders(reminders.clone());
        Ok((reminders, invalid))
    }

    async fn write_reminders(&self, reminders: Vec<Reminder>) -> Result<(), StoreError> {
        self.cache.invalidate_reminders();
        let value = serde_json::to_value(&reminders).map_err(StorageError::from)?;
        self.backend.set(REMINDERS_KEY, value).await?;
        self.cache.put_reminders(reminders);
        Ok(())
    }

    /// Active reminders. Expired or unparseable ones are removed from the
    /// store as a side effect.
    pub async fn get_reminders(&self) -> Result<Vec<Reminder>, StoreError> {
        let (reminders, invalid) = self.load_reminders().await?;
        let now = self.clock.now();
        let total = reminders.len() + invalid;
        let active: Vec<Reminder> = reminders
            .into_iter()
            .filter(|reminder| !reminder.is_expired(now))
            .collect();

        if active.len() != total {
            info!("Cleaned up {} expired reminders", total - active.len());
            if let Err(e) = self.write_reminders(active.clone()).await {
                warn!("Failed to persist expired reminder sweep: {}", e);
            }
        }
        Ok(active)
    }

    /// Lookup without the expiry sweep: an alarm fires at (or just after) a
    /// snoozed reminder's own due instant.
    pub async fn find_reminder(&self, id: &ReminderId) -> Result<Option<Reminder>, StoreError> {
        let (reminders, _) = self.load_reminders().await?;
        Ok(reminders.into_iter().find(|reminder| &reminder.id == id))
    }

    pub async fn create_reminder(&self, draft: ValidatedDraft) -> Result<Reminder, StoreError> {
        let mut reminders = self.get_reminders().await?;
        if reminders.len() >= self.max_reminders {
            return Err(StoreError::ReminderLimit(self.max_reminders));
        }

        let reminder = Reminder::new(ReminderId::generate(), draft.title, draft.note, draft.due);
        reminders.push(reminder.clone());
        self.write_reminders(reminders).await?;
        debug!("Reminder {} created", reminder.id);
        Ok(reminder)
    }

    /// Edit in place. The id is kept and the original instant follows the
    /// newly submitted one.
    pub async fn update_reminder(
        &self,
        id: &ReminderId,
        draft: ValidatedDraft,
    ) -> Result<Reminder, StoreError> {
        let mut reminders = self.get_reminders().await?;
        let existing = reminders
            .iter_mut()
            .find(|reminder| &reminder.id == id)
            .ok_or_else(|| StoreError::ReminderNotFound(id.clone()))?;

        let mut updated = Reminder::new(id.clone(), draft.title, draft.note, draft.due);
        updated.is_test = existing.is_test;
        *existing = updated.clone();

        self.write_reminders(reminders).await?;
        Ok(updated)
    }

    /// Overwrite the stored record with the same id (snooze).
    pub async fn replace_reminder(&self, reminder: &Reminder) -> Result<(), StoreError> {
        let (mut reminders, _) = self.load_reminders().await?;
        let slot = reminders
            .iter_mut()
            .find(|stored| stored.id == reminder.id)
            .ok_or_else(|| StoreError::ReminderNotFound(reminder.id.clone()))?;
        *slot = reminder.clone();
        self.write_reminders(reminders).await
    }

    pub async fn delete_reminder(&self, id: &ReminderId) -> Result<bool, StoreError> {
        let (mut reminders, _) = self.load_reminders().await?;
        let original_len = reminders.len();
        reminders.retain(|reminder| &reminder.id != id);

        if reminders.len() == original_len {
            warn!("Reminder with ID {} not found for deletion", id);
            return Ok(false);
        }

        self.write_reminders(reminders).await?;
        info!("Reminder {} deleted", id);
        Ok(true)
    }

    pub async fn delete_all_reminders(&self) -> Result<(), StoreError> {
        self.write_reminders(Vec::new()).await
    }

    // --- WHITELIST ---

    /// Seeds the default list the first time the key is read.
    pub async fn get_whitelist(&self) -> Result<Vec<String>, StoreError> {
        if let Some(whitelist) = self.cache.whitelist() {
            return Ok(whitelist);
        }

        let whitelist = match self.backend.get(WHITELIST_KEY).await? {
            None => {
                let defaults: Vec<String> =
                    DEFAULT_WHITELIST.iter().map(|site| site.to_string()).collect();
                info!("Seeding whitelist with {} default sites", defaults.len());
                self.write_whitelist(defaults.clone()).await?;
                defaults
            }
            Some(value) => serde_json::from_value(value).map_err(StorageError::from)?,
        };

        self.cache.put_whitelist(whitelist.clone());
        Ok(whitelist)
    }

    async fn write_whitelist(&self, whitelist: Vec<String>) -> Result<(), StoreError> {
        self.cache.invalidate_whitelist();
        let value = serde_json::to_value(&whitelist).map_err(StorageError::from)?;
        self.backend.set(WHITELIST_KEY, value).await?;
        self.cache.put_whitelist(whitelist);
        Ok(())
    }

    /// Returns `false` when the normalized site was already present.
    pub async fn add_whitelist_site(&self, raw: &str) -> Result<bool, StoreError> {
        let site = normalize_site(raw)?;
        let mut whitelist = self.get_whitelist().await?;

        if whitelist.contains(&site) {
            return Ok(false);
        }
        if whitelist.len() >= self.max_whitelist {
            return Err(StoreError::WhitelistLimit(self.max_whitelist));
        }

        whitelist.push(site.clone());
        self.write_whitelist(whitelist).await?;
        info!("Added {} to whitelist", site);
        Ok(true)
    }

    pub async fn remove_whitelist_site(&self, site: &str) -> Result<bool, StoreError> {
        let site = site.trim();
        let normalized = normalize_site(site).ok();
        let mut whitelist = self.get_whitelist().await?;
        let original_len = whitelist.len();
        whitelist.retain(|entry| entry != site && Some(entry) != normalized.as_ref());

        if whitelist.len() == original_len {
            warn!("Site {} not found in whitelist", site);
            return Ok(false);
        }

        self.write_whitelist(whitelist).await?;
        info!("Removed {} from whitelist", site);
        Ok(true)
    }

    // --- UTILITY ---

    pub fn clear_cache(&self) {
        self.cache.invalidate();
        debug!("Storage cache cleared");
    }

    pub async fn storage_usage(&self) -> Result<StorageUsage, StoreError> {
        Ok(self.backend.usage().await?)
    }
}

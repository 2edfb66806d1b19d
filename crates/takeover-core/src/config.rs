use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    BATCH_PAUSE_MS, CACHE_TTL_SECS, CLOSE_ANIMATION_MS, DEFAULT_LEAD_MINUTES,
    HANDSHAKE_TIMEOUT_MS, INJECTION_BATCH_SIZE, MAX_DELIVERY_RETRIES, MAX_REMINDERS,
    MAX_WHITELIST_SITES, RETRY_DELAY_MS, SAFETY_CHECK_MS, SNOOZE_MINUTES_BEFORE,
    SNOOZE_TOLERANCE_SECS, STORAGE_QUOTA_BYTES,
};

/// Tunables for the store, the delivery pipeline and the tab agent.
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub lead_minutes: i64,
    pub snooze_minutes_before: i64,
    pub snooze_tolerance_secs: i64,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub handshake_timeout_ms: u64,
    pub max_delivery_retries: u32,
    pub retry_delay_ms: u64,
    pub cache_ttl_secs: u64,
    pub close_animation_ms: u64,
    pub safety_check_ms: u64,
    pub max_reminders: usize,
    pub max_whitelist: usize,
    pub storage_quota_bytes: u64,
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            lead_minutes: DEFAULT_LEAD_MINUTES,
            snooze_minutes_before: SNOOZE_MINUTES_BEFORE,
            snooze_tolerance_secs: SNOOZE_TOLERANCE_SECS,
            batch_size: INJECTION_BATCH_SIZE,
            batch_pause_ms: BATCH_PAUSE_MS,
            handshake_timeout_ms: HANDSHAKE_TIMEOUT_MS,
            max_delivery_retries: MAX_DELIVERY_RETRIES,
            retry_delay_ms: RETRY_DELAY_MS,
            cache_ttl_secs: CACHE_TTL_SECS,
            close_animation_ms: CLOSE_ANIMATION_MS,
            safety_check_ms: SAFETY_CHECK_MS,
            max_reminders: MAX_REMINDERS,
            max_whitelist: MAX_WHITELIST_SITES,
            storage_quota_bytes: STORAGE_QUOTA_BYTES,
        }
    }

    /// Per-user data directory, e.g. `~/.local/share/takeover`.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("takeover")
    }

    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Path of the file-backed key-value store inside `data_dir`.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("storage.json")
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn close_animation(&self) -> Duration {
        Duration::from_millis(self.close_animation_ms)
    }

    pub fn safety_check_interval(&self) -> Duration {
        Duration::from_millis(self.safety_check_ms)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new(Self::default_data_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_minimal() {
        let config: CoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.lead_minutes, 10);
        assert_eq!(config.snooze_minutes_before, 2);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_whitelist, 50);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_parse_config_overrides() {
        let json = r#"{"dataDir": "/tmp/takeover", "leadMinutes": 15, "batchSize": 3}"#;
        let config: CoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/takeover"));
        assert_eq!(config.lead_minutes, 15);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.max_delivery_retries, 3);
        assert_eq!(config.store_path(), PathBuf::from("/tmp/takeover/storage.json"));
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = CoreConfig::load(Path::new("/nonexistent/takeover.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/takeover.json"));
    }
}

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use takeover_core::{CoreConfig, TabSpec};

/// CLI configuration that can be loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Store, timing and delivery tunables
    #[serde(default)]
    pub core: CoreConfig,

    /// Virtual tabs opened in the in-process browser for `run` and `test`
    #[serde(default = "default_tabs")]
    pub tabs: Vec<TabSpec>,
}

fn default_tabs() -> Vec<TabSpec> {
    vec![
        TabSpec::new("https://example.com/"),
        TabSpec::new("https://news.ycombinator.com/"),
        TabSpec::new("https://meet.google.com/abc-defg-hij"),
    ]
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            tabs: default_tabs(),
        }
    }
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize config")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize config")
    }
}

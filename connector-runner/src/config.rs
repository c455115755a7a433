//! Runner configuration: the shared pipeline sections plus the destination
//! and one optional section per connector.
//!
//! ```toml
//! interval_secs = 300
//!
//! [retry]
//! max_retries = 5
//!
//! [checkpoint]
//! path = "./state/graphline-state.json.gz"
//!
//! [destination]
//! url = "http://localhost:3000"
//!
//! [circleci]
//! token = "..."
//! ```

use crate::connectors::circleci::config::CircleCiConfig;
use crate::connectors::testrails::config::TestRailsConfig;
use anyhow::Result;
use graphline::config::{load_config, SyncConfig};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    #[serde(flatten)]
    pub sync: SyncConfig,
    /// Seconds between runs for connectors without their own interval
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub circleci: Option<CircleCiConfig>,
    #[serde(default)]
    pub testrails: Option<TestRailsConfig>,
}

fn default_interval_secs() -> u64 {
    300
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            interval_secs: default_interval_secs(),
            destination: DestinationConfig::default(),
            circleci: None,
            testrails: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    #[serde(default = "default_destination_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_destination_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_destination_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_destination_timeout_secs() -> u64 {
    60
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            url: default_destination_url(),
            api_key: None,
            timeout_secs: default_destination_timeout_secs(),
        }
    }
}

impl RunnerConfig {
    /// Loads the config file and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config: RunnerConfig = load_config(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.sync.apply_overrides(&lookup);
        if let Some(url) = lookup("GRAPHLINE_DESTINATION_URL") {
            if !url.is_empty() {
                self.destination.url = url;
            }
        }
        if let Some(key) = lookup("GRAPHLINE_DESTINATION_API_KEY") {
            self.destination.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(v) = lookup("GRAPHLINE_INTERVAL_SECS") {
            match v.parse::<u64>() {
                Ok(secs) if secs > 0 => self.interval_secs = secs,
                _ => warn!(value = %v, "Ignoring invalid GRAPHLINE_INTERVAL_SECS"),
            }
        }
    }
}

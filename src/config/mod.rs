use crate::fetch::{BackoffPolicy, RetryConfig, StatusClassifier, DEFAULT_TRANSIENT_STATUS_CODES};
use crate::reader::SyncMode;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Pipeline configuration shared by every connector.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub reader: ReaderSettings,
    #[serde(default)]
    pub checkpoint: CheckpointSettings,
    #[serde(default)]
    pub converter: ConverterSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    #[default]
    Exponential,
}

/// Retry configuration for upstream fetches
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Fixed delay, or first delay of the exponential schedule
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// HTTP statuses retried as transient; anything else is fatal
    #[serde(default = "default_transient_status_codes")]
    pub transient_status_codes: Vec<u16>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_transient_status_codes() -> Vec<u16> {
    DEFAULT_TRANSIENT_STATUS_CODES.to_vec()
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff: BackoffKind::default(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            transient_status_codes: default_transient_status_codes(),
        }
    }
}

impl RetrySettings {
    pub fn retry_config(&self) -> RetryConfig {
        let initial = Duration::from_millis(self.initial_delay_ms);
        let backoff = match self.backoff {
            BackoffKind::Fixed => BackoffPolicy::Fixed { delay: initial },
            BackoffKind::Exponential => BackoffPolicy::Exponential {
                initial,
                max: Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms)),
                multiplier: self.multiplier.max(1.0),
            },
        };
        RetryConfig {
            max_retries: self.max_retries,
            backoff,
        }
    }

    pub fn classifier(&self) -> StatusClassifier {
        StatusClassifier::new(self.transient_status_codes.iter().copied())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaderSettings {
    #[serde(default)]
    pub mode: SyncMode,
    /// Lower bound for the first incremental run of a stream
    #[serde(default)]
    pub start_cutoff_days: Option<u32>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    100
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            start_cutoff_days: None,
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointSettings {
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
    /// Commit partial progress of failed runs
    #[serde(default = "default_persist_on_failure")]
    pub persist_on_failure: bool,
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("./state/graphline-state.json.gz")
}

fn default_persist_on_failure() -> bool {
    true
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            path: default_checkpoint_path(),
            persist_on_failure: default_persist_on_failure(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConverterSettings {
    #[serde(default)]
    pub skip_malformed: bool,
}

impl SyncConfig {
    /// Applies `GRAPHLINE_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup. Unparseable values are
    /// logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("GRAPHLINE_MAX_RETRIES") {
            match v.parse::<u32>() {
                Ok(n) => self.retry.max_retries = n,
                Err(_) => warn!(value = %v, "Ignoring invalid GRAPHLINE_MAX_RETRIES"),
            }
        }
        if let Some(v) = lookup("GRAPHLINE_SYNC_MODE") {
            match v.as_str() {
                "full_refresh" => self.reader.mode = SyncMode::FullRefresh,
                "incremental" => self.reader.mode = SyncMode::Incremental,
                _ => warn!(value = %v, "Ignoring invalid GRAPHLINE_SYNC_MODE"),
            }
        }
        if let Some(v) = lookup("GRAPHLINE_CHECKPOINT_PATH") {
            if !v.is_empty() {
                self.checkpoint.path = PathBuf::from(v);
            }
        }
    }
}

/// Loads a TOML configuration file.
pub fn load_config<T>(path: impl AsRef<Path>) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff, BackoffKind::Exponential);
        assert_eq!(config.retry.transient_status_codes, vec![408, 429, 500, 502, 503, 504]);
        assert_eq!(config.reader.mode, SyncMode::Incremental);
        assert_eq!(config.reader.page_size, 100);
        assert!(config.checkpoint.persist_on_failure);
        assert!(!config.converter.skip_malformed);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [retry]
            max_retries = 5
            backoff = "fixed"
            initial_delay_ms = 250
            transient_status_codes = [429, 503]

            [reader]
            mode = "full_refresh"
            start_cutoff_days = 90
            page_size = 250

            [checkpoint]
            path = "/tmp/state.json"
            persist_on_failure = false

            [converter]
            skip_malformed = true
        "#;

        let config: SyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.reader.mode, SyncMode::FullRefresh);
        assert_eq!(config.reader.start_cutoff_days, Some(90));
        assert_eq!(config.checkpoint.path, PathBuf::from("/tmp/state.json"));
        assert!(!config.checkpoint.persist_on_failure);
        assert!(config.converter.skip_malformed);

        let retry = config.retry.retry_config();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(
            retry.backoff,
            BackoffPolicy::Fixed {
                delay: Duration::from_millis(250)
            }
        );

        let classifier = config.retry.classifier();
        assert!(classifier.is_transient(429));
        assert!(!classifier.is_transient(500));
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [retry]
            multiplier = 3.0
        "#;

        let config: SyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(
            config.retry.retry_config().backoff,
            BackoffPolicy::Exponential {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(60),
                multiplier: 3.0,
            }
        );
        assert_eq!(config.reader.page_size, 100);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GRAPHLINE_MAX_RETRIES", "0"),
            ("GRAPHLINE_SYNC_MODE", "full_refresh"),
            ("GRAPHLINE_CHECKPOINT_PATH", "/var/lib/graphline/state.json.gz"),
        ]);

        let mut config = SyncConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.reader.mode, SyncMode::FullRefresh);
        assert_eq!(
            config.checkpoint.path,
            PathBuf::from("/var/lib/graphline/state.json.gz")
        );
    }

    #[test]
    fn test_invalid_env_overrides_are_ignored() {
        let mut config = SyncConfig::default();
        config.apply_overrides(|key| match key {
            "GRAPHLINE_MAX_RETRIES" => Some("many".to_string()),
            "GRAPHLINE_SYNC_MODE" => Some("sometimes".to_string()),
            _ => None,
        });

        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.reader.mode, SyncMode::Incremental);
    }

    #[test]
    fn test_load_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphline.toml");

        let err = load_config::<SyncConfig>(&path).unwrap_err();
        assert!(err.to_string().contains("graphline.toml"));

        std::fs::write(&path, "[reader]\npage_size = 10\n").unwrap();
        let config: SyncConfig = load_config(&path).unwrap();
        assert_eq!(config.reader.page_size, 10);
    }
}

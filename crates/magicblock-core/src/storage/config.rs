//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Initial focus session length and tick/persistence cadence
//! - The interception policy and seed block list
//! - Leitner scheduler cycle and box periods
//! - Content host and the default dataset
//! - Pending-question cache and client retry window
//!
//! Configuration is stored at `<data dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;

/// When a navigation to a blocked domain is intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterceptPolicy {
    /// Intercept every blocked navigation regardless of timer state.
    #[default]
    Always,
    /// Intercept blocked navigations only while the focus timer is running.
    WhileRunning,
}

/// Focus session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_duration_min")]
    pub duration_min: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_persist_interval_ms")]
    pub persist_interval_ms: u64,
}

/// Domain gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub intercept: InterceptPolicy,
    #[serde(default = "default_domains")]
    pub default_domains: Vec<String>,
}

/// Leitner scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    #[serde(default = "default_cycle_length")]
    pub cycle_length: u32,
    #[serde(default = "default_box2_period")]
    pub box2_period: u32,
    #[serde(default = "default_box3_period")]
    pub box3_period: u32,
    /// Fixed RNG seed. Random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Remote content configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_dataset")]
    pub default_dataset: String,
    #[serde(default = "default_true")]
    pub auto_import_default: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Pending-question cache and client polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionConfig {
    #[serde(default = "default_pending_ttl_ms")]
    pub pending_ttl_ms: u64,
    #[serde(default = "default_ready_ttl_ms")]
    pub ready_ttl_ms: u64,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_retry_max_wait_ms")]
    pub retry_max_wait_ms: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub question: QuestionConfig,
}

// Default functions
fn default_duration_min() -> u64 {
    25
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_persist_interval_ms() -> u64 {
    10_000
}
fn default_domains() -> Vec<String> {
    vec![
        "youtube.com".into(),
        "twitter.com".into(),
        "instagram.com".into(),
    ]
}
fn default_cycle_length() -> u32 {
    7
}
fn default_box2_period() -> u32 {
    2
}
fn default_box3_period() -> u32 {
    3
}
fn default_base_url() -> String {
    "https://raw.githubusercontent.com".into()
}
fn default_dataset() -> String {
    "buxr.data.master".into()
}
fn default_true() -> bool {
    true
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_pending_ttl_ms() -> u64 {
    5000
}
fn default_ready_ttl_ms() -> u64 {
    60_000
}
fn default_retry_interval_ms() -> u64 {
    1000
}
fn default_retry_max_wait_ms() -> u64 {
    5000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_min: default_duration_min(),
            tick_interval_ms: default_tick_interval_ms(),
            persist_interval_ms: default_persist_interval_ms(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            intercept: InterceptPolicy::default(),
            default_domains: default_domains(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_length: default_cycle_length(),
            box2_period: default_box2_period(),
            box3_period: default_box3_period(),
            seed: None,
        }
    }
}

impl SchedulerConfig {
    /// Check that the periods fall inside the counter's range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.cycle_length".into(),
                message: "must be at least 1".into(),
            });
        }
        for (key, period) in [
            ("scheduler.box2_period", self.box2_period),
            ("scheduler.box3_period", self.box3_period),
        ] {
            if period == 0 || period > self.cycle_length {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: format!("must be within 1..={}", self.cycle_length),
                });
            }
        }
        Ok(())
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_dataset: default_dataset(),
            auto_import_default: true,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for QuestionConfig {
    fn default() -> Self {
        Self {
            pending_ttl_ms: default_pending_ttl_ms(),
            ready_ttl_ms: default_ready_ttl_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            retry_max_wait_ms: default_retry_max_wait_ms(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    serde_json::Value::Null => match value.parse::<u64>() {
                        Ok(n) => serde_json::Value::Number(n.into()),
                        Err(_) if value == "none" || value.is_empty() => serde_json::Value::Null,
                        Err(_) => serde_json::Value::String(value.into()),
                    },
                    serde_json::Value::String(_) => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: e.to_string(),
            })
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation, or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config =
                    toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if self.session.duration_min == 0 {
            return Err(ConfigError::InvalidValue {
                key: "session.duration_min".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key and save. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// the result fails validation, or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Set a config value by key in memory only.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default configuration");
            Self::default()
        })
    }
}

//! Planner configuration: TOML file first, `ROTA_*` environment variables on top.

use std::{path::Path, time::Duration};

use chrono::FixedOffset;
use domain::models::rota::Permission;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use super::week_stats::DEFAULT_OVERTIME_THRESHOLD_HOURS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Deserialize)]
pub struct PlannerConfig {
    /// Base URL of the rota API; `/api/v1/...` is appended
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token sent with every request
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_token: Option<SecretString>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Automatic refetches inside this window after a successful fetch are skipped
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries for reads only; writes are never retried
    #[serde(default = "default_read_retries")]
    pub read_retries: usize,

    #[serde(default = "default_overtime_threshold_hours")]
    pub overtime_threshold_hours: f64,

    /// Offset of the location's wall clock; drop targets are dates in this offset
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default = "default_permissions")]
    pub permissions: Vec<Permission>,
}

fn default_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_dedup_window_ms() -> u64 {
    2_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_read_retries() -> usize {
    3
}

fn default_overtime_threshold_hours() -> f64 {
    DEFAULT_OVERTIME_THRESHOLD_HOURS
}

fn default_permissions() -> Vec<Permission> {
    vec![Permission::RotaPublish, Permission::RotaLock]
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_token: None,
            poll_interval_secs: default_poll_interval_secs(),
            dedup_window_ms: default_dedup_window_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            read_retries: default_read_retries(),
            overtime_threshold_hours: default_overtime_threshold_hours(),
            utc_offset_minutes: 0,
            permissions: default_permissions(),
        }
    }
}

impl PlannerConfig {
    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.utc_offset()?;
        Ok(config)
    }

    /// Apply `ROTA_*` overrides from `lookup`
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("ROTA_API_URL") {
            self.api_url = url;
        }
        if let Some(token) = lookup("ROTA_API_TOKEN") {
            self.api_token = Some(SecretString::from(token));
        }
        if let Some(v) = lookup("ROTA_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_value("ROTA_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("ROTA_DEDUP_WINDOW_MS") {
            self.dedup_window_ms = parse_value("ROTA_DEDUP_WINDOW_MS", &v)?;
        }
        if let Some(v) = lookup("ROTA_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_value("ROTA_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("ROTA_READ_RETRIES") {
            self.read_retries = parse_value("ROTA_READ_RETRIES", &v)?;
        }
        if let Some(v) = lookup("ROTA_OVERTIME_THRESHOLD_HOURS") {
            self.overtime_threshold_hours = parse_value("ROTA_OVERTIME_THRESHOLD_HOURS", &v)?;
        }
        if let Some(v) = lookup("ROTA_UTC_OFFSET_MINUTES") {
            self.utc_offset_minutes = parse_value("ROTA_UTC_OFFSET_MINUTES", &v)?;
        }
        if let Some(v) = lookup("ROTA_PERMISSIONS") {
            self.permissions = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| parse_value("ROTA_PERMISSIONS", p))
                .collect::<Result<_, _>>()?;
        }
        self.utc_offset()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or(ConfigError::InvalidValue {
            key: "utc_offset_minutes",
            value: self.utc_offset_minutes.to_string(),
        })
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

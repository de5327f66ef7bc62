//! ESI processing configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::serde_duration;

/// Output format for diagnostic lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    /// JSON lines (for production/log aggregation).
    #[default]
    Json,
    /// Human-readable lines (for development).
    Human,
}

/// Minimum level for diagnostic lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevelSetting {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Configuration for ESI tag parsing and resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsiConfig {
    /// Timeout used when a tag does not declare one.
    #[serde(default = "default_timeout", with = "serde_duration")]
    pub default_timeout: Duration,

    /// Upper bound applied to every tag timeout.
    #[serde(default, with = "serde_duration::option", skip_serializing_if = "Option::is_none")]
    pub max_timeout: Option<Duration>,

    /// Shared deadline for one resolution call, counted from its start.
    #[serde(default, with = "serde_duration::option", skip_serializing_if = "Option::is_none")]
    pub batch_deadline: Option<Duration>,

    /// Diagnostic line format.
    #[serde(default)]
    pub log_format: LogFormatSetting,

    /// Minimum diagnostic level.
    #[serde(default)]
    pub log_level: LogLevelSetting,
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

impl Default for EsiConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            max_timeout: None,
            batch_deadline: None,
            log_format: LogFormatSetting::default(),
            log_level: LogLevelSetting::default(),
        }
    }
}

impl EsiConfig {
    /// Load config from a file. `.json` files are read as JSON, anything
    /// else as TOML.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Set the default timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the timeout ceiling.
    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = Some(timeout);
        self
    }

    /// Set the per-call deadline.
    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = Some(deadline);
        self
    }
}

//! Auto-save configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AutosaveError, Result};

/// Configuration for auto-save behavior.
///
/// Loaded from an `autosave.toml` file; missing keys fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Whether the recurring timer saves.
    ///
    /// Navigation, unload, manual flushes and teardown still save when
    /// this is off.
    pub enabled: bool,

    /// Interval between timer checks, in milliseconds.
    ///
    /// A dirty document is saved on the first tick after the change.
    pub interval_ms: u64,

    /// Save immediately when an in-app navigation starts.
    pub flush_on_navigation: bool,

    /// Save immediately when the page or process is about to be discarded.
    pub flush_on_unload: bool,

    /// What to do when a save request fails.
    pub retry: RetryPolicy,
}

/// Bounded retry for failed save requests.
///
/// Retries happen inside the dispatched save; the dirty flag is never
/// re-raised for a failed save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure. Zero disables retry.
    pub max_retries: u32,

    /// Delay between attempts, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    #[inline]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Total attempts a single dispatch may make.
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 60_000, // 1 minute
            flush_on_navigation: true,
            flush_on_unload: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl AutoSaveConfig {
    /// Create a config whose timer never saves.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Check the config for values the coordinator cannot run with.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.interval_ms == 0 {
            return Err("interval_ms must be greater than zero".into());
        }
        Ok(())
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, String> {
        let config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| AutosaveError::Io {
            operation: "read",
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|reason| AutosaveError::Config {
            path: path.to_path_buf(),
            source: reason.into(),
        })
    }

    pub fn to_toml_string(&self) -> String {
        // Plain structs of scalars always serialize.
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

//! Configuration structures for treewatch.
//!
//! - [`WatchConfig`] - Watcher settings (exclusions, recursion, timings)
//! - [`Config`] - Root configuration, loadable from a JSON file
//!
//! All configuration types implement [`Default`] and deserialize with
//! missing fields filled from those defaults.

use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for the directory watcher.
///
/// # Examples
///
/// ```
/// use tw_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert!(config.recursive);
/// assert_eq!(config.startup_grace_ms, 500);
/// assert!(config.exclude.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Glob patterns for paths that are never watched nor reported.
    ///
    /// Patterns are matched against the absolute path of each candidate.
    pub exclude: Vec<String>,

    /// Whether added directories are watched recursively by default.
    pub recursive: bool,

    /// Grace period after startup before the watcher is handed to the caller.
    pub startup_grace_ms: u64,

    /// Delay before the watch agent is restarted after a fatal backend error.
    pub restart_backoff_ms: u64,

    /// Capacity of the command channel feeding the watch agent.
    pub command_capacity: usize,
}

impl WatchConfig {
    /// Returns the startup grace period as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    /// Returns the restart backoff as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    /// Checks option values that deserialization alone cannot reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_capacity == 0 {
            return Err(ConfigError::InvalidOption {
                option: "command_capacity".to_owned(),
                reason: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            recursive: true,
            startup_grace_ms: 500,
            restart_backoff_ms: 1000,
            command_capacity: 64,
        }
    }
}

/// Root configuration for treewatch.
///
/// # Examples
///
/// ```
/// use tw_core::Config;
///
/// let config: Config = serde_json::from_str(r#"{"watch": {"exclude": ["/srv/*/target"]}}"#).unwrap();
/// assert_eq!(config.watch.exclude, vec!["/srv/*/target"]);
/// assert!(config.watch.recursive);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watcher configuration.
    pub watch: WatchConfig,
}

impl Config {
    /// Loads and validates a configuration from a JSON file.
    pub fn from_path(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.watch.validate()
    }
}

//! Configuration types for linkmeta
//!
//! The daemon reads an optional TOML configuration file; command-line flags
//! take precedence over file values. Defaults here match the CLI defaults.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the metadata daemon
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub neighbor: NeighborConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MetadataConfig {
    /// Addresses to serve metadata on, `HOST:PORT`. Clients conventionally
    /// reach the service at `169.254.169.254:80`.
    #[serde(default)]
    pub bind_addrs: Vec<String>,
}

/// Backing store configuration
#[derive(Clone, Debug, Deserialize)]
pub struct StoreConfig {
    /// Store kind; `dir` is the only supported value.
    #[serde(default = "default_store_kind")]
    pub kind: String,
    /// Directories holding metadata documents.
    #[serde(default)]
    pub dirs: Vec<PathBuf>,
    /// Bounded size of the parsed-document cache.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            dirs: Vec::new(),
            cache_size: default_cache_size(),
        }
    }
}

/// Neighbor-table refresh configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NeighborConfig {
    /// Background refresh interval in milliseconds; clamped to >= 1.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

impl NeighborConfig {
    /// The refresh interval with the 1ms floor applied.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_store_kind() -> String {
    "dir".to_string()
}

fn default_cache_size() -> usize {
    128
}

fn default_refresh_interval_ms() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.kind, "dir");
        assert_eq!(config.store.cache_size, 128);
        assert_eq!(config.neighbor.refresh_interval_ms, 1);
        assert_eq!(config.logging.level, "info");
        assert!(config.metadata.bind_addrs.is_empty());
    }

    #[test]
    fn test_refresh_interval_floor() {
        let neighbor = NeighborConfig {
            refresh_interval_ms: 0,
        };
        assert_eq!(neighbor.refresh_interval(), Duration::from_millis(1));
    }
}

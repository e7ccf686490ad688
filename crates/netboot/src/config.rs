//! Configuration file handling for netboot

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use netboot_update::{RetryConfig, UpdateConfig};
use netboot_xcp::transport::DEFAULT_CONNECT_TIMEOUT;
use netboot_xcp::{ConnectionTarget, XcpTimeouts};
use serde::{Deserialize, Serialize};

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

/// TCP connection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Configuration for the CLI tool
///
/// ```toml
/// no_color = false
///
/// [transport]
/// connect_timeout_ms = 5000
///
/// [retry]
/// connect_delay_ms = 20
///
/// [timeouts]
/// erase_ms = 30000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: XcpTimeouts,
    /// Disable colored output
    pub no_color: Option<bool>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("netboot");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(&self, host: &str, port: u16, no_color: bool) -> MergedConfig {
        MergedConfig {
            update: UpdateConfig::new(ConnectionTarget::new(host, port))
                .with_retry(self.retry)
                .with_timeouts(self.timeouts),
            connect_timeout: Duration::from_millis(self.transport.connect_timeout_ms),
            no_color: no_color || self.no_color.unwrap_or(false),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub update: UpdateConfig,
    pub connect_timeout: Duration,
    pub no_color: bool,
}

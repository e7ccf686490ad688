//! Update session configuration

use std::time::Duration;

use netboot_xcp::{ConnectionTarget, XcpTimeouts};
use serde::{Deserialize, Serialize};

fn default_connect_delay_ms() -> u64 {
    20
}

/// Connect retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Pause between CONNECT attempts while waiting for the bootloader
    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            connect_delay_ms: default_connect_delay_ms(),
        }
    }
}

/// Everything an [`Updater`](crate::Updater) needs besides its collaborators
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub target: ConnectionTarget,
    pub retry: RetryConfig,
    pub timeouts: XcpTimeouts,
}

impl UpdateConfig {
    pub fn new(target: ConnectionTarget) -> Self {
        Self {
            target,
            retry: RetryConfig::default(),
            timeouts: XcpTimeouts::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, timeouts: XcpTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry.connect_delay_ms)
    }
}

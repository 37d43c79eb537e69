//! Connection pool configuration.

use crate::socket::ratelimit::Bandwidth;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool sizing and spare-connection policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Spares (dialing + ready) kept warm at all times
    pub min_spares: usize,
    /// Upper bound on spares (dialing + ready); claimed connections don't count
    pub max_spares: usize,
    /// Ready spares idle longer than this are dropped by the sweep
    pub idle_timeout: Option<Duration>,
    /// Period of the background sweep
    pub sweep_interval: Duration,
    /// Initial throttle for connections handed out by the pool
    pub bandwidth: Bandwidth,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_spares: 1,
            max_spares: 5,
            idle_timeout: None,
            sweep_interval: Duration::from_secs(1),
            bandwidth: Bandwidth::UNLIMITED,
        }
    }
}

impl PoolConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the warm floor.
    pub fn min_spares(mut self, min: usize) -> Self {
        self.min_spares = min;
        self
    }

    /// Set the standby ceiling.
    pub fn max_spares(mut self, max: usize) -> Self {
        self.max_spares = max;
        self
    }

    /// Drop ready spares idle longer than `timeout`.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set the sweep period.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the throttle applied to new connections.
    pub fn bandwidth(mut self, bandwidth: Bandwidth) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Enforce `min_spares <= max_spares` and a ceiling of at least one, so a
    /// queued acquisition can always get a dial.
    pub(crate) fn normalized(mut self) -> Self {
        self.max_spares = self.max_spares.max(self.min_spares).max(1);
        self
    }
}

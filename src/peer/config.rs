//! Configuration structures for peer behavior.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Peer liveness and backlog policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Inactivity tolerated before a disconnected peer counts as dead
    pub timeout: Duration,

    /// Maximum frames held in the backlog.
    /// None means unbounded
    pub max_backlog: Option<usize>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(15), max_backlog: None }
    }
}

impl PeerConfig {
    /// Set the inactivity timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bound the backlog; pushes beyond it fail with `BacklogFull`.
    pub fn with_max_backlog(mut self, limit: usize) -> Self {
        self.max_backlog = Some(limit);
        self
    }
}

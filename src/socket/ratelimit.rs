//! Per-stream bandwidth throttle.
//!
//! Accounting uses one window per wall-clock second: both byte counters reset
//! whenever the current second differs from the window's second. This is not a
//! sliding window, so a stream may move up to twice its ceiling across a
//! window boundary (the tail of one second plus the head of the next).
//!
//! Callers ask before transferring ([`RateLimiter::request`]) and report what
//! actually moved afterwards ([`RateLimiter::report`]). Asking never consumes
//! budget. Latency shaping is not implemented.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Transfer direction of a throttled stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes read from the peer.
    In,
    /// Bytes written to the peer.
    Out,
}

/// Bandwidth ceilings in bytes per second. `0` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bandwidth {
    pub inbound: u64,
    pub outbound: u64,
}

impl Bandwidth {
    pub const UNLIMITED: Self = Self { inbound: 0, outbound: 0 };

    pub fn new(inbound: u64, outbound: u64) -> Self {
        Self { inbound, outbound }
    }

    /// Ceiling for one direction.
    pub fn ceiling(&self, direction: Direction) -> u64 {
        match direction {
            Direction::In => self.inbound,
            Direction::Out => self.outbound,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.inbound == 0 && self.outbound == 0
    }
}

/// Result of a [`RateLimiter::request`].
///
/// A throttled request is not an error: `allowed` is simply smaller than what
/// was asked for and `wait_ms` says when the next window opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub allowed: usize,
    pub wait_ms: u64,
}

impl Grant {
    fn unlimited(size: usize) -> Self {
        Self { allowed: size, wait_ms: 0 }
    }

    pub fn is_throttled(&self) -> bool {
        self.wait_ms > 0
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }
}

/// Wall-clock-second window byte counter for one stream.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    bandwidth: Bandwidth,
    /// Unix second the counters apply to.
    window_start: u64,
    window_in: u64,
    window_out: u64,
}

impl RateLimiter {
    pub fn new(bandwidth: Bandwidth) -> Self {
        Self { bandwidth, ..Self::default() }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    pub fn set_bandwidth(&mut self, bandwidth: Bandwidth) {
        self.bandwidth = bandwidth;
    }

    /// Override the ceiling for one direction.
    pub fn set_ceiling(&mut self, direction: Direction, bytes_per_sec: u64) {
        match direction {
            Direction::In => self.bandwidth.inbound = bytes_per_sec,
            Direction::Out => self.bandwidth.outbound = bytes_per_sec,
        }
    }

    /// Bytes counted in the current window for `direction`.
    pub fn window_bytes(&self, direction: Direction) -> u64 {
        match direction {
            Direction::In => self.window_in,
            Direction::Out => self.window_out,
        }
    }

    /// How many of `size` bytes may move right now.
    pub fn request(&mut self, direction: Direction, size: usize) -> Grant {
        self.request_at(direction, size, SystemTime::now())
    }

    /// [`request`](Self::request) evaluated at an explicit wall-clock time.
    pub fn request_at(&mut self, direction: Direction, size: usize, now: SystemTime) -> Grant {
        let ceiling = self.bandwidth.ceiling(direction);
        if ceiling == 0 {
            return Grant::unlimited(size);
        }

        let (secs, millis) = split_wall_clock(now);
        self.roll_window(secs);

        let remaining = ceiling.saturating_sub(self.window_bytes(direction));
        let allowed = usize::try_from(remaining).map_or(size, |r| r.min(size));
        let wait_ms = if allowed < size { 1000 - u64::from(millis) } else { 0 };

        if wait_ms > 0 {
            tracing::trace!(?direction, size, allowed, wait_ms, "bandwidth throttled");
        }
        Grant { allowed, wait_ms }
    }

    /// Record `size` bytes actually transferred.
    pub fn report(&mut self, direction: Direction, size: usize) {
        self.report_at(direction, size, SystemTime::now());
    }

    /// [`report`](Self::report) evaluated at an explicit wall-clock time.
    pub fn report_at(&mut self, direction: Direction, size: usize, now: SystemTime) {
        let (secs, _) = split_wall_clock(now);
        self.roll_window(secs);

        let counter = match direction {
            Direction::In => &mut self.window_in,
            Direction::Out => &mut self.window_out,
        };
        *counter = counter.saturating_add(size as u64);
    }

    fn roll_window(&mut self, secs: u64) {
        if secs != self.window_start {
            self.window_start = secs;
            self.window_in = 0;
            self.window_out = 0;
        }
    }
}

/// Unix seconds and the millisecond offset within that second.
fn split_wall_clock(now: SystemTime) -> (u64, u32) {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    (since_epoch.as_secs(), since_epoch.subsec_millis())
}

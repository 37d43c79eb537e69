//! Socket and connection management.
//!
//! - [`pool`]: pre-warming connection pool (min/max spares, FIFO waiters)
//! - [`connectjob`]: the [`Dial`](connectjob::Dial) seam and a TCP dialer
//! - [`connection`]: connections handed out by the pool
//! - [`stream`]: socket trait objects and bandwidth-throttled streams
//! - [`ratelimit`]: wall-clock-second bandwidth accounting

pub mod config;
pub mod connectjob;
pub mod connection;
pub mod pool;
pub mod ratelimit;
pub mod stream;

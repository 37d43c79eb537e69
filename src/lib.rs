//! # evnet
//!
//! Client-side connection lifecycle and flow control for event-driven I/O.
//!
//! `evnet` decides *when* a connection exists, *who* holds it, and *how fast*
//! bytes may cross it. Wire protocols, TLS and name resolution live elsewhere
//! and plug in through narrow traits.
//!
//! ## Features
//!
//! - **Connection Pool**: keeps `min_spares` connections warm to one target,
//!   never more than `max_spares` in standby, serves waiters FIFO
//! - **Peers**: logical endpoints with a reliable outbound backlog that survives
//!   reconnects, plus timeout-based liveness
//! - **Bandwidth Throttling**: per-stream, per-direction byte ceilings on
//!   wall-clock-second windows
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use evnet::socket::config::PoolConfig;
//! use evnet::socket::connectjob::TcpConnectJob;
//! use evnet::socket::pool::ConnectionPool;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = ConnectionPool::new(
//!         "example.com:80",
//!         Arc::new(TcpConnectJob::new()),
//!         PoolConfig::new().min_spares(2).max_spares(4),
//!     );
//!     let conn = pool.acquire().await.unwrap();
//!     println!("connected to {}", conn.target());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error definitions
//! - [`socket`] - Connection pool, dialing, throttled streams
//! - [`peer`] - Peers, backlogs, and the transport seam

pub mod base;
pub mod peer;
pub mod socket;

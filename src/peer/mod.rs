//! Logical remote endpoints.
//!
//! A [`Peer`] outlives any single physical connection: a transport may carry
//! it over a persistent socket or over a fresh connection per exchange (long
//! polling). Outbound messages wait in the peer's backlog until the transport
//! has a channel to deliver them, and a failed delivery puts the frame back at
//! the head so nothing is lost or reordered.
//!
//! # Liveness
//!
//! A peer is alive while it is open and either was touched within its timeout
//! or its transport still reports it connected. Idle peers on a live socket
//! survive; peers whose transport dropped them are reaped by time alone.
//!
//! ```text
//!  touch() ──► [ alive ] ──(timeout, transport disconnected)──► [ dead ] ──► reap
//!                  │
//!                  └── close(graceful) ──► [ closed ] (backlog still usable)
//! ```

/// Peer configuration
pub mod config;

/// Core peer implementation with backlog and liveness tracking
pub mod core;

/// Backlog frame types
pub mod frame;

/// Transport-side peer registry
pub mod set;

/// Transport abstraction and peer identifiers
pub mod transport;

// Re-export main types
pub use config::PeerConfig;
pub use self::core::Peer;
pub use frame::{Frame, MessageKind};
pub use set::PeerSet;
pub use transport::{PeerId, Transport};

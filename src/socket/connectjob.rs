//! Outbound dialing.
//!
//! [`Dial`] is the socket primitive the pool consumes: given an opaque target
//! string, produce a connected socket or a `DialFailed`. [`TcpConnectJob`] is
//! the stock implementation over `tokio::net::TcpStream`.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::stream::BoxedSocket;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// Alias for the `Future` type returned by a dialer.
pub type Dialing = Pin<Box<dyn Future<Output = Result<BoxedSocket, NetError>> + Send>>;

/// Trait for establishing outbound connections.
///
/// The returned future must not borrow the dialer; the pool drives it on a
/// spawned task and may abort it during teardown.
pub trait Dial: Send + Sync {
    fn dial(&self, target: &str) -> Dialing;
}

/// Blanket implementation for Arc-wrapped dialers.
impl<D: Dial + ?Sized> Dial for Arc<D> {
    fn dial(&self, target: &str) -> Dialing {
        (**self).dial(target)
    }
}

/// Plain TCP connect with a deadline. `target` is anything
/// `TcpStream::connect` accepts, typically `host:port`.
#[derive(Debug, Clone)]
pub struct TcpConnectJob {
    connect_timeout: Duration,
    nodelay: bool,
}

impl Default for TcpConnectJob {
    fn default() -> Self {
        Self { connect_timeout: Duration::from_secs(10), nodelay: true }
    }
}

impl TcpConnectJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect deadline.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable TCP_NODELAY on connected sockets.
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }
}

impl Dial for TcpConnectJob {
    fn dial(&self, target: &str) -> Dialing {
        let target = target.to_string();
        let deadline = self.connect_timeout;
        let nodelay = self.nodelay;

        Box::pin(async move {
            tracing::debug!(target = %target, "tcp connect");
            let stream = tokio::time::timeout(deadline, TcpStream::connect(target.as_str()))
                .await
                .map_err(|_| NetError::dial_failed(&target, "connect timed out"))?
                .dial_context(&target)?;

            if let Err(e) = stream.set_nodelay(nodelay) {
                tracing::debug!(target = %target, error = %e, "set_nodelay failed");
            }
            Ok(BoxedSocket::new(stream))
        })
    }
}

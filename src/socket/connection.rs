//! Connections issued by the pool.

use crate::base::neterror::NetError;
use crate::socket::ratelimit::{Bandwidth, Direction, RateLimiter};
use crate::socket::stream::{BoxedSocket, ThrottledStream};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;

/// An established connection to the pool's target.
///
/// Once handed out the caller owns it outright; it is never returned to the
/// pool. Reads and writes pass through the connection's own rate limiter.
pub struct Connection {
    id: u64,
    target: Arc<str>,
    stream: ThrottledStream<BoxedSocket>,
    established_at: Instant,
}

impl Connection {
    pub fn new(id: u64, target: Arc<str>, socket: BoxedSocket, bandwidth: Bandwidth) -> Self {
        Self {
            id,
            target,
            stream: ThrottledStream::new(socket, bandwidth),
            established_at: Instant::now(),
        }
    }

    /// Pool-unique identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    pub fn is_connected(&self) -> bool {
        self.stream.get_ref().is_connected()
    }

    /// Whether a never-claimed connection can still be handed out.
    /// Follows Chromium's IdleSocket::IsUsable(): it must be connected and
    /// must not have received anything while idle.
    pub fn check_usable(&self) -> Result<(), NetError> {
        let socket = self.stream.get_ref();
        if !socket.is_connected() {
            return Err(NetError::SocketRemoteClosed);
        }
        if !socket.is_connected_and_idle() {
            return Err(NetError::DataReceivedUnexpectedly);
        }
        Ok(())
    }

    /// Close observer for a parked spare; see
    /// [`StreamSocket::poll_idle_close`](crate::socket::stream::StreamSocket::poll_idle_close).
    pub(crate) fn poll_idle_close(&self, cx: &mut Context<'_>) -> Poll<NetError> {
        self.stream.get_ref().poll_idle_close(cx)
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.stream.limiter()
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.stream.bandwidth()
    }

    pub fn set_bandwidth(&mut self, bandwidth: Bandwidth) {
        self.stream.set_bandwidth(bandwidth);
    }

    pub fn set_ceiling(&mut self, direction: Direction, bytes_per_sec: u64) {
        self.stream.set_ceiling(direction, bytes_per_sec);
    }

    /// Drop the throttle and take the raw socket.
    pub fn into_inner(self) -> BoxedSocket {
        self.stream.into_inner()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("bandwidth", &self.stream.bandwidth())
            .finish()
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

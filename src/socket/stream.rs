//! Socket abstraction and bandwidth-throttled streams.
//!
//! [`StreamSocket`] is the narrow interface the pool needs from any connected
//! byte stream (TCP, TLS, in-memory). [`BoxedSocket`] erases the concrete type
//! so dialers can hand back whatever they connected. [`ThrottledStream`] applies
//! a [`RateLimiter`] to reads and writes of any wrapped stream.

use crate::base::neterror::NetError;
use crate::socket::ratelimit::{Bandwidth, Direction, RateLimiter};
use std::future::Future;
use std::io;
use std::pin::{pin, Pin};
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::Sleep;

/// A trait for any socket that supports async read/write operations.
///
/// Chromium equivalent: `net::StreamSocket`
pub trait StreamSocket: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {
    /// Check if the socket is still connected.
    /// Only meaningful while nobody else is reading from the socket. Never
    /// disturbs the waker of a read that is pending.
    fn is_connected(&self) -> bool {
        true
    }

    /// Connected and no unread data pending.
    fn is_connected_and_idle(&self) -> bool {
        self.is_connected()
    }

    /// Resolves once an idle socket becomes unusable: the remote closed it
    /// (`SocketRemoteClosed`) or sent data nobody asked for
    /// (`DataReceivedUnexpectedly`). Sockets without a close event stay
    /// pending forever.
    ///
    /// This registers `cx` as the socket's read waker, so it is only for
    /// sockets nobody reads from, e.g. pool spares.
    fn poll_idle_close(&self, _cx: &mut Context<'_>) -> Poll<NetError> {
        Poll::Pending
    }
}

impl StreamSocket for TcpStream {
    fn is_connected(&self) -> bool {
        !matches!(peek_tcp(self), PeekState::Closed)
    }

    fn is_connected_and_idle(&self) -> bool {
        matches!(peek_tcp(self), PeekState::Idle)
    }

    fn poll_idle_close(&self, cx: &mut Context<'_>) -> Poll<NetError> {
        let mut byte = [0u8; 1];
        let mut buf = ReadBuf::new(&mut byte);
        match ready!(self.poll_peek(cx, &mut buf)) {
            Ok(0) | Err(_) => Poll::Ready(NetError::SocketRemoteClosed),
            Ok(_) => Poll::Ready(NetError::DataReceivedUnexpectedly),
        }
    }
}

impl StreamSocket for DuplexStream {}

enum PeekState {
    Idle,
    HasData,
    Closed,
}

/// Non-consuming, non-blocking liveness probe.
///
/// Readiness is checked through `readable()`, whose waiter list is separate
/// from the single read waker slot used by `poll_read`/`poll_peek`. The peek
/// only runs once the socket is readable, when it completes without
/// registering a waker.
fn peek_tcp(stream: &TcpStream) -> PeekState {
    // peer_addr() returns Err if socket is disconnected
    if stream.peer_addr().is_err() {
        return PeekState::Closed;
    }

    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    let readable = pin!(stream.readable());
    match readable.poll(&mut cx) {
        Poll::Pending => return PeekState::Idle,
        Poll::Ready(Err(_)) => return PeekState::Closed,
        Poll::Ready(Ok(())) => {}
    }

    let mut byte = [0u8; 1];
    let mut buf = ReadBuf::new(&mut byte);
    match stream.poll_peek(&mut cx, &mut buf) {
        Poll::Ready(Ok(0)) => PeekState::Closed, // EOF
        Poll::Ready(Ok(_)) => PeekState::HasData,
        Poll::Ready(Err(_)) => PeekState::Closed,
        Poll::Pending => PeekState::Idle,
    }
}

/// A wrapper type for boxed dynamic StreamSocket that is object-safe.
pub struct BoxedSocket {
    inner: Pin<Box<dyn StreamSocket>>,
}

impl BoxedSocket {
    /// Create a new BoxedSocket from any StreamSocket.
    pub fn new<S: StreamSocket>(socket: S) -> Self {
        Self { inner: Box::pin(socket) }
    }

    /// Get a pinned mutable reference to the inner socket.
    pub fn as_mut(&mut self) -> Pin<&mut dyn StreamSocket> {
        self.inner.as_mut()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn is_connected_and_idle(&self) -> bool {
        self.inner.is_connected_and_idle()
    }

    pub fn poll_idle_close(&self, cx: &mut Context<'_>) -> Poll<NetError> {
        self.inner.poll_idle_close(cx)
    }
}

impl std::fmt::Debug for BoxedSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedSocket").finish_non_exhaustive()
    }
}

impl AsyncRead for BoxedSocket {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for BoxedSocket {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.inner.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_shutdown(cx)
    }
}

impl StreamSocket for BoxedSocket {
    fn is_connected(&self) -> bool {
        BoxedSocket::is_connected(self)
    }

    fn is_connected_and_idle(&self) -> bool {
        BoxedSocket::is_connected_and_idle(self)
    }

    fn poll_idle_close(&self, cx: &mut Context<'_>) -> Poll<NetError> {
        BoxedSocket::poll_idle_close(self, cx)
    }
}

/// A stream whose reads and writes are metered by a [`RateLimiter`].
///
/// When the current window is exhausted the stream parks on a timer until the
/// next wall-clock second instead of returning a short zero-length result.
pub struct ThrottledStream<S> {
    inner: S,
    limiter: RateLimiter,
    read_delay: Option<Pin<Box<Sleep>>>,
    write_delay: Option<Pin<Box<Sleep>>>,
}

impl<S> ThrottledStream<S> {
    pub fn new(inner: S, bandwidth: Bandwidth) -> Self {
        Self { inner, limiter: RateLimiter::new(bandwidth), read_delay: None, write_delay: None }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.limiter.bandwidth()
    }

    pub fn set_bandwidth(&mut self, bandwidth: Bandwidth) {
        self.limiter.set_bandwidth(bandwidth);
    }

    pub fn set_ceiling(&mut self, direction: Direction, bytes_per_sec: u64) {
        self.limiter.set_ceiling(direction, bytes_per_sec);
    }
}

/// Poll a pending throttle delay; clears it once elapsed.
fn poll_delay(delay: &mut Option<Pin<Box<Sleep>>>, cx: &mut Context<'_>) -> Poll<()> {
    if let Some(sleep) = delay.as_mut() {
        ready!(sleep.as_mut().poll(cx));
        *delay = None;
    }
    Poll::Ready(())
}

impl<S: AsyncRead + Unpin> AsyncRead for ThrottledStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            ready!(poll_delay(&mut this.read_delay, cx));

            let wanted = buf.remaining();
            let grant = this.limiter.request(Direction::In, wanted);
            if grant.allowed == 0 && wanted > 0 {
                this.read_delay = Some(Box::pin(tokio::time::sleep(grant.wait())));
                continue;
            }

            let n = if grant.allowed >= wanted {
                let before = buf.filled().len();
                ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
                buf.filled().len() - before
            } else {
                let mut scratch = vec![0u8; grant.allowed];
                let mut limited = ReadBuf::new(&mut scratch);
                ready!(Pin::new(&mut this.inner).poll_read(cx, &mut limited))?;
                let filled = limited.filled();
                buf.put_slice(filled);
                filled.len()
            };

            this.limiter.report(Direction::In, n);
            return Poll::Ready(Ok(()));
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ThrottledStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        loop {
            ready!(poll_delay(&mut this.write_delay, cx));

            let grant = this.limiter.request(Direction::Out, buf.len());
            if grant.allowed == 0 && !buf.is_empty() {
                this.write_delay = Some(Box::pin(tokio::time::sleep(grant.wait())));
                continue;
            }

            let n = ready!(Pin::new(&mut this.inner).poll_write(cx, &buf[..grant.allowed]))?;
            this.limiter.report(Direction::Out, n);
            return Poll::Ready(Ok(n));
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl<S: StreamSocket> StreamSocket for ThrottledStream<S> {
    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn is_connected_and_idle(&self) -> bool {
        self.inner.is_connected_and_idle()
    }

    fn poll_idle_close(&self, cx: &mut Context<'_>) -> Poll<NetError> {
        self.inner.poll_idle_close(cx)
    }
}

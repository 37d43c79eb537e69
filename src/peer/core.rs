//! Core peer implementation with backlog and liveness tracking.

use super::config::PeerConfig;
use super::frame::{Frame, MessageKind};
use super::transport::{PeerId, Transport};
use crate::base::neterror::NetError;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// One logical remote endpoint.
///
/// The peer refers back to its transport weakly: the transport owns its peers,
/// and a peer whose transport is gone is simply not connected.
pub struct Peer {
    /// Stable for the peer's lifetime
    id: PeerId,

    transport: Weak<dyn Transport>,

    /// Outbound queue; head is next to send
    backlog: VecDeque<Frame>,

    last_touch: Instant,

    config: PeerConfig,

    /// Monotonic false -> true
    closed: bool,
}

impl Peer {
    /// Create a peer owned by `transport`.
    pub fn new(transport: &Arc<dyn Transport>, config: PeerConfig) -> Self {
        Self::with_id(PeerId::generate(), transport, config)
    }

    /// Create a peer with a caller-chosen identifier, e.g. one restored from a
    /// session cookie.
    pub fn with_id(id: PeerId, transport: &Arc<dyn Transport>, config: PeerConfig) -> Self {
        tracing::debug!(peer = %id, "peer created");
        Self {
            id,
            transport: Arc::downgrade(transport),
            backlog: VecDeque::new(),
            last_touch: Instant::now(),
            config,
            closed: false,
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// The owning transport, if it still exists.
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.upgrade()
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Record activity now.
    pub fn touch(&mut self) {
        self.last_touch = Instant::now();
    }

    /// Time since the last [`touch`](Self::touch).
    pub fn idle_for(&self) -> Duration {
        self.last_touch.elapsed()
    }

    /// Whether the transport currently holds a live channel to this peer.
    pub fn is_connected(&self) -> bool {
        self.transport.upgrade().is_some_and(|t| t.is_peer_connected(&self.id))
    }

    pub fn is_alive(&self) -> bool {
        !self.closed && (self.idle_for() <= self.config.timeout || self.is_connected())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the peer. Only the first call reaches the transport.
    pub fn close(&mut self, graceful: bool) {
        if self.closed {
            return;
        }
        self.closed = true;
        tracing::debug!(peer = %self.id, graceful, backlog = self.backlog.len(), "peer closed");

        if let Some(transport) = self.transport.upgrade() {
            transport.close_peer(&self.id, graceful);
        }
    }

    fn ensure_capacity(&self) -> Result<(), NetError> {
        match self.config.max_backlog {
            Some(limit) if self.backlog.len() >= limit => Err(NetError::BacklogFull { limit }),
            _ => Ok(()),
        }
    }

    /// Queue a message at the tail of the backlog.
    pub fn push_message(
        &mut self,
        payload: impl Into<Bytes>,
        kind: MessageKind,
    ) -> Result<(), NetError> {
        self.ensure_capacity()?;
        self.backlog.push_back(Frame::new(kind, payload));
        Ok(())
    }

    /// Put a message back at the head of the backlog after a failed delivery.
    /// Empty payloads are ignored. Not subject to `max_backlog`, so a frame
    /// taken out for delivery can always return.
    pub fn requeue_message(
        &mut self,
        payload: impl Into<Bytes>,
        kind: MessageKind,
    ) -> Result<(), NetError> {
        let payload = payload.into();
        if payload.is_empty() {
            return Ok(());
        }
        self.backlog.push_front(Frame::new(kind, payload));
        Ok(())
    }

    /// Take the next message to send.
    pub fn pop_message(&mut self) -> Option<Frame> {
        self.backlog.pop_front()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Text shorthand for [`push_message`](Self::push_message).
    pub fn push_frame(&mut self, text: impl Into<String>) -> Result<(), NetError> {
        self.push_message(Bytes::from(text.into()), MessageKind::Text)
    }

    /// Text shorthand for [`requeue_message`](Self::requeue_message).
    pub fn unshift_frame(&mut self, text: impl Into<String>) -> Result<(), NetError> {
        self.requeue_message(Bytes::from(text.into()), MessageKind::Text)
    }

    /// Payload-only shorthand for [`pop_message`](Self::pop_message).
    pub fn pop_frame(&mut self) -> Option<Bytes> {
        self.pop_message().map(|frame| frame.payload)
    }

    /// Take the whole backlog, e.g. to hand it to a replacement peer.
    pub fn drain_backlog(&mut self) -> VecDeque<Frame> {
        std::mem::take(&mut self.backlog)
    }

    fn upgrade_transport(&self) -> Result<Arc<dyn Transport>, NetError> {
        self.transport.upgrade().ok_or(NetError::TransportGone)
    }

    /// Deliver bytes immediately, bypassing the backlog.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), NetError> {
        self.upgrade_transport()?.send(&self.id, MessageKind::Binary, payload)?;
        self.touch();
        Ok(())
    }

    /// Deliver text immediately, bypassing the backlog.
    pub fn send_text(&mut self, text: &str) -> Result<(), NetError> {
        self.upgrade_transport()?.send(&self.id, MessageKind::Text, text.as_bytes())?;
        self.touch();
        Ok(())
    }

    /// Deliver queued frames in order until the backlog is empty or a send
    /// fails. The failed frame goes back to the head and the error is
    /// returned. Returns the number of frames delivered.
    pub fn flush_backlog(&mut self) -> Result<usize, NetError> {
        let transport = self.upgrade_transport()?;
        let mut sent = 0;

        while let Some(frame) = self.backlog.pop_front() {
            if let Err(e) = transport.send(&self.id, frame.kind, &frame.payload) {
                tracing::debug!(peer = %self.id, error = %e, delivered = sent, "backlog flush stopped");
                self.backlog.push_front(frame);
                if sent > 0 {
                    self.touch();
                }
                return Err(e);
            }
            sent += 1;
        }

        if sent > 0 {
            self.touch();
        }
        Ok(sent)
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .field("backlog", &self.backlog.len())
            .field("idle_for", &self.idle_for())
            .finish()
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        if !self.backlog.is_empty() {
            tracing::warn!(peer = %self.id, frames = self.backlog.len(), "peer dropped with undelivered backlog");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockTransport {
        connected: AtomicBool,
        failing: AtomicBool,
        closes: Mutex<Vec<(PeerId, bool)>>,
        sent: Mutex<Vec<(MessageKind, Vec<u8>)>>,
    }

    impl Transport for MockTransport {
        fn is_peer_connected(&self, _peer_id: &PeerId) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn close_peer(&self, peer_id: &PeerId, graceful: bool) {
            self.closes.lock().unwrap().push((peer_id.clone(), graceful));
        }

        fn send(&self, _peer_id: &PeerId, kind: MessageKind, payload: &[u8]) -> Result<(), NetError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NetError::SocketNotConnected);
            }
            self.sent.lock().unwrap().push((kind, payload.to_vec()));
            Ok(())
        }
    }

    fn peer_with(config: PeerConfig) -> (Arc<MockTransport>, Peer) {
        let mock = Arc::new(MockTransport::default());
        let transport: Arc<dyn Transport> = mock.clone();
        let peer = Peer::new(&transport, config);
        (mock, peer)
    }

    #[test]
    fn test_backlog_order_with_requeue() {
        let (_t, mut peer) = peer_with(PeerConfig::default());
        peer.push_frame("a").unwrap();
        peer.push_frame("b").unwrap();
        assert_eq!(peer.pop_frame().unwrap(), "a");

        peer.unshift_frame("c").unwrap();
        assert_eq!(peer.pop_frame().unwrap(), "c");
        assert_eq!(peer.pop_frame().unwrap(), "b");
        assert!(peer.pop_message().is_none());
    }

    #[test]
    fn test_requeue_empty_is_noop() {
        let (_t, mut peer) = peer_with(PeerConfig::default());
        peer.requeue_message(Bytes::new(), MessageKind::Binary).unwrap();
        assert_eq!(peer.backlog_len(), 0);
    }

    #[test]
    fn test_kind_is_preserved() {
        let (_t, mut peer) = peer_with(PeerConfig::default());
        peer.push_message(vec![0u8, 1, 2], MessageKind::Binary).unwrap();
        let frame = peer.pop_message().unwrap();
        assert_eq!(frame.kind, MessageKind::Binary);
        assert_eq!(frame.payload.as_ref(), &[0u8, 1, 2]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (transport, mut peer) = peer_with(PeerConfig::default());
        peer.close(true);
        peer.close(false);

        assert!(peer.is_closed());
        assert!(!peer.is_alive());
        let closes = transport.closes.lock().unwrap();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0], (peer.id().clone(), true));
    }

    #[test]
    fn test_backlog_usable_after_close() {
        let (_t, mut peer) = peer_with(PeerConfig::default());
        peer.close(false);
        peer.push_frame("late").unwrap();
        assert_eq!(peer.backlog_len(), 1);
        peer.drain_backlog();
    }

    #[test]
    fn test_backlog_limit() {
        let (_t, mut peer) = peer_with(PeerConfig::default().with_max_backlog(2));
        peer.push_frame("1").unwrap();
        peer.push_frame("2").unwrap();
        assert_eq!(peer.push_frame("3"), Err(NetError::BacklogFull { limit: 2 }));

        // A frame coming back from a failed delivery is always admitted.
        peer.unshift_frame("0").unwrap();
        assert_eq!(peer.backlog_len(), 3);
        peer.drain_backlog();
    }

    #[test]
    fn test_flush_requeues_on_failure() {
        let (transport, mut peer) = peer_with(PeerConfig::default());
        peer.push_frame("x").unwrap();
        peer.push_frame("y").unwrap();

        transport.failing.store(true, Ordering::SeqCst);
        assert_eq!(peer.flush_backlog(), Err(NetError::SocketNotConnected));
        assert_eq!(peer.backlog_len(), 2);

        transport.failing.store(false, Ordering::SeqCst);
        assert_eq!(peer.flush_backlog(), Ok(2));
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].1, b"x");
        assert_eq!(sent[1].1, b"y");
    }

    #[test]
    fn test_transport_gone() {
        let (transport, mut peer) = peer_with(PeerConfig::default());
        drop(transport);

        assert!(!peer.is_connected());
        assert_eq!(peer.send(b"hi"), Err(NetError::TransportGone));
        // Close without a transport still flips the flag.
        peer.close(true);
        assert!(peer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alive_until_timeout_when_disconnected() {
        let (_t, mut peer) = peer_with(PeerConfig::default().with_timeout(Duration::from_secs(15)));
        assert!(peer.is_alive());

        tokio::time::advance(Duration::from_secs(16)).await;
        assert!(!peer.is_alive());

        peer.touch();
        assert!(peer.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_peer_survives_timeout() {
        let (transport, peer) = peer_with(PeerConfig::default());
        transport.connected.store(true, Ordering::SeqCst);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(peer.is_alive());

        transport.connected.store(false, Ordering::SeqCst);
        assert!(!peer.is_alive());
    }
}

//! The transport seam peers sit on.

use crate::base::neterror::NetError;
use crate::peer::frame::MessageKind;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque, unique peer identifier (a UUID v4 string).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerId(Arc<str>);

impl PeerId {
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

/// Delivery mechanism owning a set of peers (WebSocket, long polling, ...).
///
/// Implementations must not call back into the [`PeerSet`](crate::peer::PeerSet)
/// entry they were invoked from.
pub trait Transport: Send + Sync {
    /// Whether the transport currently holds a live channel to the peer.
    fn is_peer_connected(&self, peer_id: &PeerId) -> bool;

    /// Close the peer's underlying connection(s), flushing first if `graceful`.
    fn close_peer(&self, peer_id: &PeerId, graceful: bool);

    /// Deliver one message now.
    fn send(&self, peer_id: &PeerId, kind: MessageKind, payload: &[u8]) -> Result<(), NetError>;
}

/// Blanket implementation for Arc-wrapped transports.
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn is_peer_connected(&self, peer_id: &PeerId) -> bool {
        (**self).is_peer_connected(peer_id)
    }

    fn close_peer(&self, peer_id: &PeerId, graceful: bool) {
        (**self).close_peer(peer_id, graceful)
    }

    fn send(&self, peer_id: &PeerId, kind: MessageKind, payload: &[u8]) -> Result<(), NetError> {
        (**self).send(peer_id, kind, payload)
    }
}

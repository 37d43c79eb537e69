//! Transport-side peer registry.

use super::config::PeerConfig;
use super::core::Peer;
use super::transport::{PeerId, Transport};
use dashmap::DashMap;
use std::sync::Arc;

/// Peers known to one transport, keyed by id.
///
/// Each entry is mutated under its shard lock, which serializes all operations
/// on a given peer. Closures passed to [`with_peer`](Self::with_peer) must not
/// re-enter the set.
pub struct PeerSet {
    peers: DashMap<PeerId, Peer>,
    config: PeerConfig,
}

impl Default for PeerSet {
    fn default() -> Self {
        Self::new(PeerConfig::default())
    }
}

impl std::fmt::Debug for PeerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSet")
            .field("peers", &self.peers.len())
            .field("config", &self.config)
            .finish()
    }
}

impl PeerSet {
    /// Registry whose new peers use `config`.
    pub fn new(config: PeerConfig) -> Self {
        Self { peers: DashMap::new(), config }
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// Register a new peer for a newly recognized endpoint.
    pub fn create(&self, transport: &Arc<dyn Transport>) -> PeerId {
        let peer = Peer::new(transport, self.config.clone());
        let id = peer.id().clone();
        self.peers.insert(id.clone(), peer);
        id
    }

    /// Register an existing peer. Returns the peer it replaced, if any.
    pub fn insert(&self, peer: Peer) -> Option<Peer> {
        self.peers.insert(peer.id().clone(), peer)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Run `f` with exclusive access to one peer.
    pub fn with_peer<R>(&self, id: &PeerId, f: impl FnOnce(&mut Peer) -> R) -> Option<R> {
        self.peers.get_mut(id).map(|mut entry| f(entry.value_mut()))
    }

    /// Record activity on a peer; false if unknown.
    pub fn touch(&self, id: &PeerId) -> bool {
        self.with_peer(id, Peer::touch).is_some()
    }

    pub fn is_alive(&self, id: &PeerId) -> bool {
        self.peers.get(id).is_some_and(|entry| entry.is_alive())
    }

    /// Release a peer. The caller receives it with its backlog intact and
    /// decides what happens to undelivered frames.
    pub fn remove(&self, id: &PeerId) -> Option<Peer> {
        self.peers.remove(id).map(|(_, peer)| peer)
    }

    /// Remove every peer that is no longer alive, closing any that are still
    /// open. Returned peers keep their backlogs.
    pub fn reap_dead(&self) -> Vec<Peer> {
        let candidates: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|entry| !entry.is_alive())
            .map(|entry| entry.key().clone())
            .collect();

        let mut reaped = Vec::with_capacity(candidates.len());
        for id in candidates {
            // Re-check under the entry lock; the peer may have been touched since.
            if let Some((_, mut peer)) = self.peers.remove_if(&id, |_, peer| !peer.is_alive()) {
                peer.close(false);
                reaped.push(peer);
            }
        }

        if !reaped.is_empty() {
            tracing::debug!(count = reaped.len(), remaining = self.peers.len(), "reaped dead peers");
        }
        reaped
    }
}

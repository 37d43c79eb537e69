//! Peer backlog and liveness against a reconnecting transport.

use evnet::base::neterror::NetError;
use evnet::peer::{Frame, MessageKind, Peer, PeerConfig, PeerId, PeerSet, Transport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Long-polling style transport: a peer is reachable only while a poll
/// channel is attached, and each reconnect brings a fresh channel.
#[derive(Default)]
struct PollingTransport {
    channels: Mutex<HashMap<PeerId, mpsc::UnboundedSender<Frame>>>,
    closed: Mutex<Vec<(PeerId, bool)>>,
}

impl PollingTransport {
    fn attach(&self, id: &PeerId) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.lock().unwrap().insert(id.clone(), tx);
        rx
    }

    fn detach(&self, id: &PeerId) {
        self.channels.lock().unwrap().remove(id);
    }
}

impl Transport for PollingTransport {
    fn is_peer_connected(&self, peer_id: &PeerId) -> bool {
        self.channels
            .lock()
            .unwrap()
            .get(peer_id)
            .is_some_and(|tx| !tx.is_closed())
    }

    fn close_peer(&self, peer_id: &PeerId, graceful: bool) {
        self.detach(peer_id);
        self.closed.lock().unwrap().push((peer_id.clone(), graceful));
    }

    fn send(&self, peer_id: &PeerId, kind: MessageKind, payload: &[u8]) -> Result<(), NetError> {
        let channels = self.channels.lock().unwrap();
        let tx = channels.get(peer_id).ok_or(NetError::SocketNotConnected)?;
        tx.send(Frame::new(kind, payload.to_vec()))
            .map_err(|_| NetError::ConnectionClosed)
    }
}

fn setup(config: PeerConfig) -> (Arc<PollingTransport>, Arc<dyn Transport>, PeerSet) {
    let polling = Arc::new(PollingTransport::default());
    let transport: Arc<dyn Transport> = polling.clone();
    (polling, transport, PeerSet::new(config))
}

#[test]
fn test_backlog_scenario() {
    let (_polling, transport, _set) = setup(PeerConfig::default());
    let mut peer = Peer::new(&transport, PeerConfig::default());

    peer.push_message("a", MessageKind::Text).unwrap();
    peer.push_message("b", MessageKind::Text).unwrap();
    assert_eq!(peer.pop_message().unwrap().payload, "a");

    peer.requeue_message("c", MessageKind::Text).unwrap();
    assert_eq!(peer.pop_message().unwrap().payload, "c");
    assert_eq!(peer.pop_message().unwrap().payload, "b");
    assert!(peer.pop_message().is_none());
}

#[test]
fn test_requeue_jumps_ahead_of_earlier_pushes() {
    let (_polling, transport, _set) = setup(PeerConfig::default());
    let mut peer = Peer::new(&transport, PeerConfig::default());

    for text in ["1", "2", "3"] {
        peer.push_frame(text).unwrap();
    }
    peer.unshift_frame("retry").unwrap();

    let order: Vec<String> = std::iter::from_fn(|| peer.pop_message())
        .map(|frame| frame.as_text().unwrap().to_owned())
        .collect();
    assert_eq!(order, vec!["retry", "1", "2", "3"]);
}

#[tokio::test]
async fn test_backlog_survives_reconnect() {
    let (polling, transport, set) = setup(PeerConfig::default());
    let id = set.create(&transport);

    // Produced while no channel is attached.
    set.with_peer(&id, |peer| {
        peer.push_frame("first").unwrap();
        peer.push_frame("second").unwrap();
        assert_eq!(peer.flush_backlog(), Err(NetError::SocketNotConnected));
        assert_eq!(peer.backlog_len(), 2);
    });

    // A poll arrives; the backlog drains onto it in order.
    let mut rx = polling.attach(&id);
    let delivered = set.with_peer(&id, |peer| peer.flush_backlog()).unwrap();
    assert_eq!(delivered, Ok(2));
    assert_eq!(rx.recv().await.unwrap().as_text(), Some("first"));
    assert_eq!(rx.recv().await.unwrap().as_text(), Some("second"));

    // The poll completes; the next message waits for the following poll.
    drop(rx);
    polling.detach(&id);
    set.with_peer(&id, |peer| peer.push_frame("third").unwrap());
    assert_eq!(
        set.with_peer(&id, |peer| peer.flush_backlog()).unwrap(),
        Err(NetError::SocketNotConnected)
    );

    let mut rx = polling.attach(&id);
    assert_eq!(set.with_peer(&id, |peer| peer.flush_backlog()).unwrap(), Ok(1));
    assert_eq!(rx.recv().await.unwrap().as_text(), Some("third"));
}

#[tokio::test(start_paused = true)]
async fn test_liveness_follows_touch_and_transport() {
    let (polling, transport, set) =
        setup(PeerConfig::default().with_timeout(Duration::from_secs(15)));
    let id = set.create(&transport);

    tokio::time::advance(Duration::from_secs(16)).await;
    assert!(!set.is_alive(&id));

    // Touch revives regardless of elapsed time.
    assert!(set.touch(&id));
    assert!(set.is_alive(&id));

    // Connected peers outlive the timeout.
    let _rx = polling.attach(&id);
    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(set.is_alive(&id));
    assert!(set.reap_dead().is_empty());

    polling.detach(&id);
    let reaped = set.reap_dead();
    assert_eq!(reaped.len(), 1);
    assert!(reaped[0].is_closed());
    assert_eq!(*polling.closed.lock().unwrap(), vec![(id.clone(), false)]);
    assert!(!set.contains(&id));
}

#[tokio::test]
async fn test_send_bypasses_backlog() {
    let (polling, transport, set) = setup(PeerConfig::default());
    let id = set.create(&transport);
    let mut rx = polling.attach(&id);

    set.with_peer(&id, |peer| {
        peer.push_frame("queued").unwrap();
        peer.send(&[7, 7]).unwrap();
        peer.send_text("now").unwrap();
        assert_eq!(peer.backlog_len(), 1);
    });

    let binary = rx.recv().await.unwrap();
    assert_eq!(binary.kind, MessageKind::Binary);
    assert_eq!(binary.payload.as_ref(), &[7u8, 7]);
    assert_eq!(rx.recv().await.unwrap().as_text(), Some("now"));

    set.remove(&id).unwrap().drain_backlog();
}

#[test]
fn test_closed_peer_keeps_buffering() {
    let (polling, transport, set) = setup(PeerConfig::default());
    let id = set.create(&transport);

    set.with_peer(&id, |peer| {
        peer.close(true);
        peer.close(true);
        peer.push_frame("after close").unwrap();
    });
    assert_eq!(polling.closed.lock().unwrap().len(), 1);

    // The owner takes the peer back with its backlog intact.
    let mut peer = set.remove(&id).unwrap();
    let backlog = peer.drain_backlog();
    assert_eq!(backlog.len(), 1);
    assert_eq!(backlog[0].as_text(), Some("after close"));
}

#[test]
fn test_restored_identity() {
    let (_polling, transport, set) = setup(PeerConfig::default().with_max_backlog(1));
    let id = PeerId::from("session-42");
    let peer = Peer::with_id(id.clone(), &transport, set.config().clone());
    assert!(set.insert(peer).is_none());

    set.with_peer(&id, |peer| {
        peer.push_frame("one").unwrap();
        assert_eq!(peer.push_frame("two"), Err(NetError::BacklogFull { limit: 1 }));
        peer.drain_backlog();
    });
    assert_eq!(set.ids(), vec![id]);
}

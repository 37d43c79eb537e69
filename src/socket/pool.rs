//! Pre-warming connection pool for a single target.
//!
//! The pool keeps `min_spares` connections dialing or ready so an acquisition
//! usually completes without waiting, and never lets standby capacity
//! (dialing + ready) exceed `max_spares`. It is not a checkout pool: a claimed
//! connection belongs to the caller and is forgotten by the pool.
//!
//! All bookkeeping lives behind one mutex that is never held across an
//! `.await`, so each pool behaves as a single serialized actor.

use crate::base::neterror::NetError;
use crate::socket::config::PoolConfig;
use crate::socket::connectjob::{Dial, TcpConnectJob};
use crate::socket::connection::Connection;
use crate::socket::stream::BoxedSocket;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::Poll;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;

/// Snapshot of pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub dialing: usize,
    pub ready: usize,
    pub waiters: usize,
}

impl PoolStats {
    /// Spare capacity: connections dialing or ready but unclaimed.
    pub fn standby(&self) -> usize {
        self.dialing + self.ready
    }
}

/// A connected, never-claimed connection.
struct Spare {
    conn: Connection,
    idle_since: Instant,
    _watch: CloseWatch,
}

/// Close observer task of one spare; aborted when the spare leaves `ready`.
struct CloseWatch(AbortHandle);

impl Drop for CloseWatch {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A pending acquisition. Dropping the sender fails it with `PoolClosed`.
struct Waiter {
    id: u64,
    sender: oneshot::Sender<Connection>,
}

enum Claim {
    Ready(Connection),
    Queued(u64, oneshot::Receiver<Connection>),
}

struct PoolState {
    closed: bool,
    next_id: u64,
    dialing: HashMap<u64, AbortHandle>,
    ready: VecDeque<Spare>,
    waiters: VecDeque<Waiter>,
}

impl PoolState {
    fn new() -> Self {
        Self {
            closed: false,
            next_id: 1,
            dialing: HashMap::new(),
            ready: VecDeque::new(),
            waiters: VecDeque::new(),
        }
    }

    fn standby(&self) -> usize {
        self.dialing.len() + self.ready.len()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn teardown(&mut self) {
        self.closed = true;
        for (_, handle) in self.dialing.drain() {
            handle.abort();
        }
        self.ready.clear();
        self.waiters.clear();
    }
}

struct PoolInner {
    target: Arc<str>,
    config: PoolConfig,
    dialer: Arc<dyn Dial>,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start one dial. The completion runs on a spawned task that only holds a
    /// weak reference, so an in-flight dial never keeps the pool alive.
    fn spawn_dial(self: &Arc<Self>, state: &mut PoolState) {
        let id = state.allocate_id();
        let dialing = self.dialer.dial(&self.target);
        let pool = Arc::downgrade(self);

        tracing::debug!(target = %self.target, dial = id, "starting dial");
        let handle = tokio::spawn(async move {
            let result = dialing.await;
            if let Some(pool) = pool.upgrade() {
                pool.on_dial_complete(id, result);
            }
        });
        state.dialing.insert(id, handle.abort_handle());
    }

    /// One dial per unserved waiter, bounded by the standby ceiling.
    fn dial_for_waiters(self: &Arc<Self>, state: &mut PoolState) {
        if state.dialing.len() < state.waiters.len() && state.standby() < self.config.max_spares {
            self.spawn_dial(state);
        }
    }

    fn replenish_floor(self: &Arc<Self>, state: &mut PoolState) {
        if !state.closed && state.standby() < self.config.min_spares {
            self.spawn_dial(state);
        }
    }

    fn on_dial_complete(self: &Arc<Self>, id: u64, result: Result<BoxedSocket, NetError>) {
        let mut state = self.lock();
        if state.dialing.remove(&id).is_none() {
            // Torn down while the dial was in flight.
            return;
        }

        match result {
            Ok(socket) => {
                let conn = Connection::new(id, self.target.clone(), socket, self.config.bandwidth);
                tracing::debug!(target = %self.target, conn = id, "dial complete");
                self.deliver(&mut state, conn);
            }
            Err(e) => {
                tracing::warn!(target = %self.target, dial = id, error = %e, "dial failed");
            }
        }
    }

    /// Hand a fresh connection to the oldest waiter, or park it as a spare.
    fn deliver(self: &Arc<Self>, state: &mut PoolState, mut conn: Connection) {
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.sender.send(conn) {
                Ok(()) => {
                    tracing::debug!(target = %self.target, waiter = waiter.id, "waiter served");
                    self.dial_for_waiters(state);
                    self.replenish_floor(state);
                    return;
                }
                // Receiver vanished without its guard running; try the next one.
                Err(returned) => conn = returned,
            }
        }

        let watch = self.watch_spare(conn.id());
        state.ready.push_back(Spare { conn, idle_since: Instant::now(), _watch: watch });
    }

    /// Wait for the parked spare `id` to close and route it to `spare_gone`.
    /// The lock is only taken inside each poll, never across a suspension.
    fn watch_spare(self: &Arc<Self>, id: u64) -> CloseWatch {
        let pool = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let closed = futures::future::poll_fn(|cx| {
                let Some(pool) = pool.upgrade() else {
                    return Poll::Ready(None);
                };
                let state = pool.lock();
                let polled = match state.ready.iter().find(|spare| spare.conn.id() == id) {
                    Some(spare) => spare.conn.poll_idle_close(cx).map(Some),
                    None => Poll::Ready(None),
                };
                polled
            })
            .await;

            if let (Some(reason), Some(pool)) = (closed, pool.upgrade()) {
                pool.on_spare_closed(id, reason);
            }
        });
        CloseWatch(handle.abort_handle())
    }

    fn on_spare_closed(self: &Arc<Self>, id: u64, reason: NetError) {
        let mut state = self.lock();
        let pos = state.ready.iter().position(|spare| spare.conn.id() == id);
        if let Some(spare) = pos.and_then(|pos| state.ready.remove(pos)) {
            self.spare_gone(&mut state, spare, &reason);
        }
    }

    /// Take back a connection that reached a waiter whose future was dropped
    /// before it could observe it. It goes to the next waiter, or back to
    /// `ready` if standby capacity allows.
    fn reclaim(self: &Arc<Self>, conn: Connection) {
        // Parking a spare spawns its watcher; outside a runtime just drop it.
        if tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        let mut state = self.lock();
        if state.closed {
            return;
        }
        if state.waiters.is_empty() && state.standby() >= self.config.max_spares {
            tracing::debug!(target = %self.target, conn = conn.id(), "standby full, dropping reclaimed connection");
            return;
        }
        tracing::debug!(target = %self.target, conn = conn.id(), "reclaimed undelivered connection");
        self.deliver(&mut state, conn);
    }

    /// The one place a spare leaves `ready` without being claimed.
    fn spare_gone(self: &Arc<Self>, state: &mut PoolState, spare: Spare, reason: &NetError) {
        tracing::debug!(
            target = %self.target,
            conn = spare.conn.id(),
            reason = %reason,
            "dropping idle spare"
        );
        drop(spare);
        self.replenish_floor(state);
    }

    fn claim_or_enqueue(self: &Arc<Self>) -> Result<Claim, NetError> {
        let mut state = self.lock();
        if state.closed {
            return Err(NetError::PoolClosed);
        }

        while let Some(spare) = state.ready.pop_front() {
            match spare.conn.check_usable() {
                Ok(()) => {
                    self.replenish_floor(&mut state);
                    return Ok(Claim::Ready(spare.conn));
                }
                Err(reason) => self.spare_gone(&mut state, spare, &reason),
            }
        }

        let id = state.allocate_id();
        let (sender, receiver) = oneshot::channel();
        state.waiters.push_back(Waiter { id, sender });
        tracing::debug!(target = %self.target, waiter = id, "acquisition queued");

        self.dial_for_waiters(&mut state);
        Ok(Claim::Queued(id, receiver))
    }

    fn cancel_waiter(&self, id: u64) {
        let mut state = self.lock();
        state.waiters.retain(|w| w.id != id);
    }

    fn has_usable_spare(&self) -> bool {
        self.lock().ready.iter().any(|spare| spare.conn.check_usable().is_ok())
    }

    fn sweep_idle(self: &Arc<Self>) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        if state.closed {
            return 0;
        }

        let mut removed = 0;
        for spare in std::mem::take(&mut state.ready) {
            let verdict = match self.config.idle_timeout {
                Some(timeout) if now.duration_since(spare.idle_since) >= timeout => {
                    Err(NetError::ConnectionTimedOut)
                }
                _ => spare.conn.check_usable(),
            };
            match verdict {
                Ok(()) => state.ready.push_back(spare),
                Err(reason) => {
                    removed += 1;
                    self.spare_gone(&mut state, spare, &reason);
                }
            }
        }
        removed
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner).teardown();
    }
}

/// Owns a queued acquisition. If the acquiring future is dropped first, the
/// waiter is removed, and a connection already sent to it is reclaimed.
struct WaiterGuard<'a> {
    pool: &'a Arc<PoolInner>,
    id: u64,
    receiver: oneshot::Receiver<Connection>,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.pool.cancel_waiter(self.id);
        if let Ok(conn) = self.receiver.try_recv() {
            self.pool.reclaim(conn);
        }
    }
}

/// Pre-dialed connections to one target address.
///
/// Cloning yields another handle to the same pool. Construction starts dialing
/// immediately and therefore must happen inside a Tokio runtime.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ConnectionPool")
            .field("target", &self.inner.target)
            .field("min_spares", &self.inner.config.min_spares)
            .field("max_spares", &self.inner.config.max_spares)
            .field("stats", &stats)
            .finish()
    }
}

impl ConnectionPool {
    pub fn new(target: impl Into<String>, dialer: Arc<dyn Dial>, config: PoolConfig) -> Self {
        let inner = Arc::new(PoolInner {
            target: Arc::from(target.into()),
            config: config.normalized(),
            dialer,
            state: Mutex::new(PoolState::new()),
        });

        {
            let mut state = inner.lock();
            while state.standby() < inner.config.min_spares {
                inner.spawn_dial(&mut state);
            }
        }

        Self { inner }
    }

    /// TCP pool with default limits.
    pub fn with_defaults(target: impl Into<String>) -> Self {
        Self::new(target, Arc::new(TcpConnectJob::default()), PoolConfig::default())
    }

    pub fn target(&self) -> &str {
        &self.inner.target
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get a connection, waiting for a dial if no spare is ready.
    ///
    /// Waiters are served strictly in call order. Dropping the returned future
    /// before it resolves withdraws the request without other side effects.
    pub async fn acquire(&self) -> Result<Connection, NetError> {
        let (id, receiver) = match self.inner.claim_or_enqueue()? {
            Claim::Ready(conn) => return Ok(conn),
            Claim::Queued(id, receiver) => (id, receiver),
        };

        let mut guard = WaiterGuard { pool: &self.inner, id, receiver };
        (&mut guard.receiver).await.map_err(|_| NetError::PoolClosed)
    }

    /// [`acquire`](Self::acquire) with a deadline; expiry yields
    /// `ConnectionTimedOut` and withdraws the request.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Connection, NetError> {
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| NetError::ConnectionTimedOut)?
    }

    /// Whether an acquisition would complete without waiting, i.e. some ready
    /// spare is still usable.
    pub fn has_ready(&self) -> bool {
        self.inner.has_usable_spare()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            dialing: state.dialing.len(),
            ready: state.ready.len(),
            waiters: state.waiters.len(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Drop ready spares that closed, received unexpected data, or outlived
    /// `idle_timeout`, then restore the warm floor. Returns how many were dropped.
    pub fn sweep_idle(&self) -> usize {
        self.inner.sweep_idle()
    }

    /// Run [`sweep_idle`](Self::sweep_idle) every `sweep_interval` until the
    /// pool is closed or dropped.
    pub fn start_sweep_task(&self) -> JoinHandle<()> {
        let pool: Weak<PoolInner> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                if pool.lock().closed {
                    break;
                }
                pool.sweep_idle();
            }
        })
    }

    /// Tear the pool down: abort dials, drop spares, fail every waiter with
    /// `PoolClosed`. Later acquisitions fail the same way. Idempotent.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        if state.closed {
            return;
        }
        tracing::debug!(
            target = %self.inner.target,
            dialing = state.dialing.len(),
            ready = state.ready.len(),
            waiters = state.waiters.len(),
            "closing pool"
        );
        state.teardown();
    }
}

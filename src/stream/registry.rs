//! Connection lifecycle tracking and the queue API exposed to the
//! application.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Own one inbound and one outbound queue per connection
//! - Expose poll/ack/push to the application side
//! - stop_data flag: flagged connections accept no frames and yield none
//! - Tear down (and discard both queues) on transport close

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::stream::queue::{Frame, InboundQueue, OutboundQueue, QueueError};

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One live connection: a queue pair plus the transport writer the delivery
/// loop hands outbound payloads to. Queues are owned exclusively by their
/// connection; nothing is shared across connections.
pub struct Connection {
    id: ConnectionId,
    interface: String,
    inbound: Mutex<InboundQueue>,
    outbound: Mutex<OutboundQueue>,
    stop_data: AtomicBool,
    writer: mpsc::UnboundedSender<Vec<u8>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Whether this connection has been flagged to stop all data flow.
    pub fn stopped(&self) -> bool {
        self.stop_data.load(Ordering::Acquire)
    }

    /// Flag the connection: subsequent polls report nothing and enqueues
    /// are silently discarded. Orderly-shutdown mechanism; does not race
    /// the delivery loop.
    pub fn stop_data(&self) {
        self.stop_data.store(true, Ordering::Release);
    }

    /// Transport/producer side: queue a frame arriving from the peer.
    pub fn enqueue_inbound(&self, payload: Vec<u8>) {
        if self.stopped() {
            return;
        }
        lock(&self.inbound).enqueue(payload);
    }

    /// Application consumer: take the next inbound frame, if any.
    pub fn poll_inbound(&self) -> Result<Option<Frame>, QueueError> {
        if self.stopped() {
            return Ok(None);
        }
        lock(&self.inbound).poll()
    }

    /// Application consumer: acknowledge the in-flight inbound frame.
    pub fn ack_inbound(&self, frame: Frame) -> Result<(), QueueError> {
        lock(&self.inbound).ack(frame)
    }

    /// Application producer: queue a frame for delivery to the peer.
    pub fn push_outbound(&self, payload: Vec<u8>) {
        if self.stopped() {
            return;
        }
        lock(&self.outbound).push(payload);
    }

    /// Delivery loop: dequeue the next outbound payload.
    pub(crate) fn pop_outbound(&self) -> Result<Option<Vec<u8>>, QueueError> {
        if self.stopped() {
            return Ok(None);
        }
        lock(&self.outbound).pop_for_delivery()
    }

    /// Delivery loop: non-blocking handoff to the transport writer.
    pub(crate) fn write_transport(&self, payload: Vec<u8>) -> Result<(), ()> {
        self.writer.send(payload).map_err(|_| ())
    }

    fn teardown(&self) {
        self.stop_data();
        lock(&self.inbound).clear();
        lock(&self.outbound).clear();
    }

    pub fn inbound_len(&self) -> usize {
        lock(&self.inbound).len()
    }

    pub fn outbound_len(&self) -> usize {
        lock(&self.outbound).len()
    }
}

/// All open connections, created on first observed activity and removed on
/// transport close.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<u64, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection with its transport writer channel.
    pub fn open(
        &self,
        interface: impl Into<String>,
        writer: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Arc<Connection> {
        let conn = Arc::new(Connection {
            id: ConnectionId::new(),
            interface: interface.into(),
            inbound: Mutex::new(InboundQueue::default()),
            outbound: Mutex::new(OutboundQueue::default()),
            stop_data: AtomicBool::new(false),
            writer,
        });
        tracing::debug!(connection_id = %conn.id, interface = %conn.interface, "connection opened");
        self.connections.insert(conn.id.as_u64(), conn.clone());
        conn
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id.as_u64()).map(|r| r.clone())
    }

    /// Tear a connection down: stop data flow, discard both queues, remove.
    pub fn close(&self, id: ConnectionId) {
        if let Some((_, conn)) = self.connections.remove(&id.as_u64()) {
            conn.teardown();
            tracing::debug!(connection_id = %id, "connection closed");
        }
    }

    /// Snapshot of every open connection.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|r| r.clone()).collect()
    }

    /// Snapshot of the connections on one interface, for a delivery pass.
    pub fn on_interface(&self, interface: &str) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|r| r.interface() == interface)
            .map(|r| r.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    // Application-facing queue API, keyed by connection ID.

    pub fn poll_inbound(&self, id: ConnectionId) -> Result<Option<Frame>, QueueError> {
        match self.get(id) {
            Some(conn) => conn.poll_inbound(),
            None => Err(QueueError::UnknownConnection(id.as_u64())),
        }
    }

    pub fn ack_inbound(&self, id: ConnectionId, frame: Frame) -> Result<(), QueueError> {
        match self.get(id) {
            Some(conn) => conn.ack_inbound(frame),
            None => Err(QueueError::UnknownConnection(id.as_u64())),
        }
    }

    pub fn push_outbound(&self, id: ConnectionId, payload: Vec<u8>) -> Result<(), QueueError> {
        match self.get(id) {
            Some(conn) => {
                conn.push_outbound(payload);
                Ok(())
            }
            None => Err(QueueError::UnknownConnection(id.as_u64())),
        }
    }

    /// Stop all data flow on a connection without closing it.
    pub fn stop_data(&self, id: ConnectionId) -> Result<(), QueueError> {
        match self.get(id) {
            Some(conn) => {
                conn.stop_data();
                Ok(())
            }
            None => Err(QueueError::UnknownConnection(id.as_u64())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn(registry: &ConnectionRegistry) -> Arc<Connection> {
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.open("app", tx)
    }

    #[test]
    fn connection_ids_unique() {
        let registry = ConnectionRegistry::new();
        let a = open_test_conn(&registry);
        let b = open_test_conn(&registry);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn inbound_roundtrip_through_registry() {
        let registry = ConnectionRegistry::new();
        let conn = open_test_conn(&registry);
        conn.enqueue_inbound(b"set freq=7020".to_vec());

        let frame = registry.poll_inbound(conn.id()).unwrap().unwrap();
        assert_eq!(frame.payload(), b"set freq=7020");
        registry.ack_inbound(conn.id(), frame).unwrap();
        assert!(registry.poll_inbound(conn.id()).unwrap().is_none());
    }

    #[test]
    fn at_most_one_in_flight_per_connection() {
        let registry = ConnectionRegistry::new();
        let conn = open_test_conn(&registry);
        conn.enqueue_inbound(b"a".to_vec());
        conn.enqueue_inbound(b"b".to_vec());

        let held = registry.poll_inbound(conn.id()).unwrap().unwrap();
        assert_eq!(
            registry.poll_inbound(conn.id()).unwrap_err(),
            QueueError::AlreadyInFlight
        );
        registry.ack_inbound(conn.id(), held).unwrap();
        assert!(registry.poll_inbound(conn.id()).unwrap().is_some());
    }

    #[test]
    fn stopped_connection_accepts_and_yields_nothing() {
        let registry = ConnectionRegistry::new();
        let conn = open_test_conn(&registry);
        conn.enqueue_inbound(b"before".to_vec());
        conn.stop_data();

        // Discarded, not buffered.
        conn.enqueue_inbound(b"after".to_vec());
        conn.push_outbound(b"out".to_vec());
        assert_eq!(conn.inbound_len(), 1);
        assert_eq!(conn.outbound_len(), 0);

        assert!(conn.poll_inbound().unwrap().is_none());
        assert!(conn.pop_outbound().unwrap().is_none());
    }

    #[test]
    fn close_discards_queues_and_unregisters() {
        let registry = ConnectionRegistry::new();
        let conn = open_test_conn(&registry);
        let id = conn.id();
        conn.enqueue_inbound(b"pending".to_vec());
        registry.close(id);

        assert!(registry.get(id).is_none());
        assert_eq!(
            registry.poll_inbound(id).unwrap_err(),
            QueueError::UnknownConnection(id.as_u64())
        );
        assert_eq!(conn.inbound_len(), 0);
    }

    #[test]
    fn stop_data_through_registry() {
        let registry = ConnectionRegistry::new();
        let conn = open_test_conn(&registry);
        registry.stop_data(conn.id()).unwrap();
        assert!(conn.stopped());

        let gone = ConnectionId::new();
        assert_eq!(
            registry.stop_data(gone).unwrap_err(),
            QueueError::UnknownConnection(gone.as_u64())
        );
    }

    #[test]
    fn interface_snapshot_filters() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.open("app", tx);
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.open("admin", tx);

        assert_eq!(registry.on_interface("app").len(), 1);
        assert_eq!(registry.on_interface("admin").len(), 1);
        assert_eq!(registry.on_interface("other").len(), 0);
    }
}

//! Periodic, non-blocking delivery of outbound frames to the transport.
//!
//! # Responsibilities
//! - One pass per scheduling quantum over every open connection on an
//!   interface
//! - Drain each connection's entire outbound queue, in FIFO order, into its
//!   transport writer
//! - Log (and drop) on write failure without stalling the pass
//!
//! # Design Decisions
//! - The loop never blocks on a slow peer: the handoff is a channel send
//!   into the per-connection writer task that owns the websocket sink
//! - A failed write affects only that connection's remaining frames in the
//!   current pass; the loop proceeds to the next connection
//! - Back-pressure is bounded only by queue growth, which is the producer's
//!   responsibility

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::stream::registry::ConnectionRegistry;

/// Drains outbound queues for one listening interface.
pub struct DeliveryLoop {
    registry: Arc<ConnectionRegistry>,
    interface: String,
    interval: Duration,
}

impl DeliveryLoop {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        interface: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            interface: interface.into(),
            interval,
        }
    }

    /// Run until the shutdown signal fires. Each iteration performs one
    /// non-blocking pass and then yields for the fixed interval.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interface = %self.interface,
            interval_ms = self.interval.as_millis() as u64,
            "delivery loop started"
        );
        loop {
            self.pass();
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    tracing::info!(interface = %self.interface, "delivery loop stopped");
                    return;
                }
            }
        }
    }

    /// One delivery pass: visit every connection, drain its whole outbound
    /// queue. No connection is skipped in a pass.
    pub fn pass(&self) {
        for conn in self.registry.on_interface(&self.interface) {
            loop {
                let payload = match conn.pop_outbound() {
                    Ok(Some(payload)) => payload,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(connection_id = %conn.id(), error = %e, "outbound dequeue failed");
                        break;
                    }
                };
                let len = payload.len();
                if conn.write_transport(payload).is_err() {
                    // Frame is dropped; remaining frames wait for teardown.
                    tracing::warn!(
                        connection_id = %conn.id(),
                        len,
                        "transport write failed, dropping frame"
                    );
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn pass_drains_whole_queue_in_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = registry.open("app", tx);
        conn.push_outbound(b"first".to_vec());
        conn.push_outbound(b"second".to_vec());
        conn.push_outbound(b"third".to_vec());

        let looper = DeliveryLoop::new(registry, "app", Duration::from_millis(10));
        looper.pass();

        assert_eq!(rx.try_recv().unwrap(), b"first");
        assert_eq!(rx.try_recv().unwrap(), b"second");
        assert_eq!(rx.try_recv().unwrap(), b"third");
        assert!(rx.try_recv().is_err());
        assert_eq!(conn.outbound_len(), 0);
    }

    #[test]
    fn failed_write_does_not_stall_other_connections() {
        let registry = Arc::new(ConnectionRegistry::new());

        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        drop(dead_rx);
        let broken = registry.open("app", dead_tx);
        broken.push_outbound(b"lost".to_vec());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let healthy = registry.open("app", tx);
        healthy.push_outbound(b"delivered".to_vec());

        let looper = DeliveryLoop::new(registry, "app", Duration::from_millis(10));
        looper.pass();

        assert_eq!(rx.try_recv().unwrap(), b"delivered");
    }

    #[test]
    fn pass_only_touches_its_interface() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let other = registry.open("admin", tx);
        other.push_outbound(b"stays".to_vec());

        let looper = DeliveryLoop::new(registry.clone(), "app", Duration::from_millis(10));
        looper.pass();

        assert!(rx.try_recv().is_err());
        assert_eq!(other.outbound_len(), 1);
    }

    #[tokio::test]
    async fn loop_exits_on_shutdown() {
        let registry = Arc::new(ConnectionRegistry::new());
        let looper = DeliveryLoop::new(registry, "app", Duration::from_millis(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(looper.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(5)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should stop promptly")
            .unwrap();
    }
}

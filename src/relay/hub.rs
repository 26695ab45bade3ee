//! Fan-out of server events to every connected client.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;

use super::events::ServerEvent;

pub const DEFAULT_CAPACITY: usize = 256;

/// Broadcast hub shared by sockets, the chat service and the monitor.
#[derive(Debug, Clone)]
pub struct RelayHub {
    tx: broadcast::Sender<ServerEvent>,
    connections: Arc<AtomicUsize>,
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Send to every subscriber. Returns how many received it.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                // Nobody connected
                tracing::trace!(event = name, "No relay subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Track an open connection until the guard is dropped.
    pub fn connect(&self) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            connections: Arc::clone(&self.connections),
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    connections: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let hub = RelayHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert_eq!(hub.broadcast(ServerEvent::AiThinking { active: true }), 2);
        assert_eq!(a.recv().await.unwrap(), ServerEvent::AiThinking { active: true });
        assert_eq!(b.recv().await.unwrap(), ServerEvent::AiThinking { active: true });
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let hub = RelayHub::new();
        assert_eq!(hub.broadcast(ServerEvent::AiThinking { active: false }), 0);
    }

    #[test]
    fn test_connection_count() {
        let hub = RelayHub::new();
        let first = hub.connect();
        let second = hub.connect();
        assert_eq!(hub.connections(), 2);
        drop(first);
        assert_eq!(hub.connections(), 1);
        drop(second);
        assert_eq!(hub.connections(), 0);
    }
}

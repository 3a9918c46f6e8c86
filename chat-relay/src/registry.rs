use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::protocol::ServerEvent;

pub type ConnectionId = u64;

/// Addresses open connections. The relay only ever sees this trait.
pub trait ConnectionRegistry: Send + Sync {
    /// Sends the event to every open connection, including the originator.
    fn broadcast(&self, event: &ServerEvent);

    /// Sends the event to a single connection. Returns `false` if the
    /// connection is gone or could not accept the event.
    fn send_to(&self, connection: ConnectionId, event: &ServerEvent) -> bool;
}

/// Default outbox size per connection before events start being dropped.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 128;

/// Registry that hands each connection a bounded outbox channel.
///
/// The WebSocket session drains its receiver; a client too slow to keep up
/// loses events rather than stalling everybody else.
pub struct ChannelRegistry {
    connections: DashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTBOX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Opens a new connection slot and returns its id and outbox.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.connections.insert(id, tx);
        (id, rx)
    }

    pub fn unregister(&self, connection: ConnectionId) -> bool {
        self.connections.remove(&connection).is_some()
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

fn deliver(connection: ConnectionId, tx: &mpsc::Sender<ServerEvent>, event: &ServerEvent) -> bool {
    match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(connection, event = event.name(), "outbox full; dropping event");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(connection, event = event.name(), "outbox closed");
            false
        }
    }
}

impl ConnectionRegistry for ChannelRegistry {
    fn broadcast(&self, event: &ServerEvent) {
        for entry in self.connections.iter() {
            deliver(*entry.key(), entry.value(), event);
        }
    }

    fn send_to(&self, connection: ConnectionId, event: &ServerEvent) -> bool {
        match self.connections.get(&connection) {
            Some(tx) => deliver(connection, tx.value(), event),
            None => {
                debug!(connection, event = event.name(), "connection not registered");
                false
            }
        }
    }
}

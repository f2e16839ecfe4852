//! # Connection Management
//!
//! Tracks observer connections and fans messages out to them. Each
//! connection owns an unbounded outbox drained by its socket task, so a
//! broadcast never waits on a slow peer. Callers queue broadcasts while
//! still holding the scene lock; the socket write itself happens later in
//! the connection's own task.

use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use tabletop_shared::{BroadcastEnvelope, ConnectionId, ConnectionState, DisconnectReason};

use crate::clock::now_millis;
use crate::error::SceneResult;
use crate::state::StateStore;

pub mod handlers;

pub use handlers::handle_socket;

/// One observer's outbox and state
#[derive(Debug)]
struct Observer {
    sender: UnboundedSender<String>,
    state: ConnectionState,
}

/// Registry of observer connections
#[derive(Debug)]
pub struct Broadcaster {
    observers: Mutex<HashMap<ConnectionId, Observer>>,
    next_id: AtomicU64,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            // Start at 1000 to leave room for special IDs
            next_id: AtomicU64::new(1000),
        }
    }

    fn observers(&self) -> MutexGuard<'_, HashMap<ConnectionId, Observer>> {
        // Observer bookkeeping stays consistent even if a holder panicked
        self.observers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track a new connection in the `Connecting` state. The receiver is the
    /// connection's outbox.
    pub fn register(&self) -> (ConnectionId, UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded_channel();

        self.observers().insert(
            id,
            Observer {
                sender,
                state: ConnectionState::Connecting,
            },
        );
        info!("Observer {} connected", id);

        (id, receiver)
    }

    /// Mark a connection as ready for broadcasts
    pub fn open(&self, id: ConnectionId) {
        if let Some(observer) = self.observers().get_mut(&id) {
            observer.state = ConnectionState::Open;
        }
    }

    /// Forget a connection
    pub fn unregister(&self, id: ConnectionId, reason: DisconnectReason) {
        if self.observers().remove(&id).is_some() {
            info!("Observer {} disconnected ({:?})", id, reason);
        }
    }

    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.observers().get(&id).map(|observer| observer.state)
    }

    /// Number of tracked connections in any state
    pub fn connection_count(&self) -> usize {
        self.observers().len()
    }

    /// Number of connections receiving broadcasts
    pub fn open_count(&self) -> usize {
        self.observers()
            .values()
            .filter(|observer| observer.state.accepts_broadcasts())
            .count()
    }

    /// Send to every open connection. A failed send marks that connection
    /// closed and moves on. Returns how many connections were reached.
    pub fn broadcast(&self, message: &BroadcastEnvelope) -> usize {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Failed to serialize {} broadcast: {}", message.message_type, err);
                return 0;
            }
        };

        let mut delivered = 0;
        for (id, observer) in self.observers().iter_mut() {
            if !observer.state.accepts_broadcasts() {
                continue;
            }
            match observer.sender.send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    debug!("Dropping {} broadcast to closed observer {}", message.message_type, id);
                    observer.state = ConnectionState::Closed;
                }
            }
        }

        debug!("Broadcast {} to {} observers", message.message_type, delivered);
        delivered
    }

    /// Send to one connection regardless of state, unless it is closed.
    /// Returns whether the message was queued.
    pub fn send_to(&self, id: ConnectionId, message: &BroadcastEnvelope) -> bool {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Failed to serialize {} message: {}", message.message_type, err);
                return false;
            }
        };

        let mut observers = self.observers();
        let Some(observer) = observers.get_mut(&id) else {
            return false;
        };
        if observer.state == ConnectionState::Closed {
            return false;
        }
        if observer.sender.send(payload).is_err() {
            debug!("Observer {} outbox closed", id);
            observer.state = ConnectionState::Closed;
            return false;
        }
        true
    }
}

/// Full-snapshot envelope of the current scene
pub fn snapshot_message(store: &StateStore, message_type: &str) -> SceneResult<BroadcastEnvelope> {
    let data = serde_json::to_value(store.snapshot())?;
    Ok(BroadcastEnvelope::new(message_type, data, now_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabletop_shared::message::message_type;

    fn message() -> BroadcastEnvelope {
        BroadcastEnvelope::new(message_type::CAMERA_UPDATE, json!({"fov": 60}), 1)
    }

    #[test]
    fn broadcast_reaches_only_open_connections() {
        let broadcaster = Broadcaster::new();
        let (open_id, mut open_rx) = broadcaster.register();
        let (_pending_id, mut pending_rx) = broadcaster.register();
        broadcaster.open(open_id);

        assert_eq!(broadcaster.broadcast(&message()), 1);
        assert!(open_rx.try_recv().is_ok());
        assert!(pending_rx.try_recv().is_err());
    }

    #[test]
    fn closed_observer_does_not_stop_fan_out() {
        let broadcaster = Broadcaster::new();
        let (a, rx_a) = broadcaster.register();
        let (b, mut rx_b) = broadcaster.register();
        let (c, mut rx_c) = broadcaster.register();
        for id in [a, b, c] {
            broadcaster.open(id);
        }
        drop(rx_a);

        assert_eq!(broadcaster.broadcast(&message()), 2);
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
        assert_eq!(broadcaster.state(a), Some(ConnectionState::Closed));

        // Closed observers are skipped from then on
        assert_eq!(broadcaster.broadcast(&message()), 2);
    }

    #[test]
    fn send_to_targets_one_connection() {
        let broadcaster = Broadcaster::new();
        let (a, mut rx_a) = broadcaster.register();
        let (b, mut rx_b) = broadcaster.register();
        broadcaster.open(b);

        assert!(broadcaster.send_to(a, &message()));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());

        broadcaster.unregister(a, DisconnectReason::ClientRequest);
        assert!(!broadcaster.send_to(a, &message()));
        assert_eq!(broadcaster.connection_count(), 1);
    }

    #[test]
    fn snapshot_message_carries_full_scene() {
        let store = StateStore::default();
        let message = snapshot_message(&store, message_type::GAME_STATE).unwrap();
        assert_eq!(message.message_type, message_type::GAME_STATE);
        assert!(message.data["entities"].is_object());
        assert_eq!(message.data["metadata"]["schemaVersion"], json!(1));
    }
}

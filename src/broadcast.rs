//! Room broadcaster
//!
//! Every live connection owns an unbounded outbound queue. The hub keeps the
//! sending half of each queue together with the rooms the connection has
//! joined, and fans messages out to one connection, one room, one user (the
//! room named after the user id) or everyone.
//!
//! Delivery failures are logged and swallowed: a closed queue only means the
//! socket task is already on its way out.

use crate::protocol::ServerMessage;
use crate::types::ConnectionId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Sending half of a connection's outbound queue
pub type ConnectionSender = mpsc::UnboundedSender<ServerMessage>;

/// Receiving half, drained by the socket task
pub type ConnectionReceiver = mpsc::UnboundedReceiver<ServerMessage>;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("Connection {0} has closed its queue")]
    Closed(ConnectionId),
}

struct ConnectionEntry {
    sender: ConnectionSender,
    rooms: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct Hub {
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionEntry>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and hand back its id and outbound queue
    pub async fn register(&self) -> (ConnectionId, ConnectionReceiver) {
        let id = ulid::Ulid::new().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        self.connections.write().await.insert(
            id.clone(),
            ConnectionEntry {
                sender: tx,
                rooms: HashSet::new(),
            },
        );
        tracing::debug!(connection_id = %id, "Connection registered");
        (id, rx)
    }

    /// Drop a connection and all of its room memberships
    pub async fn unregister(&self, id: &str) {
        if self.connections.write().await.remove(id).is_some() {
            tracing::debug!(connection_id = %id, "Connection unregistered");
        }
    }

    /// Subscribe a connection to a room
    pub async fn join(&self, id: &str, room: &str) -> Result<(), DeliveryError> {
        let mut connections = self.connections.write().await;
        let entry = connections
            .get_mut(id)
            .ok_or_else(|| DeliveryError::UnknownConnection(id.to_string()))?;
        entry.rooms.insert(room.to_string());
        Ok(())
    }

    /// Unsubscribe a connection from a room. Returns whether it was a member.
    pub async fn leave(&self, id: &str, room: &str) -> bool {
        self.connections
            .write()
            .await
            .get_mut(id)
            .is_some_and(|c| c.rooms.remove(room))
    }

    /// Send to a single connection
    pub async fn emit(&self, id: &str, msg: ServerMessage) -> Result<(), DeliveryError> {
        let connections = self.connections.read().await;
        let entry = connections
            .get(id)
            .ok_or_else(|| DeliveryError::UnknownConnection(id.to_string()))?;
        entry
            .sender
            .send(msg)
            .map_err(|_| DeliveryError::Closed(id.to_string()))
    }

    /// Send to every member of `room`. Returns the number of connections reached.
    pub async fn message_room(&self, room: &str, msg: ServerMessage) -> usize {
        let (delivered, failures) = self.deliver(Some(room), &msg).await;
        for err in failures {
            tracing::warn!(room, event = msg.event_name(), "Room delivery failed: {}", err);
        }
        delivered
    }

    /// Send to every connection of a user (the room named after the user id)
    pub async fn message_user(&self, user_id: &str, msg: ServerMessage) -> usize {
        let (delivered, failures) = self.deliver(Some(user_id), &msg).await;
        for err in failures {
            tracing::warn!(
                user_id,
                event = msg.event_name(),
                payload = ?msg,
                "[SOCKET_ERROR] messageUser: {}",
                err
            );
        }
        delivered
    }

    /// Send to every connected client regardless of rooms
    pub async fn emit_all(&self, msg: ServerMessage) -> usize {
        let (delivered, failures) = self.deliver(None, &msg).await;
        for err in failures {
            tracing::warn!(event = msg.event_name(), "Broadcast delivery failed: {}", err);
        }
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn room_size(&self, room: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.rooms.contains(room))
            .count()
    }

    #[cfg(test)]
    pub(crate) async fn is_in_room(&self, id: &str, room: &str) -> bool {
        self.connections
            .read()
            .await
            .get(id)
            .is_some_and(|c| c.rooms.contains(room))
    }

    async fn deliver(
        &self,
        room: Option<&str>,
        msg: &ServerMessage,
    ) -> (usize, Vec<DeliveryError>) {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        let mut failures = Vec::new();

        for (id, entry) in connections.iter() {
            if let Some(room) = room {
                if !entry.rooms.contains(room) {
                    continue;
                }
            }
            match entry.sender.send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => failures.push(DeliveryError::Closed(id.clone())),
            }
        }

        (delivered, failures)
    }
}

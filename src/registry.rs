//! Participant registry: the mapping between logical participant ids and
//! live connection handles. Handles stay inside the registry/router layer;
//! raw sockets are never exposed to the rest of the engine.

use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

use crate::protocol::ServerMessage;
use crate::types::{ParticipantId, Role};

pub type ConnectionId = String;

/// Outbound side of one live connection.
pub type ConnectionHandle = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub participant_id: ParticipantId,
    pub name: String,
    pub role: Role,
}

#[derive(Default)]
pub struct Registry {
    /// participant id -> (owning connection, handle)
    handles: RwLock<HashMap<ParticipantId, (ConnectionId, ConnectionHandle)>>,
    /// connection id -> identity bound to it
    connections: RwLock<HashMap<ConnectionId, ConnectionInfo>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a participant id to a live connection. Any prior binding for the
    /// same id is overwritten silently, which is how a reconnect with a new
    /// connection takes over the identity.
    pub async fn register(
        &self,
        participant_id: ParticipantId,
        role: Role,
        name: String,
        connection_id: ConnectionId,
        handle: ConnectionHandle,
    ) {
        let mut handles = self.handles.write().await;
        let mut connections = self.connections.write().await;

        if let Some((old_connection, _)) =
            handles.insert(participant_id.clone(), (connection_id.clone(), handle))
        {
            if old_connection != connection_id {
                connections.remove(&old_connection);
            }
        }

        connections.insert(
            connection_id,
            ConnectionInfo {
                participant_id,
                name,
                role,
            },
        );
    }

    /// Release both directions of the mapping for a closed connection.
    /// No-op for connections that never registered, and leaves the
    /// participant binding alone when a reconnect has already replaced it.
    pub async fn unregister(&self, connection_id: &str) -> Option<ConnectionInfo> {
        let mut handles = self.handles.write().await;
        let mut connections = self.connections.write().await;

        let info = connections.remove(connection_id)?;
        let still_bound = handles
            .get(&info.participant_id)
            .map(|(owner, _)| owner == connection_id)
            .unwrap_or(false);
        if still_bound {
            handles.remove(&info.participant_id);
        }
        Some(info)
    }

    /// Live handle for a participant, or None while they are offline.
    pub async fn resolve(&self, participant_id: &str) -> Option<ConnectionHandle> {
        self.handles
            .read()
            .await
            .get(participant_id)
            .map(|(_, handle)| handle.clone())
    }

    /// Drop a participant's binding entirely (kick).
    pub async fn evict(&self, participant_id: &str) {
        let mut handles = self.handles.write().await;
        let mut connections = self.connections.write().await;
        if let Some((connection_id, _)) = handles.remove(participant_id) {
            connections.remove(&connection_id);
        }
    }
}

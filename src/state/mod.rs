mod answer;
mod chat;
mod question;
mod session;

use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex};
use tokio::task::AbortHandle;

use crate::config::ServerConfig;
use crate::protocol::ServerMessage;
use crate::registry::Registry;
use crate::storage::Store;
use crate::types::*;

/// Event fanned out to the session room. Connections drop events that
/// exclude them.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub except: Option<ParticipantId>,
    pub message: ServerMessage,
}

/// Pending auto-end timer for the one active question.
pub struct QuestionTimer {
    pub question_id: QuestionId,
    pub handle: AbortHandle,
}

/// Everything the per-session mutual-exclusion scope guards: the session
/// record (roster + active-question snapshot) and the pending timer handle.
/// Invariants here span entities ("clear active question" and "mark question
/// ended" must be observed together), so one lock covers them all.
#[derive(Default)]
pub struct SessionSlot {
    pub session: Option<Session>,
    pub timer: Option<QuestionTimer>,
}

/// Shared application state
pub struct AppState {
    pub(crate) slot: Mutex<SessionSlot>,
    pub store: Arc<dyn Store>,
    pub registry: Registry,
    /// Broadcast channel fanning events out to every connected client.
    room: broadcast::Sender<RoomEvent>,
    pub chat_body_limit: usize,
    /// Self-handle so the question controller can arm timer tasks that call
    /// back into the state.
    pub(crate) weak_self: Weak<AppState>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Arc<Self> {
        Self::with_config(store, &ServerConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: &ServerConfig) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(256);
        Arc::new_cyclic(|weak| Self {
            slot: Mutex::new(SessionSlot::default()),
            store,
            registry: Registry::new(),
            room: tx,
            chat_body_limit: config.chat_body_limit,
            weak_self: weak.clone(),
        })
    }

    pub fn subscribe_room(&self) -> broadcast::Receiver<RoomEvent> {
        self.room.subscribe()
    }

    /// Fan an event out to every connection in the room.
    pub fn broadcast_to_all(&self, message: ServerMessage) {
        // Ignore send errors (no receivers connected is fine)
        let _ = self.room.send(RoomEvent {
            except: None,
            message,
        });
    }

    /// Fan an event out to everyone except one participant.
    pub fn broadcast_except(&self, except: &ParticipantId, message: ServerMessage) {
        let _ = self.room.send(RoomEvent {
            except: Some(except.clone()),
            message,
        });
    }

    /// Send directly to one participant's live connection. Returns false
    /// when they are offline; the event is simply dropped.
    pub async fn send_to(&self, participant_id: &str, message: ServerMessage) -> bool {
        match self.registry.resolve(participant_id).await {
            Some(handle) => handle.send(message).is_ok(),
            None => false,
        }
    }
}

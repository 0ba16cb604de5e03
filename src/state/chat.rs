use chrono::Utc;

use super::AppState;
use crate::error::SessionError;
use crate::protocol::ServerMessage;
use crate::registry::ConnectionInfo;
use crate::storage::Store;
use crate::types::ChatMessage;

impl AppState {
    /// Append a chat message and fan it out to the whole room in arrival
    /// order. The body is trimmed and length-capped.
    pub async fn append_chat(
        &self,
        sender: &ConnectionInfo,
        body: String,
    ) -> Result<ChatMessage, SessionError> {
        let body = body.trim().to_string();
        if body.is_empty() {
            return Err(SessionError::Invalid("message must not be empty".to_string()));
        }
        if body.chars().count() > self.chat_body_limit {
            return Err(SessionError::Invalid(format!(
                "message exceeds {} characters",
                self.chat_body_limit
            )));
        }

        let _slot = self.slot.lock().await;
        let message = ChatMessage {
            id: ulid::Ulid::new().to_string(),
            sender_id: sender.participant_id.clone(),
            sender_name: sender.name.clone(),
            sender_role: sender.role,
            body,
            sent_at: Utc::now(),
        };
        self.store.insert_chat_message(&message).await?;

        self.broadcast_to_all(ServerMessage::ChatNew {
            message: message.clone(),
        });
        Ok(message)
    }

    /// Full chat log for late joiners, oldest first.
    pub async fn chat_history(&self) -> Result<Vec<ChatMessage>, SessionError> {
        let _slot = self.slot.lock().await;
        Ok(self.store.chat_messages_by_time().await?)
    }

    /// Relay a typing notice to everyone but the sender. Ephemeral: nothing
    /// is stored; receivers clear the indicator themselves after a short
    /// window.
    pub fn relay_typing(&self, sender: &ConnectionInfo) {
        self.broadcast_except(
            &sender.participant_id,
            ServerMessage::Typing {
                sender_id: sender.participant_id.clone(),
                sender_name: sender.name.clone(),
                sender_role: sender.role,
            },
        );
    }
}

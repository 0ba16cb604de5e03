use chrono::Utc;

use super::{AppState, SessionSlot};
use crate::error::SessionError;
use crate::protocol::ServerMessage;
use crate::storage::Store;
use crate::types::*;

impl AppState {
    /// Load the persisted session into the slot if the process restarted
    /// with an empty one. Must be called with the slot lock held.
    pub(super) async fn load_session_locked(
        &self,
        slot: &mut SessionSlot,
    ) -> Result<(), SessionError> {
        if slot.session.is_none() {
            slot.session = self.store.session().await?;
        }
        Ok(())
    }

    /// Create the classroom session, or re-claim the existing one with new
    /// teacher identity. The classroom always has exactly one room.
    pub async fn ensure_session(
        &self,
        teacher_id: ParticipantId,
        teacher_name: String,
    ) -> Result<Session, SessionError> {
        let teacher_name = teacher_name.trim().to_string();
        if teacher_id.is_empty() || teacher_name.is_empty() {
            return Err(SessionError::Invalid(
                "teacher id and name must not be empty".to_string(),
            ));
        }

        let mut slot = self.slot.lock().await;
        self.load_session_locked(&mut slot).await?;

        let session = match slot.session.as_mut() {
            Some(existing) => {
                existing.teacher_id = teacher_id;
                existing.teacher_name = teacher_name;
                existing.active = true;
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                let created = Session::new(teacher_id, teacher_name);
                tracing::info!("created classroom session");
                slot.session = Some(created.clone());
                created
            }
        };

        self.store.save_session(&session).await?;
        Ok(session)
    }

    /// Admit a student into the session. New ids are appended to the roster;
    /// a known id means a reconnect and only flips the online flag, leaving
    /// join time and display name alone. Returns the updated session so the
    /// caller can seed a late joiner with the in-progress question.
    pub async fn admit_participant(
        &self,
        participant_id: ParticipantId,
        display_name: String,
    ) -> Result<(Session, Participant), SessionError> {
        let display_name = display_name.trim().to_string();
        if participant_id.is_empty() || display_name.is_empty() {
            return Err(SessionError::Invalid(
                "participant id and name must not be empty".to_string(),
            ));
        }

        let mut slot = self.slot.lock().await;
        self.load_session_locked(&mut slot).await?;
        let session = slot
            .session
            .as_mut()
            .filter(|s| s.active)
            .ok_or(SessionError::NotFound("session"))?;

        let participant = match session.participant_mut(&participant_id) {
            Some(existing) => {
                existing.online = true;
                tracing::info!("student {} reconnected", existing.name);
                existing.clone()
            }
            None => {
                let joined = Participant {
                    id: participant_id,
                    name: display_name,
                    joined_at: Utc::now(),
                    online: true,
                };
                tracing::info!("student {} joined", joined.name);
                session.participants.push(joined.clone());
                joined
            }
        };
        session.updated_at = Utc::now();

        let snapshot = session.clone();
        self.store.save_session(&snapshot).await?;

        self.broadcast_except(
            &participant.id,
            ServerMessage::ParticipantJoined {
                participant: participant.clone(),
            },
        );

        Ok((snapshot, participant))
    }

    /// Mark a participant offline. Idempotent; unknown ids are ignored.
    pub async fn set_offline(&self, participant_id: &str) {
        let mut slot = self.slot.lock().await;
        let Some(session) = slot.session.as_mut() else {
            return;
        };
        let Some(participant) = session.participant_mut(participant_id) else {
            return;
        };
        participant.online = false;
        let name = participant.name.clone();
        session.updated_at = Utc::now();

        let snapshot = session.clone();
        // Disconnects have no initiator to report back to; log and move on.
        if let Err(e) = self.store.save_session(&snapshot).await {
            tracing::warn!("failed to persist offline status: {}", e);
        }

        self.broadcast_except(
            &participant_id.to_string(),
            ServerMessage::ParticipantOffline {
                participant_id: participant_id.to_string(),
                name,
            },
        );
    }

    /// Remove a participant from the session entirely. The kicked id is not
    /// blacklisted; rejoining with it creates a fresh roster entry.
    pub async fn kick_participant(
        &self,
        participant_id: &str,
        kicked_by: &str,
    ) -> Result<Participant, SessionError> {
        let mut slot = self.slot.lock().await;
        let session = slot
            .session
            .as_mut()
            .ok_or(SessionError::NotFound("session"))?;

        let position = session
            .participants
            .iter()
            .position(|p| p.id == participant_id)
            .ok_or(SessionError::NotFound("participant"))?;
        let removed = session.participants.remove(position);
        session.updated_at = Utc::now();

        let snapshot = session.clone();
        self.store.save_session(&snapshot).await?;

        // Eviction notice goes out before the connection binding is dropped.
        self.send_to(
            participant_id,
            ServerMessage::Kicked {
                reason: "You have been removed from the session by the teacher".to_string(),
            },
        )
        .await;
        self.registry.evict(participant_id).await;

        self.broadcast_except(
            &removed.id,
            ServerMessage::ParticipantKicked {
                participant_id: removed.id.clone(),
                name: removed.name.clone(),
                kicked_by: kicked_by.to_string(),
            },
        );

        tracing::info!("kicked student {} from session", removed.name);
        Ok(removed)
    }

    /// Current roster, join order.
    pub async fn roster(&self) -> Result<Vec<Participant>, SessionError> {
        let slot = self.slot.lock().await;
        Ok(slot
            .session
            .as_ref()
            .map(|s| s.participants.clone())
            .unwrap_or_default())
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.slot.lock().await.session.clone()
    }
}

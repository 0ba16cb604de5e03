//! Headless client-side state.
//!
//! Folds server events into a mirror of the session so any Rust client (a
//! TUI, a test harness) can render the classroom without owning transport
//! concerns. The reducer is pure: callers pass the current instant in, and
//! typing indicators decay through [`ClientState::prune_typing`] rather than
//! a background task.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::protocol::{QuestionPublic, QuestionResults, ServerMessage, SessionView};
use crate::types::{AnswerValue, ChatMessage, ParticipantId};

/// How long a typing indicator survives without a fresh notice.
pub const TYPING_DECAY_SECS: i64 = 3;

#[derive(Default)]
pub struct ClientState {
    pub session: Option<SessionView>,
    pub current_question: Option<QuestionPublic>,
    pub ends_at: Option<DateTime<Utc>>,
    pub has_answered: bool,
    pub last_answer: Option<AnswerValue>,
    /// Live tally count while a question runs (teacher view).
    pub answers_received: u32,
    pub results_history: Vec<QuestionResults>,
    pub chat: Vec<ChatMessage>,
    /// participant id -> (display name, last notice time)
    pub typing: HashMap<ParticipantId, (String, DateTime<Utc>)>,
    pub kicked: bool,
    pub last_error: Option<(String, String)>,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds left on the current question, clamped at zero.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.ends_at
            .map(|ends_at| (ends_at - now).num_seconds().max(0))
    }

    /// Names currently marked as typing, for an indicator line.
    pub fn typing_names(&self) -> Vec<&str> {
        self.typing.values().map(|(name, _)| name.as_str()).collect()
    }

    /// Drop typing marks older than the decay window.
    pub fn prune_typing(&mut self, now: DateTime<Utc>) {
        let decay = Duration::seconds(TYPING_DECAY_SECS);
        self.typing.retain(|_, (_, since)| now - *since < decay);
    }

    pub fn apply(&mut self, message: &ServerMessage, now: DateTime<Utc>) {
        match message {
            ServerMessage::SessionCreated { session, .. } => {
                let view = SessionView::from(session);
                if let Some(active) = &view.active_question {
                    self.current_question = Some(active.question.clone());
                    self.ends_at = Some(active.ends_at);
                }
                self.session = Some(view);
                self.kicked = false;
            }
            ServerMessage::SessionJoined { session, .. } => {
                if let Some(active) = &session.active_question {
                    self.current_question = Some(active.question.clone());
                    self.ends_at = Some(active.ends_at);
                }
                self.session = Some(session.clone());
                self.kicked = false;
            }
            ServerMessage::ParticipantJoined { participant } => {
                if let Some(session) = self.session.as_mut() {
                    session.participants.retain(|p| p.id != participant.id);
                    session.participants.push(participant.clone());
                }
            }
            ServerMessage::ParticipantOffline { participant_id, .. } => {
                if let Some(session) = self.session.as_mut() {
                    if let Some(p) = session
                        .participants
                        .iter_mut()
                        .find(|p| &p.id == participant_id)
                    {
                        p.online = false;
                    }
                }
                self.typing.remove(participant_id);
            }
            ServerMessage::ParticipantKicked { participant_id, .. } => {
                if let Some(session) = self.session.as_mut() {
                    session.participants.retain(|p| &p.id != participant_id);
                }
                self.typing.remove(participant_id);
            }
            ServerMessage::Kicked { .. } => {
                self.session = None;
                self.current_question = None;
                self.ends_at = None;
                self.has_answered = false;
                self.kicked = true;
            }
            ServerMessage::QuestionStarted { question, ends_at } => {
                self.current_question = Some(question.clone());
                self.ends_at = Some(*ends_at);
                self.has_answered = false;
                self.last_answer = None;
                self.answers_received = 0;
            }
            ServerMessage::QuestionSent { question, ends_at } => {
                self.current_question = Some(QuestionPublic::from(question));
                self.ends_at = Some(*ends_at);
                self.has_answered = false;
                self.last_answer = None;
                self.answers_received = 0;
            }
            ServerMessage::QuestionEnded { .. } => {
                self.current_question = None;
                self.ends_at = None;
                self.has_answered = false;
            }
            ServerMessage::QuestionResults { results } => {
                self.results_history
                    .retain(|r| r.question.id != results.question.id);
                self.results_history.push(results.clone());
            }
            ServerMessage::AnswerAck { answer, .. } => {
                self.has_answered = true;
                self.last_answer = Some(answer.clone());
            }
            ServerMessage::AnswerReceived { .. } => {
                self.answers_received += 1;
            }
            ServerMessage::ChatHistory { messages } => {
                self.chat = messages.clone();
            }
            ServerMessage::ChatNew { message } => {
                // A delivered message supersedes the sender's typing mark
                self.typing.remove(&message.sender_id);
                self.chat.push(message.clone());
            }
            ServerMessage::Typing {
                sender_id,
                sender_name,
                ..
            } => {
                self.typing
                    .insert(sender_id.clone(), (sender_name.clone(), now));
            }
            ServerMessage::Roster { participants } => {
                if let Some(session) = self.session.as_mut() {
                    session.participants = participants.clone();
                }
            }
            ServerMessage::History { results } => {
                self.results_history = results.clone();
            }
            ServerMessage::Error { code, msg } => {
                self.last_error = Some((code.clone(), msg.clone()));
            }
        }
    }
}

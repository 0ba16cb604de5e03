use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Teacher creates (or re-claims) the classroom session.
    CreateSession {
        teacher_id: ParticipantId,
        teacher_name: String,
    },
    /// Student joins the classroom session. The id is client-supplied and
    /// stable across reconnects.
    JoinSession {
        student_id: ParticipantId,
        student_name: String,
    },
    // Teacher-only messages
    StartQuestion {
        question: QuestionSpec,
    },
    EndQuestion {
        question_id: QuestionId,
    },
    GetResults {
        question_id: QuestionId,
    },
    GetRoster,
    KickStudent {
        student_id: ParticipantId,
    },
    // Student messages
    SubmitAnswer {
        question_id: QuestionId,
        answer: AnswerValue,
    },
    // Shared messages
    GetHistory,
    ChatSend {
        body: String,
    },
    ChatTyping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent to the teacher only. Carries the full session record including
    /// any in-flight question with its reference answer.
    SessionCreated {
        session: Session,
        server_now: String,
    },
    /// Sent to the joining student only; the embedded question view is
    /// redacted.
    SessionJoined {
        session: SessionView,
        server_now: String,
    },
    /// Everyone else learns about a new or returning roster member.
    ParticipantJoined {
        participant: Participant,
    },
    ParticipantOffline {
        participant_id: ParticipantId,
        name: String,
    },
    /// Roster-changed notice after a kick, to everyone but the kicked
    /// participant.
    ParticipantKicked {
        participant_id: ParticipantId,
        name: String,
        kicked_by: String,
    },
    /// Eviction notice to the kicked participant only.
    Kicked {
        reason: String,
    },
    /// Broadcast when a question opens (redacted view, no correct answer).
    QuestionStarted {
        question: QuestionPublic,
        ends_at: chrono::DateTime<chrono::Utc>,
    },
    /// Confirmation to the teacher, with the full spec for their own
    /// reference.
    QuestionSent {
        question: Question,
        ends_at: chrono::DateTime<chrono::Utc>,
    },
    QuestionEnded {
        question_id: QuestionId,
        reason: EndReason,
    },
    QuestionResults {
        results: QuestionResults,
    },
    /// Ack to the submitting student, with derived correctness.
    AnswerAck {
        answer_id: AnswerId,
        answer: AnswerValue,
        is_correct: Option<bool>,
    },
    /// Live tally notice to the teacher's connection only.
    AnswerReceived {
        participant_id: ParticipantId,
        participant_name: String,
        answer: AnswerValue,
        submitted_at: chrono::DateTime<chrono::Utc>,
    },
    ChatHistory {
        messages: Vec<ChatMessage>,
    },
    ChatNew {
        message: ChatMessage,
    },
    /// Ephemeral typing relay; never persisted. Receivers own the decay.
    Typing {
        sender_id: ParticipantId,
        sender_name: String,
        sender_role: Role,
    },
    Roster {
        participants: Vec<Participant>,
    },
    /// Ended questions with their results, newest first.
    History {
        results: Vec<QuestionResults>,
    },
    Error {
        code: String,
        msg: String,
    },
}

/// Public question info (no correct answer to prevent spoilers)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionPublic {
    pub id: QuestionId,
    pub kind: QuestionKind,
    pub prompt: String,
    pub options: Vec<String>,
    pub time_limit_secs: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Question> for QuestionPublic {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            kind: q.kind,
            prompt: q.prompt.clone(),
            options: q.options.clone(),
            time_limit_secs: q.time_limit_secs,
            created_at: q.created_at,
        }
    }
}

/// Session snapshot safe to send to students: the embedded active question
/// is the redacted public view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionView {
    pub id: SessionId,
    pub teacher_id: ParticipantId,
    pub teacher_name: String,
    pub active: bool,
    pub participants: Vec<Participant>,
    pub active_question: Option<ActiveQuestionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveQuestionView {
    pub question: QuestionPublic,
    pub ends_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Session> for SessionView {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id.clone(),
            teacher_id: s.teacher_id.clone(),
            teacher_name: s.teacher_name.clone(),
            active: s.active,
            participants: s.participants.clone(),
            active_question: s.active_question.as_ref().map(|aq| ActiveQuestionView {
                question: QuestionPublic::from(&aq.question),
                ends_at: aq.ends_at,
            }),
        }
    }
}

/// A question joined with all of its answers plus a value-frequency summary.
/// Computed on demand, never cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionResults {
    pub question: Question,
    pub answers: Vec<Answer>,
    pub total_answers: usize,
    /// Frequencies keyed by the canonical answer string.
    pub summary: HashMap<String, u32>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type SessionId = String;
pub type ParticipantId = String;
pub type QuestionId = String;
pub type AnswerId = String;
pub type MessageId = String;

/// The classroom always has exactly one room; every session record uses this key.
pub const SESSION_KEY: &str = "classroom";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    Boolean,
    FreeText,
}

/// Why a question stopped accepting answers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Manual,
    Timeout,
}

/// A raw answer value as submitted by a student. The wire accepts plain
/// strings, numbers, and booleans (free-text, choice index, true/false).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AnswerValue {
    /// Canonical string form, used for correctness comparison and as the
    /// results summary key. Whole numbers render without a fraction so a
    /// choice index submitted as `2` and as `"2"` count as the same bucket.
    pub fn canonical(&self) -> String {
        match self {
            AnswerValue::Bool(b) => b.to_string(),
            AnswerValue::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                format!("{}", *n as i64)
            }
            AnswerValue::Number(n) => n.to_string(),
            AnswerValue::Text(s) => s.clone(),
        }
    }
}

/// Teacher-supplied spec for a new question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
    pub time_limit_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub kind: QuestionKind,
    pub prompt: String,
    pub options: Vec<String>,
    /// Reference answer, if the question has one. Never sent to students.
    pub correct_answer: Option<String>,
    pub time_limit_secs: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// The session's embedded snapshot of the one question currently accepting
/// answers, with its wall-clock deadline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveQuestion {
    pub question: Question,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub joined_at: DateTime<Utc>,
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub teacher_id: ParticipantId,
    pub teacher_name: String,
    pub active: bool,
    /// Roster in join order.
    pub participants: Vec<Participant>,
    pub active_question: Option<ActiveQuestion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(teacher_id: ParticipantId, teacher_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: SESSION_KEY.to_string(),
            teacher_id,
            teacher_name,
            active: true,
            participants: Vec::new(),
            active_question: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub id: AnswerId,
    pub question_id: QuestionId,
    pub participant_id: ParticipantId,
    pub participant_name: String,
    pub value: AnswerValue,
    /// None when the question carries no reference answer.
    pub is_correct: Option<bool>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender_id: ParticipantId,
    pub sender_name: String,
    pub sender_role: Role,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

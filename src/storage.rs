//! Storage collaborator interface.
//!
//! The engine persists sessions, questions, answers, and chat messages
//! through this narrow trait and rebuilds history from the sorted queries
//! after a restart. Uniqueness constraints live down here: question and
//! message ids are unique, and answers are unique per
//! (question id, participant id), and a violated answer constraint is how the
//! ledger detects a duplicate submission.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::types::{Answer, ChatMessage, ParticipantId, Question, QuestionId, Session};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error("{0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn save_session(&self, session: &Session) -> Result<(), StoreError>;
    async fn session(&self) -> Result<Option<Session>, StoreError>;

    async fn insert_question(&self, question: &Question) -> Result<(), StoreError>;
    async fn update_question(&self, question: &Question) -> Result<(), StoreError>;
    async fn question(&self, id: &str) -> Result<Option<Question>, StoreError>;
    /// All questions, oldest first.
    async fn questions_by_creation(&self) -> Result<Vec<Question>, StoreError>;

    /// Fails with `Duplicate` when an answer for the same
    /// (question, participant) pair is already stored.
    async fn insert_answer(&self, answer: &Answer) -> Result<(), StoreError>;
    /// Answers for one question, oldest first.
    async fn answers_for_question(&self, question_id: &str) -> Result<Vec<Answer>, StoreError>;

    async fn insert_chat_message(&self, message: &ChatMessage) -> Result<(), StoreError>;
    /// Full chat log, oldest first.
    async fn chat_messages_by_time(&self) -> Result<Vec<ChatMessage>, StoreError>;
}

/// In-process implementation backing the single classroom session.
#[derive(Default)]
pub struct MemoryStore {
    session: RwLock<Option<Session>>,
    questions: RwLock<HashMap<QuestionId, Question>>,
    answers: RwLock<HashMap<(QuestionId, ParticipantId), Answer>>,
    chat: RwLock<Vec<ChatMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        *self.session.write().await = Some(session.clone());
        Ok(())
    }

    async fn session(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.session.read().await.clone())
    }

    async fn insert_question(&self, question: &Question) -> Result<(), StoreError> {
        let mut questions = self.questions.write().await;
        if questions.contains_key(&question.id) {
            return Err(StoreError::Duplicate("question"));
        }
        questions.insert(question.id.clone(), question.clone());
        Ok(())
    }

    async fn update_question(&self, question: &Question) -> Result<(), StoreError> {
        let mut questions = self.questions.write().await;
        questions.insert(question.id.clone(), question.clone());
        Ok(())
    }

    async fn question(&self, id: &str) -> Result<Option<Question>, StoreError> {
        Ok(self.questions.read().await.get(id).cloned())
    }

    async fn questions_by_creation(&self) -> Result<Vec<Question>, StoreError> {
        let mut questions: Vec<_> = self.questions.read().await.values().cloned().collect();
        questions.sort_by_key(|q| q.created_at);
        Ok(questions)
    }

    async fn insert_answer(&self, answer: &Answer) -> Result<(), StoreError> {
        let key = (answer.question_id.clone(), answer.participant_id.clone());
        let mut answers = self.answers.write().await;
        if answers.contains_key(&key) {
            return Err(StoreError::Duplicate("answer"));
        }
        answers.insert(key, answer.clone());
        Ok(())
    }

    async fn answers_for_question(&self, question_id: &str) -> Result<Vec<Answer>, StoreError> {
        let mut answers: Vec<_> = self
            .answers
            .read()
            .await
            .values()
            .filter(|a| a.question_id == question_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.submitted_at);
        Ok(answers)
    }

    async fn insert_chat_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let mut chat = self.chat.write().await;
        if chat.iter().any(|m| m.id == message.id) {
            return Err(StoreError::Duplicate("chat message"));
        }
        chat.push(message.clone());
        Ok(())
    }

    async fn chat_messages_by_time(&self) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self.chat.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnswerValue;
    use chrono::Utc;

    fn answer(question_id: &str, participant_id: &str, value: &str) -> Answer {
        Answer {
            id: ulid::Ulid::new().to_string(),
            question_id: question_id.to_string(),
            participant_id: participant_id.to_string(),
            participant_name: "Student".to_string(),
            value: AnswerValue::Text(value.to_string()),
            is_correct: None,
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_answer_is_rejected_and_original_kept() {
        let store = MemoryStore::new();
        let first = answer("q1", "s1", "A");
        store.insert_answer(&first).await.unwrap();

        let second = answer("q1", "s1", "B");
        let err = store.insert_answer(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("answer")));

        let stored = store.answers_for_question("q1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value, AnswerValue::Text("A".to_string()));
    }

    #[tokio::test]
    async fn same_participant_may_answer_different_questions() {
        let store = MemoryStore::new();
        store.insert_answer(&answer("q1", "s1", "A")).await.unwrap();
        store.insert_answer(&answer("q2", "s1", "B")).await.unwrap();

        assert_eq!(store.answers_for_question("q1").await.unwrap().len(), 1);
        assert_eq!(store.answers_for_question("q2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn questions_come_back_in_creation_order() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            let now = Utc::now() + chrono::Duration::milliseconds(i);
            let q = Question {
                id: ulid::Ulid::new().to_string(),
                kind: crate::types::QuestionKind::FreeText,
                prompt: format!("q{}", i),
                options: Vec::new(),
                correct_answer: None,
                time_limit_secs: 30,
                created_at: now,
                started_at: Some(now),
                ended_at: None,
                active: false,
            };
            ids.push(q.id.clone());
            store.insert_question(&q).await.unwrap();
        }

        let ordered: Vec<_> = store
            .questions_by_creation()
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(ordered, ids);
    }
}

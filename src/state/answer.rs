use chrono::Utc;
use std::collections::HashMap;

use super::AppState;
use crate::error::SessionError;
use crate::protocol::{QuestionResults, ServerMessage};
use crate::storage::{Store, StoreError};
use crate::types::*;

/// Normalize a value for correctness comparison (trim whitespace, lowercase)
fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

impl AppState {
    /// Record a student's answer. One answer per participant per question;
    /// the store's compound uniqueness constraint backs the dedup guarantee
    /// and a violation surfaces as Conflict. Answers against an ended
    /// question are rejected as NotFound; there is no window between "mark
    /// ended" and "accept answer" because both run under the session lock.
    pub async fn submit_answer(
        &self,
        question_id: &str,
        participant_id: &str,
        participant_name: &str,
        value: AnswerValue,
    ) -> Result<Answer, SessionError> {
        let slot = self.slot.lock().await;
        let question = self
            .store
            .question(question_id)
            .await?
            .ok_or(SessionError::NotFound("question"))?;
        if !question.active {
            return Err(SessionError::NotFound("active question"));
        }

        let is_correct = question
            .correct_answer
            .as_ref()
            .map(|reference| normalize(&value.canonical()) == normalize(reference));

        let answer = Answer {
            id: ulid::Ulid::new().to_string(),
            question_id: question.id.clone(),
            participant_id: participant_id.to_string(),
            participant_name: participant_name.to_string(),
            value,
            is_correct,
            submitted_at: Utc::now(),
        };

        self.store.insert_answer(&answer).await.map_err(|e| match e {
            StoreError::Duplicate(_) => SessionError::Conflict(
                "answer already submitted for this question".to_string(),
            ),
            other => other.into(),
        })?;

        // Live tally notice to the teacher's connection only
        if let Some(session) = slot.session.as_ref() {
            self.send_to(
                &session.teacher_id,
                ServerMessage::AnswerReceived {
                    participant_id: answer.participant_id.clone(),
                    participant_name: answer.participant_name.clone(),
                    answer: answer.value.clone(),
                    submitted_at: answer.submitted_at,
                },
            )
            .await;
        }

        tracing::debug!(
            "answer from {} for question {}",
            answer.participant_name,
            answer.question_id
        );
        Ok(answer)
    }

    /// Results for a question, always computed fresh from the stored
    /// answers. NotFound for unknown questions.
    pub async fn question_results(&self, question_id: &str) -> Result<QuestionResults, SessionError> {
        let _slot = self.slot.lock().await;
        let question = self
            .store
            .question(question_id)
            .await?
            .ok_or(SessionError::NotFound("question"))?;
        self.results_for(&question).await
    }

    /// Aggregation shared by the results query and question termination.
    /// Callers hold the session lock.
    pub(super) async fn results_for(
        &self,
        question: &Question,
    ) -> Result<QuestionResults, SessionError> {
        let answers = self.store.answers_for_question(&question.id).await?;

        let mut summary: HashMap<String, u32> = HashMap::new();
        for answer in &answers {
            *summary.entry(answer.value.canonical()).or_insert(0) += 1;
        }

        Ok(QuestionResults {
            question: question.clone(),
            total_answers: answers.len(),
            answers,
            summary,
        })
    }

    /// Results for every ended question, newest first.
    pub async fn session_history(&self) -> Result<Vec<QuestionResults>, SessionError> {
        let _slot = self.slot.lock().await;
        let questions = self.store.questions_by_creation().await?;

        let mut history = Vec::new();
        for question in questions.iter().rev().filter(|q| !q.active) {
            history.push(self.results_for(question).await?);
        }
        Ok(history)
    }
}

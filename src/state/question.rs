//! Question lifecycle: start, the auto-end timer, and idempotent
//! termination racing the timer against a manual end.

use chrono::{Duration, Utc};

use super::{AppState, QuestionTimer};
use crate::error::SessionError;
use crate::protocol::{QuestionPublic, ServerMessage};
use crate::storage::Store;
use crate::types::*;

impl AppState {
    /// Open a new question. Refuses with Conflict while another question is
    /// active; the single-active-question invariant is enforced here, not
    /// left to the client UI.
    pub async fn start_question(
        &self,
        spec: QuestionSpec,
        initiator: &ParticipantId,
    ) -> Result<(Question, chrono::DateTime<Utc>), SessionError> {
        if spec.time_limit_secs == 0 {
            return Err(SessionError::Invalid(
                "time limit must be positive".to_string(),
            ));
        }
        if spec.prompt.trim().is_empty() {
            return Err(SessionError::Invalid(
                "question prompt must not be empty".to_string(),
            ));
        }
        if spec.kind == QuestionKind::SingleChoice && spec.options.len() < 2 {
            return Err(SessionError::Invalid(
                "single-choice questions need at least two options".to_string(),
            ));
        }

        let mut slot = self.slot.lock().await;
        self.load_session_locked(&mut slot).await?;
        let session = slot
            .session
            .as_mut()
            .ok_or(SessionError::NotFound("session"))?;
        if session.active_question.is_some() {
            return Err(SessionError::Conflict(
                "a question is already active".to_string(),
            ));
        }

        let now = Utc::now();
        let ends_at = now + Duration::seconds(i64::from(spec.time_limit_secs));
        let question = Question {
            id: ulid::Ulid::new().to_string(),
            kind: spec.kind,
            prompt: spec.prompt,
            options: spec.options,
            correct_answer: spec.correct_answer,
            time_limit_secs: spec.time_limit_secs,
            created_at: now,
            started_at: Some(now),
            ended_at: None,
            active: true,
        };

        self.store.insert_question(&question).await?;
        session.active_question = Some(ActiveQuestion {
            question: question.clone(),
            ends_at,
        });
        session.updated_at = now;
        let snapshot = session.clone();
        self.store.save_session(&snapshot).await?;

        slot.timer = Some(self.schedule_auto_end(question.id.clone(), ends_at));

        self.broadcast_except(
            initiator,
            ServerMessage::QuestionStarted {
                question: QuestionPublic::from(&question),
                ends_at,
            },
        );

        tracing::info!(
            "question {} started, ends in {}s",
            question.id,
            spec.time_limit_secs
        );
        Ok((question, ends_at))
    }

    /// Terminate a question. Exactly one of {timer fire, manual end} performs
    /// the transition; the loser observes the already-ended state and gets
    /// the same results back without error. Returns whether this call did the
    /// transition, so the caller knows the end notices were just broadcast.
    pub async fn end_question(
        &self,
        question_id: &str,
        reason: EndReason,
    ) -> Result<(crate::protocol::QuestionResults, bool), SessionError> {
        let mut slot = self.slot.lock().await;
        let mut question = self
            .store
            .question(question_id)
            .await?
            .ok_or(SessionError::NotFound("question"))?;

        // Test-and-set under the session lock: the losing racer lands here.
        if !question.active {
            let results = self.results_for(&question).await?;
            return Ok((results, false));
        }

        question.active = false;
        question.ended_at = Some(Utc::now());
        self.store.update_question(&question).await?;

        if let Some(session) = slot.session.as_mut() {
            let points_here = session
                .active_question
                .as_ref()
                .map(|aq| aq.question.id == question.id)
                .unwrap_or(false);
            if points_here {
                session.active_question = None;
                session.updated_at = Utc::now();
                let snapshot = session.clone();
                self.store.save_session(&snapshot).await?;
            }
        }

        if let Some(timer) = slot.timer.take() {
            if timer.question_id == question.id {
                // Harmless when the timer itself got us here.
                timer.handle.abort();
            } else {
                slot.timer = Some(timer);
            }
        }

        let results = self.results_for(&question).await?;
        self.broadcast_to_all(ServerMessage::QuestionResults {
            results: results.clone(),
        });
        self.broadcast_to_all(ServerMessage::QuestionEnded {
            question_id: question.id.clone(),
            reason,
        });

        tracing::info!("question {} ended ({:?})", question.id, reason);
        Ok((results, true))
    }

    /// Reschedule the auto-end timer for a question persisted as active,
    /// e.g. after a restart with a durable store. The countdown is
    /// wall-clock-relative, so only the remaining window is slept.
    pub async fn resume_active_question(&self) -> Result<(), SessionError> {
        let mut slot = self.slot.lock().await;
        self.load_session_locked(&mut slot).await?;
        let Some(active) = slot.session.as_ref().and_then(|s| s.active_question.clone()) else {
            return Ok(());
        };

        tracing::info!(
            "resuming active question {} (ends at {})",
            active.question.id,
            active.ends_at
        );
        slot.timer = Some(self.schedule_auto_end(active.question.id, active.ends_at));
        Ok(())
    }

    fn schedule_auto_end(
        &self,
        question_id: QuestionId,
        ends_at: chrono::DateTime<Utc>,
    ) -> QuestionTimer {
        let state = self.weak_self.clone();
        let id = question_id.clone();
        let task = tokio::spawn(async move {
            let remaining = (ends_at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(remaining).await;
            // Engine already gone means there is nothing left to end
            let Some(state) = state.upgrade() else {
                return;
            };
            if let Err(e) = state.end_question(&id, EndReason::Timeout).await {
                tracing::error!("auto-end of question {} failed: {}", id, e);
            }
        });
        QuestionTimer {
            question_id,
            handle: task.abort_handle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn spec(time_limit_secs: u32) -> QuestionSpec {
        QuestionSpec {
            kind: QuestionKind::SingleChoice,
            prompt: "Pick one".to_string(),
            options: vec!["A".to_string(), "B".to_string()],
            correct_answer: Some("A".to_string()),
            time_limit_secs,
        }
    }

    async fn state_with_session() -> Arc<AppState> {
        let state = AppState::new(Arc::new(MemoryStore::new()));
        state
            .ensure_session("t1".into(), "Teacher".into())
            .await
            .unwrap();
        state
    }

    #[tokio::test]
    async fn start_rejects_zero_time_limit() {
        let state = state_with_session().await;
        let err = state
            .start_question(spec(0), &"t1".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Invalid(_)));
    }

    #[tokio::test]
    async fn second_start_while_active_is_conflict() {
        let state = state_with_session().await;
        state
            .start_question(spec(30), &"t1".to_string())
            .await
            .unwrap();

        let err = state
            .start_question(spec(30), &"t1".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
    }

    #[tokio::test]
    async fn manual_end_clears_active_question_once() {
        let state = state_with_session().await;
        let (question, _) = state
            .start_question(spec(30), &"t1".to_string())
            .await
            .unwrap();

        let (first, ended_now) = state
            .end_question(&question.id, EndReason::Manual)
            .await
            .unwrap();
        assert!(ended_now);
        assert!(!first.question.active);
        assert!(state
            .current_session()
            .await
            .unwrap()
            .active_question
            .is_none());

        // Duplicate manual end short-circuits and returns the same results
        let (second, ended_again) = state
            .end_question(&question.id, EndReason::Manual)
            .await
            .unwrap();
        assert!(!ended_again);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn timer_fires_when_no_manual_end_arrives() {
        let state = state_with_session().await;
        let (question, _) = state
            .start_question(spec(1), &"t1".to_string())
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1400)).await;

        let stored = state.store.question(&question.id).await.unwrap().unwrap();
        assert!(!stored.active);
        assert!(stored.ended_at.is_some());
        assert!(state
            .current_session()
            .await
            .unwrap()
            .active_question
            .is_none());
    }

    #[tokio::test]
    async fn manual_end_beats_the_timer_and_cancels_it() {
        let state = state_with_session().await;
        let (question, _) = state
            .start_question(spec(1), &"t1".to_string())
            .await
            .unwrap();

        let (_, ended_now) = state
            .end_question(&question.id, EndReason::Manual)
            .await
            .unwrap();
        assert!(ended_now);
        let ended_at = state
            .store
            .question(&question.id)
            .await
            .unwrap()
            .unwrap()
            .ended_at;

        // Let the would-be timer window pass; the end timestamp must not move
        tokio::time::sleep(std::time::Duration::from_millis(1400)).await;
        let stored = state.store.question(&question.id).await.unwrap().unwrap();
        assert_eq!(stored.ended_at, ended_at);
    }

    #[tokio::test]
    async fn timer_end_races_manual_end_to_a_single_transition() {
        let state = state_with_session().await;
        let (question, _) = state
            .start_question(spec(1), &"t1".to_string())
            .await
            .unwrap();

        // Fire a manual end right around the deadline
        tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
        let (manual_results, _) = state
            .end_question(&question.id, EndReason::Manual)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        let (late_results, ended_now) = state
            .end_question(&question.id, EndReason::Timeout)
            .await
            .unwrap();
        assert!(!ended_now);
        assert_eq!(manual_results, late_results);
    }

    #[tokio::test]
    async fn end_unknown_question_is_not_found() {
        let state = state_with_session().await;
        let err = state
            .end_question("nope", EndReason::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound("question")));
    }

    #[tokio::test]
    async fn resume_reschedules_a_persisted_active_question() {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone());
        state
            .ensure_session("t1".into(), "Teacher".into())
            .await
            .unwrap();
        let (question, _) = state
            .start_question(spec(1), &"t1".to_string())
            .await
            .unwrap();

        // Simulate a restart: fresh state over the same store
        let restarted = AppState::new(store.clone());
        restarted.resume_active_question().await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1400)).await;
        let stored = store.question(&question.id).await.unwrap().unwrap();
        assert!(!stored.active);
    }
}

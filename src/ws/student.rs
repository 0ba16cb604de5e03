//! Student command handlers

use crate::protocol::{QuestionPublic, ServerMessage, SessionView};
use crate::registry::ConnectionHandle;
use crate::state::AppState;
use crate::types::{AnswerValue, ParticipantId, QuestionId, Role};
use std::sync::Arc;

use super::handlers::{error_reply, require_identity};
use super::ConnCtx;

pub async fn handle_join(
    state: &Arc<AppState>,
    ctx: &mut ConnCtx,
    handle: &ConnectionHandle,
    student_id: ParticipantId,
    student_name: String,
) -> Option<ServerMessage> {
    tracing::info!("Student {} joining the session", student_name);
    match state.admit_participant(student_id, student_name).await {
        Ok((session, participant)) => {
            state
                .registry
                .register(
                    participant.id.clone(),
                    Role::Student,
                    participant.name.clone(),
                    ctx.connection_id.clone(),
                    handle.clone(),
                )
                .await;
            ctx.participant_id = Some(participant.id.clone());
            ctx.display_name = Some(participant.name.clone());

            // Seed the joiner through their own channel so snapshot, chat
            // history, and any in-progress question arrive in that order.
            let _ = handle.send(ServerMessage::SessionJoined {
                session: SessionView::from(&session),
                server_now: chrono::Utc::now().to_rfc3339(),
            });
            match state.chat_history().await {
                Ok(messages) => {
                    let _ = handle.send(ServerMessage::ChatHistory { messages });
                }
                Err(e) => tracing::warn!("failed to load chat history for joiner: {}", e),
            }
            if let Some(active) = session.active_question.as_ref() {
                let _ = handle.send(ServerMessage::QuestionStarted {
                    question: QuestionPublic::from(&active.question),
                    ends_at: active.ends_at,
                });
            }
            None
        }
        Err(e) => error_reply(e),
    }
}

pub async fn handle_submit_answer(
    state: &Arc<AppState>,
    ctx: &ConnCtx,
    question_id: QuestionId,
    answer: AnswerValue,
) -> Option<ServerMessage> {
    let who = match require_identity(ctx) {
        Ok(who) => who,
        Err(e) => return error_reply(e),
    };

    match state
        .submit_answer(&question_id, &who.participant_id, &who.name, answer)
        .await
    {
        Ok(answer) => Some(ServerMessage::AnswerAck {
            answer_id: answer.id,
            answer: answer.value,
            is_correct: answer.is_correct,
        }),
        Err(e) => error_reply(e),
    }
}

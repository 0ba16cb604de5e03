//! Teacher command handlers
//!
//! All handlers in this module require the Teacher role.
//! Authorization is checked in the main dispatch layer before calling these.

use crate::protocol::ServerMessage;
use crate::registry::ConnectionHandle;
use crate::state::AppState;
use crate::types::{EndReason, ParticipantId, QuestionSpec, Role};
use std::sync::Arc;

use super::handlers::{error_reply, require_identity};
use super::ConnCtx;

pub async fn handle_create_session(
    state: &Arc<AppState>,
    ctx: &mut ConnCtx,
    handle: &ConnectionHandle,
    teacher_id: ParticipantId,
    teacher_name: String,
) -> Option<ServerMessage> {
    tracing::info!("Teacher {} claiming the session", teacher_name);
    match state.ensure_session(teacher_id, teacher_name).await {
        Ok(session) => {
            state
                .registry
                .register(
                    session.teacher_id.clone(),
                    Role::Teacher,
                    session.teacher_name.clone(),
                    ctx.connection_id.clone(),
                    handle.clone(),
                )
                .await;
            ctx.participant_id = Some(session.teacher_id.clone());
            ctx.display_name = Some(session.teacher_name.clone());

            Some(ServerMessage::SessionCreated {
                session,
                server_now: chrono::Utc::now().to_rfc3339(),
            })
        }
        Err(e) => error_reply(e),
    }
}

pub async fn handle_start_question(
    state: &Arc<AppState>,
    ctx: &ConnCtx,
    spec: QuestionSpec,
) -> Option<ServerMessage> {
    let teacher = match require_identity(ctx) {
        Ok(teacher) => teacher,
        Err(e) => return error_reply(e),
    };

    tracing::info!("Teacher starting question: {}", spec.prompt);
    match state.start_question(spec, &teacher.participant_id).await {
        // Confirmation carries the full spec, reference answer included
        Ok((question, ends_at)) => Some(ServerMessage::QuestionSent { question, ends_at }),
        Err(e) => error_reply(e),
    }
}

pub async fn handle_end_question(
    state: &Arc<AppState>,
    question_id: String,
) -> Option<ServerMessage> {
    tracing::info!("Teacher ending question {}", question_id);
    match state.end_question(&question_id, EndReason::Manual).await {
        // First termination already broadcast results to the whole room
        Ok((_, true)) => None,
        // Duplicate end from a slow client: hand the existing results back
        Ok((results, false)) => Some(ServerMessage::QuestionResults { results }),
        Err(e) => error_reply(e),
    }
}

pub async fn handle_get_results(
    state: &Arc<AppState>,
    question_id: String,
) -> Option<ServerMessage> {
    match state.question_results(&question_id).await {
        Ok(results) => Some(ServerMessage::QuestionResults { results }),
        Err(e) => error_reply(e),
    }
}

pub async fn handle_get_roster(state: &Arc<AppState>) -> Option<ServerMessage> {
    match state.roster().await {
        Ok(participants) => Some(ServerMessage::Roster { participants }),
        Err(e) => error_reply(e),
    }
}

pub async fn handle_kick_student(
    state: &Arc<AppState>,
    ctx: &ConnCtx,
    student_id: ParticipantId,
) -> Option<ServerMessage> {
    let teacher = match require_identity(ctx) {
        Ok(teacher) => teacher,
        Err(e) => return error_reply(e),
    };

    tracing::info!("Teacher kicking student {}", student_id);
    match state.kick_participant(&student_id, &teacher.name).await {
        // Eviction notice and roster-changed broadcast happen in the state
        // layer; the teacher hears about it through the room like everyone
        Ok(_) => None,
        Err(e) => error_reply(e),
    }
}

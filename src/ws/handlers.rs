//! WebSocket message dispatch
//!
//! Entry point for handling client messages. Authorization is checked here,
//! then dispatched to role-specific handler modules. The returned message, if
//! any, is the direct reply to the sending connection; broadcast side effects
//! happen inside the state layer.

use crate::error::SessionError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ConnectionHandle, ConnectionInfo};
use crate::state::AppState;
use crate::types::Role;
use std::sync::Arc;

use super::{student, teacher, ConnCtx};

/// Macro to check teacher authorization and return early if unauthorized
macro_rules! check_teacher {
    ($ctx:expr, $action:expr) => {
        if $ctx.role != Role::Teacher {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only the teacher can {}", $action),
            });
        }
    };
}

pub(super) fn error_reply(e: SessionError) -> Option<ServerMessage> {
    Some(ServerMessage::Error {
        code: e.code().to_string(),
        msg: e.to_string(),
    })
}

/// The sender's bound identity, or Unauthorized when the connection never
/// joined.
pub(super) fn require_identity(ctx: &ConnCtx) -> Result<ConnectionInfo, SessionError> {
    ctx.identity().ok_or_else(|| {
        SessionError::Unauthorized("join the session before doing that".to_string())
    })
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    ctx: &mut ConnCtx,
    handle: &ConnectionHandle,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        // Connection messages
        ClientMessage::CreateSession {
            teacher_id,
            teacher_name,
        } => {
            check_teacher!(ctx, "create the session");
            teacher::handle_create_session(state, ctx, handle, teacher_id, teacher_name).await
        }

        ClientMessage::JoinSession {
            student_id,
            student_name,
        } => {
            if ctx.role != Role::Student {
                return Some(ServerMessage::Error {
                    code: "UNAUTHORIZED".to_string(),
                    msg: "Only students join the session; the teacher creates it".to_string(),
                });
            }
            student::handle_join(state, ctx, handle, student_id, student_name).await
        }

        // Teacher-only commands (authorization checked before dispatch)
        ClientMessage::StartQuestion { question } => {
            check_teacher!(ctx, "start questions");
            teacher::handle_start_question(state, ctx, question).await
        }

        ClientMessage::EndQuestion { question_id } => {
            check_teacher!(ctx, "end questions");
            teacher::handle_end_question(state, question_id).await
        }

        ClientMessage::GetResults { question_id } => {
            check_teacher!(ctx, "fetch results");
            teacher::handle_get_results(state, question_id).await
        }

        ClientMessage::GetRoster => {
            check_teacher!(ctx, "fetch the roster");
            teacher::handle_get_roster(state).await
        }

        ClientMessage::KickStudent { student_id } => {
            check_teacher!(ctx, "kick students");
            teacher::handle_kick_student(state, ctx, student_id).await
        }

        // Student messages
        ClientMessage::SubmitAnswer {
            question_id,
            answer,
        } => student::handle_submit_answer(state, ctx, question_id, answer).await,

        // Shared messages
        ClientMessage::GetHistory => match state.session_history().await {
            Ok(results) => Some(ServerMessage::History { results }),
            Err(e) => error_reply(e),
        },

        ClientMessage::ChatSend { body } => {
            let sender = match require_identity(ctx) {
                Ok(sender) => sender,
                Err(e) => return error_reply(e),
            };
            match state.append_chat(&sender, body).await {
                // The room broadcast covers the sender too
                Ok(_) => None,
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::ChatTyping => {
            let sender = match require_identity(ctx) {
                Ok(sender) => sender,
                Err(e) => return error_reply(e),
            };
            state.relay_typing(&sender);
            None
        }
    }
}

pub mod handlers;
mod student;
mod teacher;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ConnectionId, ConnectionInfo};
use crate::state::AppState;
use crate::types::Role;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
}

/// Per-connection context. Identity is established by the first
/// create/join message and then sticks to the connection.
pub struct ConnCtx {
    pub connection_id: ConnectionId,
    pub role: Role,
    pub participant_id: Option<String>,
    pub display_name: Option<String>,
}

impl ConnCtx {
    pub fn new(role: Role) -> Self {
        Self {
            connection_id: ulid::Ulid::new().to_string(),
            role,
            participant_id: None,
            display_name: None,
        }
    }

    pub fn identity(&self) -> Option<ConnectionInfo> {
        Some(ConnectionInfo {
            participant_id: self.participant_id.clone()?,
            name: self.display_name.clone()?,
            role: self.role,
        })
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request: role={:?}", params.role);
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, params: WsQuery, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let role = match params.role.as_deref() {
        Some("teacher") => Role::Teacher,
        _ => Role::Student,
    };
    let mut ctx = ConnCtx::new(role);
    tracing::info!(
        "WebSocket connected: role={:?}, connection={}",
        role,
        ctx.connection_id
    );

    // Direct channel for this connection; the registry hands its sender out
    // once an identity is bound.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Session-room fan-out
    let mut room_rx = state.subscribe_room();

    loop {
        tokio::select! {
            // Direct messages addressed to this participant
            direct = rx.recv() => {
                match direct {
                    Some(msg) => {
                        if send_json(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Room broadcasts; drop events that exclude this participant
            event = room_rx.recv() => {
                match event {
                    Ok(ev) => {
                        let excluded = ev.except.is_some()
                            && ev.except.as_deref() == ctx.participant_id.as_deref();
                        if !excluded && send_json(&mut sender, &ev.message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "connection {} lagged, {} events dropped",
                            ctx.connection_id,
                            skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            // Inbound client frames
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(response) =
                                    handlers::handle_message(client_msg, &mut ctx, &tx, &state)
                                        .await
                                {
                                    if send_json(&mut sender, &response).await.is_err() {
                                        tracing::error!("Failed to send response");
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                let _ = send_json(&mut sender, &error).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    handle_disconnect(&state, &ctx).await;
    tracing::info!(
        "WebSocket connection closed: role={:?}, connection={}",
        role,
        ctx.connection_id
    );
}

async fn send_json(
    sender: &mut (impl SinkExt<Message> + Unpin),
    msg: &ServerMessage,
) -> Result<(), ()> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.map_err(|_| ()),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            Ok(())
        }
    }
}

/// Release the registry binding and flip the roster entry offline. Students
/// going offline are announced to the rest of the room; a teacher disconnect
/// leaves the session active for their reconnect.
async fn handle_disconnect(state: &Arc<AppState>, ctx: &ConnCtx) {
    let Some(info) = state.registry.unregister(&ctx.connection_id).await else {
        return;
    };
    if info.role == Role::Student {
        state.set_offline(&info.participant_id).await;
        tracing::info!("student {} disconnected", info.name);
    } else {
        tracing::info!("teacher {} disconnected", info.name);
    }
}

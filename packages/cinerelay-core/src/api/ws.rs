//! Video socket handler for browser players.
//!
//! Validates the token, registers the connection with the hub, then pumps
//! hub frames out and client frames in until either side goes away.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::Deserialize;

use crate::api::{AppState, SocketKind};
use crate::identity::{resolve_identity, TokenValidator, ValidatedToken};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::protocol_constants::{INVALID_TOKEN_REASON, POLICY_VIOLATION_CLOSE_CODE};
use crate::services::ConnectedClient;

/// Query string of `GET /ws/video`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSocketParams {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub player_uuid: Option<String>,
    #[serde(default)]
    pub player_name: Option<String>,
}

/// Serializes a hub frame to a WebSocket text message.
fn to_message(frame: &ServerMessage) -> Option<Message> {
    serde_json::to_string(frame)
        .ok()
        .map(|s| Message::Text(s.into()))
}

/// Parses a client frame. Malformed JSON yields `None`; unknown types parse
/// as [`ClientMessage::Unknown`].
fn parse_client_frame(text: &str) -> Option<ClientMessage> {
    serde_json::from_str(text).ok()
}

/// Validates the socket token. A rejected token yields the close frame to
/// send before dropping the socket.
async fn admit(
    validator: &dyn TokenValidator,
    token: &str,
) -> Result<ValidatedToken, CloseFrame> {
    validator.validate(token).await.ok_or_else(|| CloseFrame {
        code: POLICY_VIOLATION_CLOSE_CODE,
        reason: INVALID_TOKEN_REASON.into(),
    })
}

/// WebSocket upgrade handler.
pub async fn video_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<VideoSocketParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_video_socket(socket, state, params))
}

async fn handle_video_socket(mut socket: WebSocket, state: AppState, params: VideoSocketParams) {
    let token = params.token.unwrap_or_default();
    let validated = match admit(state.validator.as_ref(), &token).await {
        Ok(validated) => validated,
        Err(close) => {
            log::warn!("[WS] Rejected video socket: invalid token");
            let _ = socket.send(Message::Close(Some(close))).await;
            return;
        }
    };

    let identity = resolve_identity(
        &token,
        &validated,
        params.player_uuid.as_deref(),
        params.player_name.as_deref(),
    );

    let conn_guard = state.ws_manager.register(SocketKind::Video);
    let cancel_token = conn_guard.cancel_token().clone();
    let ConnectedClient {
        generation,
        receiver: mut outbound,
    } = state.hub.connect(&token, identity);

    log::info!("[WS] Video socket {} bound to token {}", conn_guard.id(), token);

    let (mut sender, mut receiver) = socket.split();

    // Delay mode skips missed ticks rather than bursting to catch up.
    let mut heartbeat = tokio::time::interval(state.config.heartbeat_interval());
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Video socket force-closed: {}", conn_guard.id());
                break;
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match parse_client_frame(&text) {
                        Some(frame) => {
                            state.hub.handle_client_message(&token, generation, frame);
                        }
                        None => log::debug!("[WS] Ignoring malformed frame from {}", token),
                    },
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            frame = outbound.recv() => {
                // None: a newer socket took over this token.
                let Some(frame) = frame else { break };
                if let Some(msg) = to_message(&frame) {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                state.hub.ping(&token, generation);
            }
        }
    }

    state.hub.disconnect(&token, generation);
}

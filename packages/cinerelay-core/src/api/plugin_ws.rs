//! Plugin socket: the game-server side of the relay.
//!
//! Every request frame runs through the same admin command service as the
//! HTTP routes and is answered with a `PLUGIN_RESPONSE` carrying the caller's
//! correlation id.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::{AppState, SocketKind};
use crate::error::{ErrorCode, RelayError};
use crate::services::snapshot::PluginConnection;
use crate::services::{AdminCommand, RelayHub};

/// Frames sent to a plugin.
#[derive(Debug, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum PluginOutgoing {
    PluginHello {
        server_epoch_ms: u64,
        connections: Vec<PluginConnection>,
    },
    Pong {
        server_epoch_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
    },
    PluginResponse {
        status: u16,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        body: Value,
    },
}

impl PluginOutgoing {
    fn response(id: Option<Value>, status: u16, body: Value) -> Self {
        Self::PluginResponse {
            status,
            ok: (200..300).contains(&status),
            id,
            body,
        }
    }

    fn failure(id: Option<Value>, err: &RelayError) -> Self {
        log::debug!("[Plugin] Request failed ({}): {}", err.code(), err);
        Self::response(id, err.status_code().as_u16(), err.to_body())
    }

    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}

/// Builds the greeting sent when a plugin connects.
pub fn plugin_hello(hub: &RelayHub) -> PluginOutgoing {
    PluginOutgoing::PluginHello {
        server_epoch_ms: hub.now_ms(),
        connections: hub.plugin_connections(),
    }
}

/// Answers one plugin frame.
pub fn handle_plugin_message(hub: &RelayHub, text: &str) -> PluginOutgoing {
    let Ok(msg) = serde_json::from_str::<Value>(text) else {
        return PluginOutgoing::response(None, 400, json!({ "error": "invalid_json" }));
    };
    let Some(fields) = msg.as_object() else {
        return PluginOutgoing::response(None, 400, json!({ "error": "invalid_payload" }));
    };

    let id = ["id", "correlationId"]
        .iter()
        .find_map(|key| fields.get(*key).filter(|v| !v.is_null()))
        .cloned();

    let Some(raw_type) = fields.get("type").and_then(Value::as_str) else {
        return PluginOutgoing::response(id, 400, json!({ "error": "type_required" }));
    };
    let kind = raw_type.to_uppercase();

    if kind == "PING" {
        return PluginOutgoing::Pong {
            server_epoch_ms: hub.now_ms(),
            id,
        };
    }

    let Some(command) = AdminCommand::from_plugin_type(&kind) else {
        let err = RelayError::InvalidRequest(format!("unsupported type {raw_type}"));
        return PluginOutgoing::failure(id, &err);
    };

    match command.execute(hub, &msg) {
        Ok(body) => PluginOutgoing::response(id, 200, body),
        Err(err) => PluginOutgoing::failure(id, &err),
    }
}

/// WebSocket upgrade handler. The plugin token is checked by route middleware.
pub async fn plugin_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_plugin_socket(socket, state))
}

async fn handle_plugin_socket(socket: WebSocket, state: AppState) {
    let conn_guard = state.ws_manager.register(SocketKind::Plugin);
    let cancel_token = conn_guard.cancel_token().clone();
    let (mut sender, mut receiver) = socket.split();

    log::info!("[Plugin] Plugin connected: {}", conn_guard.id());

    if let Some(msg) = plugin_hello(&state.hub).to_message() {
        if sender.send(msg).await.is_err() {
            log::warn!("[Plugin] Failed to send hello, plugin disconnected");
            return;
        }
    }

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[Plugin] Plugin socket force-closed: {}", conn_guard.id());
                break;
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_plugin_message(&state.hub, &text);
                        if let Some(msg) = reply.to_message() {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    log::info!("[Plugin] Plugin disconnected: {}", conn_guard.id());
}

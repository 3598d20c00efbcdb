// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! WebSocket chat upgrade and session pumping.
//!
//! Each session is a pair of tasks: a writer forwarding fabric events to
//! the socket, and a reader feeding client frames into the fabric. An
//! invalid or missing token is refused at upgrade time.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use mangafab_chat::ClientEvent;
use mangafab_core::model::Claims;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /ws/chat?room=…&token=…
pub async fn ws_chat(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = query.token else {
        return ApiError::unauthorized("missing token").into_response();
    };
    let claims = match state.domain.validate_token(&token) {
        Ok(claims) => claims,
        Err(e) => return ApiError::from(e).into_response(),
    };
    let room = query.room.unwrap_or_else(|| "general".to_string());

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims, room))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, claims: Claims, room: String) {
    let mut handle = state.chat.join(&room, &claims.sub, &claims.username).await;
    let session_id = handle.session_id.clone();
    info!("Chat session {session_id}: '{}' in '{room}'", claims.username);

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: fabric → socket. Ends when the fabric closes the session
    // (queue overflow) or the socket rejects a send.
    let writer_session = session_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = handle.events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json)).await.is_err() {
                        debug!("[{writer_session}] WebSocket send failed, closing");
                        break;
                    }
                }
                Err(e) => warn!("[{writer_session}] Event encode failed: {e}"),
            }
        }
        let _ = ws_tx.close().await;
    });

    // Reader: socket → fabric.
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::Message { message, room: target }) => {
                    let target = if target.is_empty() { room.clone() } else { target };
                    if let Err(e) = state
                        .chat
                        .publish_message(&target, &session_id, &message)
                        .await
                    {
                        debug!("[{session_id}] Message rejected: {e}");
                    }
                }
                Err(e) => {
                    debug!("[{session_id}] Unparseable client frame: {e}");
                }
            },
            Ok(Message::Close(_)) => {
                debug!("[{session_id}] Client closed");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_)) => {}
            Err(e) => {
                debug!("[{session_id}] WebSocket error: {e}");
                break;
            }
        }
    }

    // Close propagates: leave the room, then stop the writer.
    state.chat.leave(&room, &session_id).await;
    writer.abort();
    info!("Chat session {session_id} ended");
}

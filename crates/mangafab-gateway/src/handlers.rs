// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! HTTP request handlers for the REST API.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

pub mod accounts;
pub mod catalog;
pub mod users;

/// GET /api/v1/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "tcp_sessions": state.tcp_users.session_count(),
        "sse_progress_clients": state.progress_hub.client_count(),
        "sse_notification_clients": state.notify_hub.client_count(),
        "chat_rooms": state.chat.room_count().await,
    }))
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Registration, login, logout.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .domain
        .register(&req.username, &req.email, &req.password)?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

/// POST /api/v1/auth/login
///
/// On success the gateway also opens the user's singleton TCP session to
/// the progress bus, making SSE progress streams live immediately.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, user) = state.domain.login(&req.identifier, &req.password)?;
    state.tcp_users.connect_user(&user.id);
    Ok(Json(serde_json::json!({ "token": token, "user": user })))
}

/// POST /api/v1/auth/logout — drops the per-user TCP session.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Json<serde_json::Value> {
    state.tcp_users.disconnect_user(&claims.sub);
    Json(serde_json::json!({ "status": "ok" }))
}

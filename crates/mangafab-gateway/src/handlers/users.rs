// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Self-service endpoints: profile, library, progress.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use mangafab_core::model::{LibraryStatus, ProgressUpdate};
use mangafab_core::service::{ProfilePatch, ProgressItem};

use crate::auth::AuthUser;
use crate::effects::{spawn_library_effects, spawn_progress_effects};
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/v1/users/profile
pub async fn profile(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.domain.profile(&claims.sub)?;
    Ok(Json(serde_json::json!({ "user": user })))
}

/// PUT /api/v1/users/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.domain.update_profile(&claims.sub, &patch)?;
    Ok(Json(serde_json::json!({ "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// PUT /api/v1/users/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .domain
        .change_password(&claims.sub, &req.current_password, &req.new_password)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// GET /api/v1/users/library
pub async fn library(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entries = state.domain.get_library(&claims.sub)?;
    Ok(Json(serde_json::json!({ "library": entries })))
}

#[derive(Debug, Deserialize)]
pub struct LibraryFilter {
    pub status: LibraryStatus,
}

/// GET /api/v1/users/library/filtered?status=reading
pub async fn library_filtered(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Query(filter): Query<LibraryFilter>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entries = state.domain.library_filtered(&claims.sub, filter.status)?;
    Ok(Json(serde_json::json!({ "library": entries })))
}

/// GET /api/v1/users/library/stats
pub async fn library_stats(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = state.domain.library_stats(&claims.sub)?;
    Ok(Json(serde_json::json!(stats)))
}

#[derive(Debug, Deserialize)]
pub struct AddLibraryRequest {
    pub manga_id: String,
    pub status: LibraryStatus,
}

/// POST /api/v1/users/library
pub async fn add_to_library(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(req): Json<AddLibraryRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let change = state
        .domain
        .add_to_library(&claims.sub, &req.manga_id, req.status)?;
    let changed = change.changed;
    if changed {
        spawn_library_effects(&state, &claims.username, change, false);
    }
    Ok(Json(serde_json::json!({ "status": "ok", "changed": changed })))
}

/// DELETE /api/v1/users/library/:manga_id
pub async fn remove_from_library(
    State(state): State<Arc<AppState>>,
    Path(manga_id): Path<String>,
    AuthUser(claims): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let change = state.domain.remove_from_library(&claims.sub, &manga_id)?;
    spawn_library_effects(&state, &claims.username, change, true);
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// PUT /api/v1/users/progress
pub async fn update_progress(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let event = state.domain.update_progress(&claims.sub, &update)?;
    spawn_progress_effects(&state, event.clone());
    Ok(Json(serde_json::json!({ "status": "ok", "progress": event })))
}

/// PUT /api/v1/users/progress/batch
pub async fn update_progress_batch(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(items): Json<Vec<ProgressItem>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (events, failures) = state.domain.progress_batch(&claims.sub, &items)?;
    for event in &events {
        spawn_progress_effects(&state, event.clone());
    }
    Ok(Json(serde_json::json!({
        "updated": events.len(),
        "failed": failures,
    })))
}

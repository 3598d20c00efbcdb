// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Catalog reads, ratings, and the admin-only mutations.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use mangafab_core::model::{MangaPatch, NewManga, SearchQuery};

use crate::auth::{ensure_admin, AuthUser, OptionalUser};
use crate::effects::spawn_manga_effects;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/v1/manga — paged catalog search.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let results = state.domain.search_manga(&query)?;
    Ok(Json(serde_json::json!({
        "manga": results,
        "page": query.page,
        "limit": query.limit,
    })))
}

/// GET /api/v1/manga/:id
pub async fn get_manga(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let manga = state.domain.get_manga(&id)?;
    Ok(Json(serde_json::json!({ "manga": manga })))
}

#[derive(Debug, Deserialize)]
pub struct ChapterQuery {
    /// Comma-separated language filter.
    #[serde(default)]
    pub langs: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

/// GET /api/v1/manga/:id/chapters
pub async fn chapters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ChapterQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let langs: Vec<String> = query
        .langs
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.trim().to_string())
        .collect();
    let chapters = state.domain.chapter_list(
        &id,
        &langs,
        query.limit.unwrap_or(100),
        query.offset.unwrap_or(0),
    )?;
    Ok(Json(serde_json::json!({ "chapters": chapters })))
}

#[derive(Debug, Deserialize)]
pub struct PagesQuery {
    #[serde(default)]
    pub source: Option<String>,
}

/// GET /api/v1/manga/chapters/:chapter_id/pages
pub async fn chapter_pages(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<String>,
    Query(query): Query<PagesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pages = state
        .domain
        .chapter_pages(&chapter_id, query.source.as_deref())?;
    Ok(Json(serde_json::json!(pages)))
}

/// GET /api/v1/manga/:id/ratings — optional auth tailors `user_rating`.
pub async fn rating_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    OptionalUser(claims): OptionalUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let viewer = claims.as_ref().map(|c| c.sub.as_str());
    let stats = state.domain.rating_stats(&id, viewer)?;
    Ok(Json(serde_json::json!(stats)))
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: u8,
}

/// POST /api/v1/manga/:id/rating
pub async fn rate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AuthUser(claims): AuthUser,
    Json(req): Json<RateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.domain.rate_manga(&claims.sub, &id, req.rating)?;
    let stats = state.domain.rating_stats(&id, Some(&claims.sub))?;
    Ok(Json(serde_json::json!(stats)))
}

/// DELETE /api/v1/manga/:id/rating
pub async fn unrate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AuthUser(claims): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.domain.delete_rating(&claims.sub, &id)?;
    let stats = state.domain.rating_stats(&id, Some(&claims.sub))?;
    Ok(Json(serde_json::json!(stats)))
}

/// GET /api/v1/manga/genres
pub async fn genres(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(serde_json::json!({ "genres": state.domain.genres()? })))
}

#[derive(Debug, Deserialize)]
pub struct PopularQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

/// GET /api/v1/manga/popular
pub async fn popular(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PopularQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let manga = state.domain.popular_manga(query.limit.unwrap_or(10))?;
    Ok(Json(serde_json::json!({ "manga": manga })))
}

/// GET /api/v1/manga/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(serde_json::json!(state.domain.catalog_stats()?)))
}

/// POST /api/v1/manga — admin only; notifies `manga_update`.
pub async fn create_manga(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(new): Json<NewManga>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_admin(&state, &claims)?;
    let manga = state.domain.create_manga(&new)?;
    spawn_manga_effects(
        &state,
        "manga_update",
        manga.id.clone(),
        format!("New manga added: {} by {}", manga.title, manga.author),
    );
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "manga": manga }))))
}

/// PUT /api/v1/manga/:id — admin only; notifies `chapter_release` when
/// the chapter count grew, `manga_update` otherwise.
pub async fn update_manga(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AuthUser(claims): AuthUser,
    Json(patch): Json<MangaPatch>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_admin(&state, &claims)?;
    let before = state.domain.get_manga(&id)?;
    let manga = state.domain.update_manga(&id, &patch)?;

    let (kind, message) = if manga.total_chapters > before.total_chapters {
        (
            "chapter_release",
            format!(
                "New chapter of {}: chapter {}",
                manga.title, manga.total_chapters
            ),
        )
    } else {
        ("manga_update", format!("{} was updated", manga.title))
    };
    spawn_manga_effects(&state, kind, manga.id.clone(), message);

    Ok(Json(serde_json::json!({ "manga": manga })))
}

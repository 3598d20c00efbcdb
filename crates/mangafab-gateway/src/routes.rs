// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Route definitions and middleware assembly for the REST surface.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::handlers;
use crate::limit::rate_limit_middleware;
use crate::sse;
use crate::state::AppState;
use crate::ws;

pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/v1/health", get(handlers::health))
        // Accounts
        .route("/api/v1/auth/register", post(handlers::accounts::register))
        .route("/api/v1/auth/login", post(handlers::accounts::login))
        .route("/api/v1/auth/logout", post(handlers::accounts::logout))
        // Catalog (optional auth)
        .route("/api/v1/manga", get(handlers::catalog::search).post(handlers::catalog::create_manga))
        .route("/api/v1/manga/genres", get(handlers::catalog::genres))
        .route("/api/v1/manga/popular", get(handlers::catalog::popular))
        .route("/api/v1/manga/stats", get(handlers::catalog::stats))
        .route(
            "/api/v1/manga/chapters/:chapter_id/pages",
            get(handlers::catalog::chapter_pages),
        )
        .route(
            "/api/v1/manga/:id",
            get(handlers::catalog::get_manga).put(handlers::catalog::update_manga),
        )
        .route("/api/v1/manga/:id/chapters", get(handlers::catalog::chapters))
        .route("/api/v1/manga/:id/ratings", get(handlers::catalog::rating_stats))
        .route(
            "/api/v1/manga/:id/rating",
            post(handlers::catalog::rate).delete(handlers::catalog::unrate),
        )
        // Self
        .route(
            "/api/v1/users/profile",
            get(handlers::users::profile).put(handlers::users::update_profile),
        )
        .route("/api/v1/users/password", put(handlers::users::change_password))
        // Library
        .route(
            "/api/v1/users/library",
            get(handlers::users::library).post(handlers::users::add_to_library),
        )
        .route(
            "/api/v1/users/library/filtered",
            get(handlers::users::library_filtered),
        )
        .route("/api/v1/users/library/stats", get(handlers::users::library_stats))
        .route(
            "/api/v1/users/library/:manga_id",
            delete(handlers::users::remove_from_library),
        )
        // Progress
        .route("/api/v1/users/progress", put(handlers::users::update_progress))
        .route(
            "/api/v1/users/progress/batch",
            put(handlers::users::update_progress_batch),
        )
        // Streams
        .route("/sse/progress", get(sse::sse_progress))
        .route("/sse/notifications", get(sse::sse_notifications))
        .route("/ws/chat", get(ws::ws_chat));

    api.layer(cors_layer(&state))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.max_request_size))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    if state.config.allow_any_origin() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = state
        .config
        .cors_allow_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Dropping unparseable CORS origin '{o}'");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

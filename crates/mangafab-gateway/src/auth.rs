// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Bearer-token extractors.
//!
//! Tokens arrive in `Authorization: Bearer …` or, for WebSocket/SSE
//! clients that cannot set headers, as a `?token=` query parameter.
//! [`AuthUser`] rejects with 401; [`OptionalUser`] tailors the response
//! when a valid token is present but stays anonymous otherwise.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::sync::Arc;

use mangafab_core::model::Claims;

use crate::error::ApiError;
use crate::state::AppState;

/// A verified caller.
pub struct AuthUser(pub Claims);

/// A caller that may or may not be authenticated (optional-auth mode).
pub struct OptionalUser(pub Option<Claims>);

/// Pull the raw bearer token out of headers or the query string.
pub fn token_from_parts(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(token) = text.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }
    query_param(parts.uri.query().unwrap_or(""), "token")
}

/// Minimal query-string lookup; bearer tokens carry no reserved
/// characters so no percent-decoding is needed.
pub fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts)
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
        let claims = state.domain.validate_token(&token)?;
        Ok(Self(claims))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OptionalUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = token_from_parts(parts)
            .and_then(|token| state.domain.validate_token(&token).ok());
        Ok(Self(claims))
    }
}

/// Admin gate for catalog mutation endpoints.
pub fn ensure_admin(state: &AppState, claims: &Claims) -> Result<(), ApiError> {
    if state.config.is_admin(&claims.username) {
        Ok(())
    } else {
        Err(ApiError::forbidden("admin access required"))
    }
}

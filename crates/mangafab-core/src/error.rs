// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Error taxonomy for domain operations.
//!
//! Every operation either returns a value or one of these kinds. The
//! gateway maps kinds onto HTTP statuses and gRPC `{success, error}`
//! tuples; nothing below this layer knows about transports.

use thiserror::Error;

/// Categorized domain error.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed payload, bad enum value, out-of-range rating.
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credentials/token.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (admin-only operation).
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate username/email or equivalent uniqueness breach.
    #[error("{0}")]
    Conflict(String),

    #[error("rate limit exceeded")]
    RateLimited,

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(String),
}

impl From<rusqlite::Error> for DomainError {
    fn from(e: rusqlite::Error) -> Self {
        if is_unique_violation(&e) {
            return Self::Conflict("already exists".into());
        }
        Self::Store(e.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        Self::Store(format!("encoding error: {e}"))
    }
}

/// True when the error is a SQLite UNIQUE/PRIMARY KEY violation.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(info, _)
            if info.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Helper Result type.
pub type Result<T, E = DomainError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::Conflict("username taken".into());
        assert_eq!(err.to_string(), "username taken");

        let err = DomainError::Store("disk full".into());
        assert!(err.to_string().contains("disk full"));
    }
}

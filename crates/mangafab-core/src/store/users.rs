// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! User rows.

use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::{optional, parse_ts, Store};
use crate::error::{DomainError, Result};
use crate::model::User;

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: parse_ts(4, row.get::<_, String>(4)?)?,
    })
}

const USER_COLS: &str = "id, username, email, password_hash, created_at";

impl Store {
    /// Insert a new user. Username and email uniqueness is enforced by the
    /// schema and surfaces as [`DomainError::Conflict`].
    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password_hash, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id,
                    user.username,
                    user.email,
                    user.password_hash,
                    user.created_at.to_rfc3339()
                ],
            )
            .map_err(|e| match DomainError::from(e) {
                DomainError::Conflict(_) => {
                    DomainError::Conflict("username or email already taken".into())
                }
                other => other,
            })?;
            Ok(())
        })?;
        Ok(user)
    }

    pub fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            optional(conn.query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            ))
        })
    }

    /// Look up by either username or email (login identifier).
    pub fn user_by_identifier(&self, ident: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            optional(conn.query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE username = ?1 OR email = ?1"),
                params![ident],
                user_from_row,
            ))
        })
    }

    /// Update username and/or email; `None` keeps the current value.
    pub fn update_user_profile(
        &self,
        user_id: &str,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<User> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET username = COALESCE(?2, username), \
                     email = COALESCE(?3, email) WHERE id = ?1",
                    params![user_id, username, email],
                )
                .map_err(|e| match DomainError::from(e) {
                    DomainError::Conflict(_) => {
                        DomainError::Conflict("username or email already taken".into())
                    }
                    other => other,
                })?;
            if changed == 0 {
                return Err(DomainError::NotFound("user not found".into()));
            }
            optional(conn.query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
                params![user_id],
                user_from_row,
            ))?
            .ok_or_else(|| DomainError::NotFound("user not found".into()))
        })
    }

    pub fn update_user_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?2 WHERE id = ?1",
                params![user_id, password_hash],
            )?;
            if changed == 0 {
                return Err(DomainError::NotFound("user not found".into()));
            }
            Ok(())
        })
    }

    pub(crate) fn user_count(&self) -> Result<u32> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let store = Store::open_in_memory().unwrap();
        let user = store.create_user("casca", "casca@example.com", "h").unwrap();

        let by_id = store.user_by_id(&user.id).unwrap().unwrap();
        assert_eq!(by_id.username, "casca");

        let by_name = store.user_by_identifier("casca").unwrap().unwrap();
        let by_mail = store.user_by_identifier("casca@example.com").unwrap().unwrap();
        assert_eq!(by_name.id, by_mail.id);

        assert!(store.user_by_identifier("nobody").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let store = Store::open_in_memory().unwrap();
        store.create_user("judeau", "j@example.com", "h").unwrap();

        let err = store.create_user("judeau", "j2@example.com", "h").unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let err = store.create_user("judeau2", "j@example.com", "h").unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn test_profile_update_conflict() {
        let store = Store::open_in_memory().unwrap();
        store.create_user("pippin", "p@example.com", "h").unwrap();
        let rickert = store.create_user("rickert", "r@example.com", "h").unwrap();

        let err = store
            .update_user_profile(&rickert.id, Some("pippin"), None)
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let updated = store
            .update_user_profile(&rickert.id, None, Some("rickert@example.com"))
            .unwrap();
        assert_eq!(updated.email, "rickert@example.com");
        assert_eq!(updated.username, "rickert");
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Library and progress rows.
//!
//! The two relations are strictly separate: `library` is collection
//! membership with a status, `progress` is a last-read position. A user
//! may hold progress for a manga that is not in their library.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::params;

use super::{manga_from_row, optional, parse_ts, Store, MANGA_COLS, MANGA_RATING_JOIN};
use crate::error::{DomainError, Result};
use crate::model::{LibraryItem, LibraryStats, LibraryStatus, ProgressRecord};

impl Store {
    /// Insert or update a library entry.
    ///
    /// Returns `false` when the entry already existed with the same status
    /// (idempotent re-add), `true` when a row was created or its status
    /// changed.
    pub fn upsert_library(
        &self,
        user_id: &str,
        manga_id: &str,
        status: LibraryStatus,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let existing: Option<String> = optional(conn.query_row(
                "SELECT status FROM library WHERE user_id = ?1 AND manga_id = ?2",
                params![user_id, manga_id],
                |r| r.get(0),
            ))?;
            match existing {
                Some(s) if s == status.as_str() => Ok(false),
                Some(_) => {
                    conn.execute(
                        "UPDATE library SET status = ?3, last_updated = ?4 \
                         WHERE user_id = ?1 AND manga_id = ?2",
                        params![user_id, manga_id, status.as_str(), now],
                    )?;
                    Ok(true)
                }
                None => {
                    conn.execute(
                        "INSERT INTO library (user_id, manga_id, status, added_at, last_updated) \
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![user_id, manga_id, status.as_str(), now],
                    )?;
                    Ok(true)
                }
            }
        })
    }

    /// Remove a library entry; `Err(NotFound)` when absent.
    pub fn remove_library(&self, user_id: &str, manga_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM library WHERE user_id = ?1 AND manga_id = ?2",
                params![user_id, manga_id],
            )?;
            if changed == 0 {
                return Err(DomainError::NotFound("library entry not found".into()));
            }
            Ok(())
        })
    }

    /// The user's library joined with manga and (when present) progress.
    /// An empty status filter returns everything.
    pub fn library_for_user(
        &self,
        user_id: &str,
        status: Option<LibraryStatus>,
    ) -> Result<Vec<LibraryItem>> {
        let sql = format!(
            "SELECT {MANGA_COLS}, l.status, l.added_at, l.last_updated, p.current_chapter \
             FROM library l \
             JOIN manga m ON m.id = l.manga_id \
             {MANGA_RATING_JOIN} \
             LEFT JOIN progress p ON p.user_id = l.user_id AND p.manga_id = l.manga_id \
             WHERE l.user_id = ?1 AND (?2 = '' OR l.status = ?2) \
             ORDER BY l.last_updated DESC"
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![user_id, status.map(|s| s.as_str()).unwrap_or("")],
                |row| {
                    let manga = manga_from_row(row)?;
                    let status_s: String = row.get(12)?;
                    Ok((
                        manga,
                        status_s,
                        parse_ts(13, row.get::<_, String>(13)?)?,
                        parse_ts(14, row.get::<_, String>(14)?)?,
                        row.get::<_, Option<u32>>(15)?,
                    ))
                },
            )?;
            let mut items = Vec::new();
            for row in rows {
                let (manga, status_s, added_at, last_updated, current_chapter) = row?;
                items.push(LibraryItem {
                    manga,
                    status: LibraryStatus::parse(&status_s)?,
                    added_at,
                    last_updated,
                    current_chapter,
                });
            }
            Ok(items)
        })
    }

    pub fn library_stats(&self, user_id: &str) -> Result<LibraryStats> {
        self.with_conn(|conn| {
            let mut by_status = BTreeMap::new();
            let mut total = 0u32;
            {
                let mut stmt = conn.prepare(
                    "SELECT status, COUNT(*) FROM library WHERE user_id = ?1 GROUP BY status",
                )?;
                let rows = stmt.query_map(params![user_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
                })?;
                for row in rows {
                    let (status, count) = row?;
                    total += count;
                    by_status.insert(status, count);
                }
            }
            let progress_entries: u32 = conn.query_row(
                "SELECT COUNT(*) FROM progress WHERE user_id = ?1",
                params![user_id],
                |r| r.get(0),
            )?;
            Ok(LibraryStats {
                total,
                by_status,
                progress_entries,
            })
        })
    }

    /// Insert or overwrite the reading position for (user, manga).
    /// Writing an identical chapter is allowed; callers re-emit the event.
    pub fn upsert_progress(
        &self,
        user_id: &str,
        manga_id: &str,
        current_chapter: u32,
    ) -> Result<ProgressRecord> {
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO progress (user_id, manga_id, current_chapter, last_read_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(user_id, manga_id) \
                 DO UPDATE SET current_chapter = ?3, last_read_at = ?4",
                params![user_id, manga_id, current_chapter, now.to_rfc3339()],
            )?;
            Ok(())
        })?;
        Ok(ProgressRecord {
            user_id: user_id.to_string(),
            manga_id: manga_id.to_string(),
            current_chapter,
            last_read_at: now,
        })
    }

    pub fn progress_for_pair(
        &self,
        user_id: &str,
        manga_id: &str,
    ) -> Result<Option<ProgressRecord>> {
        self.with_conn(|conn| {
            optional(conn.query_row(
                "SELECT user_id, manga_id, current_chapter, last_read_at \
                 FROM progress WHERE user_id = ?1 AND manga_id = ?2",
                params![user_id, manga_id],
                |row| {
                    Ok(ProgressRecord {
                        user_id: row.get(0)?,
                        manga_id: row.get(1)?,
                        current_chapter: row.get(2)?,
                        last_read_at: parse_ts(3, row.get::<_, String>(3)?)?,
                    })
                },
            ))
        })
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Durable store (SQLite backend).
//!
//! Single-writer embedded database; the schema is created on open. All
//! access goes through [`Store`], which is cheap to clone and safe to share
//! across tasks. Locks are held only for the duration of one statement
//! batch, never across network I/O.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};

use crate::error::{DomainError, Result};
use crate::model::{Chapter, Manga, MangaStatus};

mod catalog;
mod library;
mod ratings;
mod users;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS manga (
    id               TEXT PRIMARY KEY,
    title            TEXT NOT NULL,
    author           TEXT NOT NULL DEFAULT '',
    status           TEXT NOT NULL,
    total_chapters   INTEGER NOT NULL DEFAULT 0,
    genres           TEXT NOT NULL,
    description      TEXT NOT NULL DEFAULT '',
    cover_url        TEXT,
    publication_year INTEGER,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chapters (
    id           TEXT PRIMARY KEY,
    manga_id     TEXT NOT NULL REFERENCES manga(id) ON DELETE CASCADE,
    number       REAL NOT NULL,
    volume       INTEGER,
    title        TEXT NOT NULL DEFAULT '',
    language     TEXT NOT NULL DEFAULT 'en',
    source       TEXT NOT NULL DEFAULT '',
    published_at TEXT,
    pages        TEXT NOT NULL DEFAULT '[]',
    external_url TEXT,
    is_external  INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_chapters_manga ON chapters(manga_id, number);

CREATE TABLE IF NOT EXISTS library (
    user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    manga_id     TEXT NOT NULL REFERENCES manga(id) ON DELETE CASCADE,
    status       TEXT NOT NULL,
    added_at     TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    PRIMARY KEY (user_id, manga_id)
);

CREATE TABLE IF NOT EXISTS progress (
    user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    manga_id        TEXT NOT NULL REFERENCES manga(id) ON DELETE CASCADE,
    current_chapter INTEGER NOT NULL DEFAULT 0,
    last_read_at    TEXT NOT NULL,
    PRIMARY KEY (user_id, manga_id)
);

CREATE TABLE IF NOT EXISTS ratings (
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    manga_id   TEXT NOT NULL REFERENCES manga(id) ON DELETE CASCADE,
    value      INTEGER NOT NULL CHECK (value BETWEEN 1 AND 5),
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, manga_id)
);
"#;

/// Handle to the embedded database.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with the connection lock held.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }
}

// Column order shared by every manga SELECT.
pub(crate) const MANGA_COLS: &str = "m.id, m.title, m.author, m.status, m.total_chapters, \
     m.genres, m.description, m.cover_url, m.publication_year, m.created_at, \
     COALESCE(r.avg_value, 0.0), COALESCE(r.cnt, 0)";

pub(crate) const MANGA_RATING_JOIN: &str = "LEFT JOIN (SELECT manga_id, AVG(value) AS avg_value, \
     COUNT(*) AS cnt FROM ratings GROUP BY manga_id) r ON r.manga_id = m.id";

pub(crate) fn manga_from_row(row: &Row<'_>) -> rusqlite::Result<Manga> {
    let status_s: String = row.get(3)?;
    let genres_s: String = row.get(5)?;
    Ok(Manga {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        status: MangaStatus::parse(&status_s).map_err(|e| conversion_err(3, e))?,
        total_chapters: row.get(4)?,
        genres: serde_json::from_str(&genres_s).map_err(|e| conversion_err(5, e))?,
        description: row.get(6)?,
        cover_url: row.get(7)?,
        publication_year: row.get(8)?,
        created_at: parse_ts(9, row.get::<_, String>(9)?)?,
        rating: row.get(10)?,
        rating_count: row.get(11)?,
    })
}

pub(crate) fn chapter_from_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    let pages_s: String = row.get(8)?;
    let published: Option<String> = row.get(7)?;
    Ok(Chapter {
        id: row.get(0)?,
        manga_id: row.get(1)?,
        number: row.get(2)?,
        volume: row.get(3)?,
        title: row.get(4)?,
        language: row.get(5)?,
        source: row.get(6)?,
        published_at: published.map(|s| parse_ts(7, s)).transpose()?,
        pages: serde_json::from_str(&pages_s).map_err(|e| conversion_err(8, e))?,
        external_url: row.get(9)?,
        is_external: row.get::<_, i64>(10)? != 0,
    })
}

/// Parse an RFC 3339 column into a UTC timestamp.
pub(crate) fn parse_ts(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Map a "no rows" result to `None`, anything else through.
pub(crate) fn optional<T>(res: rusqlite::Result<T>) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DomainError::from(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_bootstraps() {
        let store = Store::open_in_memory().unwrap();
        // Idempotent: opening twice over the same file must not fail.
        store
            .with_conn(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mangafab.db");
        let store = Store::open(&path).unwrap();
        drop(store);
        // Re-open over the existing file.
        Store::open(&path).unwrap();
    }
}

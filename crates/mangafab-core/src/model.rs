// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Data model shared by all mangafab services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{DomainError, Result};

/// A registered account.
///
/// The password hash never leaves the process; serialization skips it so
/// handler code can return the struct directly.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Verified bearer-token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub email: String,
    /// Issued at (unix seconds).
    pub iat: u64,
    /// Expiry (unix seconds).
    pub exp: u64,
}

/// Publication status of a manga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MangaStatus {
    Ongoing,
    Completed,
    Hiatus,
    Dropped,
    Cancelled,
}

impl MangaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Hiatus => "hiatus",
            Self::Dropped => "dropped",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            "hiatus" => Ok(Self::Hiatus),
            "dropped" => Ok(Self::Dropped),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::Validation(format!(
                "unknown manga status '{other}'"
            ))),
        }
    }
}

/// A catalog entry.
///
/// `rating` and `rating_count` are derived from the ratings relation at
/// read time and are never written directly.
#[derive(Debug, Clone, Serialize)]
pub struct Manga {
    /// Opaque id, may carry an external-source prefix (e.g. `md-42`).
    pub id: String,
    pub title: String,
    pub author: String,
    pub status: MangaStatus,
    pub total_chapters: u32,
    pub genres: Vec<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,
    pub rating: f64,
    pub rating_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a manga.
#[derive(Debug, Clone, Deserialize)]
pub struct NewManga {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub status: MangaStatus,
    #[serde(default)]
    pub total_chapters: u32,
    pub genres: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
}

impl NewManga {
    /// Enforce the catalog invariants: non-empty title, at least one
    /// genre, absolute http(s) cover URL when present.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(DomainError::Validation("title must not be empty".into()));
        }
        if self.genres.is_empty() {
            return Err(DomainError::Validation(
                "at least one genre is required".into(),
            ));
        }
        if let Some(url) = &self.cover_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(DomainError::Validation(
                    "cover_url must be an absolute http(s) URL".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Partial update for a manga; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MangaPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub status: Option<MangaStatus>,
    pub total_chapters: Option<u32>,
    pub genres: Option<Vec<String>>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub publication_year: Option<i32>,
}

/// A chapter of a manga.
///
/// External chapters carry no pages; readers are directed to
/// `external_url` instead.
#[derive(Debug, Clone, Serialize)]
pub struct Chapter {
    pub id: String,
    pub manga_id: String,
    /// Chapter number; rational to admit 10.5-style extras.
    pub number: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<i32>,
    pub title: String,
    pub language: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub pages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    pub is_external: bool,
}

/// Page list for one chapter, or the external redirect.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterPages {
    pub chapter_id: String,
    pub pages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    pub is_external: bool,
}

/// Collection-membership status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryStatus {
    Reading,
    Completed,
    PlanToRead,
    Dropped,
    OnHold,
    ReReading,
}

impl LibraryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Completed => "completed",
            Self::PlanToRead => "plan_to_read",
            Self::Dropped => "dropped",
            Self::OnHold => "on_hold",
            Self::ReReading => "re_reading",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "reading" => Ok(Self::Reading),
            "completed" => Ok(Self::Completed),
            "plan_to_read" => Ok(Self::PlanToRead),
            "dropped" => Ok(Self::Dropped),
            "on_hold" => Ok(Self::OnHold),
            "re_reading" => Ok(Self::ReReading),
            other => Err(DomainError::Validation(format!(
                "unknown library status '{other}'"
            ))),
        }
    }
}

/// A library row joined with its manga for list responses.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryItem {
    pub manga: Manga,
    pub status: LibraryStatus,
    pub added_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Last-read chapter when a progress row exists for the pair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_chapter: Option<u32>,
}

/// Per-status counts over a user's library.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryStats {
    pub total: u32,
    pub by_status: BTreeMap<String, u32>,
    /// Progress rows, counted independently of library membership.
    pub progress_entries: u32,
}

/// A reading position. Independent of library membership.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressRecord {
    pub user_id: String,
    pub manga_id: String,
    pub current_chapter: u32,
    pub last_read_at: DateTime<Utc>,
}

/// Payload for a progress mutation.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressUpdate {
    pub manga_id: String,
    pub current_chapter: u32,
    /// When present, also upserts the library entry with this status.
    #[serde(default)]
    pub status: Option<LibraryStatus>,
}

/// Aggregated rating view for one manga.
#[derive(Debug, Clone, Serialize)]
pub struct RatingStats {
    pub average_rating: f64,
    pub total_ratings: u32,
    /// The viewer's own rating, present only for authenticated callers.
    pub user_rating: Option<u8>,
    pub rating_distribution: BTreeMap<u8, u32>,
}

/// Catalog-wide counters.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub manga_count: u32,
    pub chapter_count: u32,
    pub user_count: u32,
    pub rating_count: u32,
}

/// Sort order for catalog search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Title,
    Rating,
    Popularity,
    Year,
    Newest,
}

/// Catalog search parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub status: Option<MangaStatus>,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub limit: u32,
}

fn default_page_size() -> u32 {
    20
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            q: None,
            genre: None,
            status: None,
            sort: SortKey::default(),
            page: 0,
            limit: default_page_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in [
            MangaStatus::Ongoing,
            MangaStatus::Completed,
            MangaStatus::Hiatus,
            MangaStatus::Dropped,
            MangaStatus::Cancelled,
        ] {
            assert_eq!(MangaStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(MangaStatus::parse("rebooted").is_err());
    }

    #[test]
    fn test_library_status_roundtrip() {
        for s in [
            LibraryStatus::Reading,
            LibraryStatus::Completed,
            LibraryStatus::PlanToRead,
            LibraryStatus::Dropped,
            LibraryStatus::OnHold,
            LibraryStatus::ReReading,
        ] {
            assert_eq!(LibraryStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(LibraryStatus::parse("binge").is_err());
    }

    #[test]
    fn test_new_manga_validation() {
        let mut m = NewManga {
            id: None,
            title: "Berserk".into(),
            author: "Kentaro Miura".into(),
            status: MangaStatus::Hiatus,
            total_chapters: 364,
            genres: vec!["seinen".into()],
            description: String::new(),
            cover_url: None,
            publication_year: Some(1989),
        };
        assert!(m.validate().is_ok());

        m.cover_url = Some("ftp://bad".into());
        assert!(m.validate().is_err());

        m.cover_url = Some("https://covers.example/1.jpg".into());
        m.genres.clear();
        assert!(m.validate().is_err());

        m.genres = vec!["seinen".into()];
        m.title = "  ".into();
        assert!(m.validate().is_err());
    }
}

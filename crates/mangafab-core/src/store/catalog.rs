// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Manga and chapter rows.

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use super::{chapter_from_row, manga_from_row, optional, Store, MANGA_COLS, MANGA_RATING_JOIN};
use crate::error::{DomainError, Result};
use crate::model::{CatalogStats, Chapter, Manga, MangaPatch, NewManga, SearchQuery, SortKey};

const CHAPTER_COLS: &str = "id, manga_id, number, volume, title, language, source, \
     published_at, pages, external_url, is_external";

impl Store {
    pub fn insert_manga(&self, new: &NewManga) -> Result<Manga> {
        new.validate()?;
        let id = new
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let created_at = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO manga (id, title, author, status, total_chapters, genres, \
                 description, cover_url, publication_year, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    new.title,
                    new.author,
                    new.status.as_str(),
                    new.total_chapters,
                    serde_json::to_string(&new.genres)?,
                    new.description,
                    new.cover_url,
                    new.publication_year,
                    created_at.to_rfc3339()
                ],
            )
            .map_err(|e| match DomainError::from(e) {
                DomainError::Conflict(_) => {
                    DomainError::Conflict(format!("manga '{id}' already exists"))
                }
                other => other,
            })?;
            Ok(())
        })?;
        self.manga_by_id(&id)?
            .ok_or_else(|| DomainError::Store("inserted manga vanished".into()))
    }

    pub fn update_manga(&self, id: &str, patch: &MangaPatch) -> Result<Manga> {
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(DomainError::Validation("title must not be empty".into()));
            }
        }
        if let Some(genres) = &patch.genres {
            if genres.is_empty() {
                return Err(DomainError::Validation(
                    "at least one genre is required".into(),
                ));
            }
        }
        let genres_json = patch
            .genres
            .as_ref()
            .map(|g| serde_json::to_string(g))
            .transpose()?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE manga SET \
                 title = COALESCE(?2, title), \
                 author = COALESCE(?3, author), \
                 status = COALESCE(?4, status), \
                 total_chapters = COALESCE(?5, total_chapters), \
                 genres = COALESCE(?6, genres), \
                 description = COALESCE(?7, description), \
                 cover_url = COALESCE(?8, cover_url), \
                 publication_year = COALESCE(?9, publication_year) \
                 WHERE id = ?1",
                params![
                    id,
                    patch.title,
                    patch.author,
                    patch.status.map(|s| s.as_str()),
                    patch.total_chapters,
                    genres_json,
                    patch.description,
                    patch.cover_url,
                    patch.publication_year
                ],
            )?;
            if changed == 0 {
                return Err(DomainError::NotFound(format!("manga '{id}' not found")));
            }
            Ok(())
        })?;
        self.manga_by_id(id)?
            .ok_or_else(|| DomainError::NotFound(format!("manga '{id}' not found")))
    }

    pub fn manga_by_id(&self, id: &str) -> Result<Option<Manga>> {
        self.with_conn(|conn| {
            optional(conn.query_row(
                &format!("SELECT {MANGA_COLS} FROM manga m {MANGA_RATING_JOIN} WHERE m.id = ?1"),
                params![id],
                manga_from_row,
            ))
        })
    }

    /// Paged catalog search. Empty filter strings match everything, so
    /// every parameter is always bound.
    pub fn search_manga(&self, query: &SearchQuery) -> Result<Vec<Manga>> {
        let order = match query.sort {
            SortKey::Title => "m.title COLLATE NOCASE ASC",
            SortKey::Rating => "COALESCE(r.avg_value, 0) DESC, m.title ASC",
            SortKey::Popularity => "COALESCE(r.cnt, 0) DESC, COALESCE(r.avg_value, 0) DESC",
            SortKey::Year => "m.publication_year DESC",
            SortKey::Newest => "m.created_at DESC",
        };
        let limit = query.limit.clamp(1, 100);
        let offset = query.page.saturating_mul(limit);
        let sql = format!(
            "SELECT {MANGA_COLS} FROM manga m {MANGA_RATING_JOIN} \
             WHERE (?1 = '' OR m.title LIKE '%' || ?1 || '%' OR m.author LIKE '%' || ?1 || '%') \
             AND (?2 = '' OR m.genres LIKE '%\"' || ?2 || '\"%') \
             AND (?3 = '' OR m.status = ?3) \
             ORDER BY {order} LIMIT ?4 OFFSET ?5"
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![
                    query.q.as_deref().unwrap_or(""),
                    query.genre.as_deref().unwrap_or(""),
                    query.status.map(|s| s.as_str()).unwrap_or(""),
                    limit,
                    offset
                ],
                manga_from_row,
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Most-rated manga first; rating breaks ties.
    pub fn popular_manga(&self, limit: u32) -> Result<Vec<Manga>> {
        let limit = limit.clamp(1, 100);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MANGA_COLS} FROM manga m {MANGA_RATING_JOIN} \
                 ORDER BY COALESCE(r.cnt, 0) DESC, COALESCE(r.avg_value, 0) DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], manga_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Distinct genre list across the catalog.
    pub fn genres(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT genres FROM manga")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out: Vec<String> = Vec::new();
            for raw in rows {
                let genres: Vec<String> = serde_json::from_str(&raw?)?;
                for g in genres {
                    if !out.contains(&g) {
                        out.push(g);
                    }
                }
            }
            out.sort();
            Ok(out)
        })
    }

    pub fn insert_chapter(&self, ch: &Chapter) -> Result<()> {
        if ch.is_external && !ch.pages.is_empty() {
            return Err(DomainError::Validation(
                "external chapters carry no pages".into(),
            ));
        }
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO chapters ({CHAPTER_COLS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    ch.id,
                    ch.manga_id,
                    ch.number,
                    ch.volume,
                    ch.title,
                    ch.language,
                    ch.source,
                    ch.published_at.map(|t| t.to_rfc3339()),
                    serde_json::to_string(&ch.pages)?,
                    ch.external_url,
                    ch.is_external as i64
                ],
            )?;
            Ok(())
        })
    }

    /// Chapters of one manga, optionally filtered to a language set
    /// (comma-separated), ordered by number.
    pub fn chapter_list(
        &self,
        manga_id: &str,
        langs: &[String],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Chapter>> {
        let langs_csv = langs.join(",");
        let limit = limit.clamp(1, 500);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHAPTER_COLS} FROM chapters \
                 WHERE manga_id = ?1 \
                 AND (?2 = '' OR instr(',' || ?2 || ',', ',' || language || ',') > 0) \
                 ORDER BY number ASC LIMIT ?3 OFFSET ?4"
            ))?;
            let rows = stmt.query_map(
                params![manga_id, langs_csv, limit, offset],
                chapter_from_row,
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn chapter_by_id(&self, chapter_id: &str) -> Result<Option<Chapter>> {
        self.with_conn(|conn| {
            optional(conn.query_row(
                &format!("SELECT {CHAPTER_COLS} FROM chapters WHERE id = ?1"),
                params![chapter_id],
                chapter_from_row,
            ))
        })
    }

    pub fn catalog_stats(&self) -> Result<CatalogStats> {
        let user_count = self.user_count()?;
        self.with_conn(|conn| {
            let manga_count: u32 =
                conn.query_row("SELECT COUNT(*) FROM manga", [], |r| r.get(0))?;
            let chapter_count: u32 =
                conn.query_row("SELECT COUNT(*) FROM chapters", [], |r| r.get(0))?;
            let rating_count: u32 =
                conn.query_row("SELECT COUNT(*) FROM ratings", [], |r| r.get(0))?;
            Ok(CatalogStats {
                manga_count,
                chapter_count,
                user_count,
                rating_count,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MangaStatus;

    fn seed_manga(store: &Store, id: &str, title: &str, genres: &[&str]) -> Manga {
        store
            .insert_manga(&NewManga {
                id: Some(id.into()),
                title: title.into(),
                author: "author".into(),
                status: MangaStatus::Ongoing,
                total_chapters: 10,
                genres: genres.iter().map(|s| s.to_string()).collect(),
                description: String::new(),
                cover_url: None,
                publication_year: Some(2010),
            })
            .unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let store = Store::open_in_memory().unwrap();
        let m = seed_manga(&store, "md-42", "Vagabond", &["seinen", "historical"]);
        assert_eq!(m.rating_count, 0);

        let fetched = store.manga_by_id("md-42").unwrap().unwrap();
        assert_eq!(fetched.title, "Vagabond");
        assert_eq!(fetched.genres.len(), 2);

        assert!(store.manga_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_id_conflicts() {
        let store = Store::open_in_memory().unwrap();
        seed_manga(&store, "md-1", "One", &["action"]);
        let err = store
            .insert_manga(&NewManga {
                id: Some("md-1".into()),
                title: "Two".into(),
                author: String::new(),
                status: MangaStatus::Ongoing,
                total_chapters: 0,
                genres: vec!["action".into()],
                description: String::new(),
                cover_url: None,
                publication_year: None,
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn test_search_filters() {
        let store = Store::open_in_memory().unwrap();
        seed_manga(&store, "a", "Alpha Strike", &["action"]);
        seed_manga(&store, "b", "Beta Bloom", &["romance"]);
        seed_manga(&store, "c", "Gamma Action", &["action", "drama"]);

        let all = store.search_manga(&SearchQuery::default()).unwrap();
        assert_eq!(all.len(), 3);

        let by_q = store
            .search_manga(&SearchQuery {
                q: Some("Beta".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_q.len(), 1);
        assert_eq!(by_q[0].id, "b");

        let by_genre = store
            .search_manga(&SearchQuery {
                genre: Some("action".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_genre.len(), 2);
    }

    #[test]
    fn test_genre_filter_is_exact() {
        let store = Store::open_in_memory().unwrap();
        seed_manga(&store, "a", "A", &["romance"]);
        seed_manga(&store, "b", "B", &["rom"]);

        let hits = store
            .search_manga(&SearchQuery {
                genre: Some("rom".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[test]
    fn test_patch_update() {
        let store = Store::open_in_memory().unwrap();
        seed_manga(&store, "m", "Old Title", &["action"]);

        let updated = store
            .update_manga(
                "m",
                &MangaPatch {
                    title: Some("New Title".into()),
                    status: Some(MangaStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "New Title");
        assert_eq!(updated.status, MangaStatus::Completed);
        assert_eq!(updated.author, "author");

        assert!(matches!(
            store.update_manga("nope", &MangaPatch::default()),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn test_chapters() {
        let store = Store::open_in_memory().unwrap();
        seed_manga(&store, "m", "M", &["action"]);

        for (i, lang) in [(1, "en"), (2, "en"), (3, "ja")] {
            store
                .insert_chapter(&Chapter {
                    id: format!("c{i}"),
                    manga_id: "m".into(),
                    number: i as f64,
                    volume: None,
                    title: format!("Chapter {i}"),
                    language: lang.into(),
                    source: "local".into(),
                    published_at: None,
                    pages: vec![format!("https://pages.example/{i}/1.png")],
                    external_url: None,
                    is_external: false,
                })
                .unwrap();
        }

        let all = store.chapter_list("m", &[], 100, 0).unwrap();
        assert_eq!(all.len(), 3);

        let en = store.chapter_list("m", &["en".into()], 100, 0).unwrap();
        assert_eq!(en.len(), 2);

        let ch = store.chapter_by_id("c3").unwrap().unwrap();
        assert_eq!(ch.language, "ja");
        assert_eq!(ch.pages.len(), 1);
    }

    #[test]
    fn test_external_chapter_pages_rejected() {
        let store = Store::open_in_memory().unwrap();
        seed_manga(&store, "m", "M", &["action"]);

        let err = store
            .insert_chapter(&Chapter {
                id: "x".into(),
                manga_id: "m".into(),
                number: 1.0,
                volume: None,
                title: String::new(),
                language: "en".into(),
                source: "external".into(),
                published_at: None,
                pages: vec!["page".into()],
                external_url: Some("https://reader.example/x".into()),
                is_external: true,
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn test_genres_distinct_sorted() {
        let store = Store::open_in_memory().unwrap();
        seed_manga(&store, "a", "A", &["drama", "action"]);
        seed_manga(&store, "b", "B", &["action", "romance"]);

        let genres = store.genres().unwrap();
        assert_eq!(genres, vec!["action", "drama", "romance"]);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Rating rows and derived aggregates.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::params;

use super::{optional, Store};
use crate::error::{DomainError, Result};
use crate::model::RatingStats;

impl Store {
    /// Insert or overwrite the user's rating for a manga.
    pub fn upsert_rating(&self, user_id: &str, manga_id: &str, value: u8) -> Result<()> {
        if !(1..=5).contains(&value) {
            return Err(DomainError::Validation(
                "rating must be between 1 and 5".into(),
            ));
        }
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ratings (user_id, manga_id, value, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(user_id, manga_id) DO UPDATE SET value = ?3, updated_at = ?4",
                params![user_id, manga_id, value, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Remove the user's rating; `Err(NotFound)` when absent.
    pub fn delete_rating(&self, user_id: &str, manga_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM ratings WHERE user_id = ?1 AND manga_id = ?2",
                params![user_id, manga_id],
            )?;
            if changed == 0 {
                return Err(DomainError::NotFound("rating not found".into()));
            }
            Ok(())
        })
    }

    /// Aggregated view for one manga. `viewer` adds the caller's own
    /// rating when present (optional-auth endpoints pass `None`).
    pub fn rating_stats(&self, manga_id: &str, viewer: Option<&str>) -> Result<RatingStats> {
        self.with_conn(|conn| {
            let mut distribution = BTreeMap::new();
            let mut total = 0u32;
            let mut sum = 0u64;
            {
                let mut stmt = conn.prepare(
                    "SELECT value, COUNT(*) FROM ratings WHERE manga_id = ?1 GROUP BY value",
                )?;
                let rows = stmt.query_map(params![manga_id], |row| {
                    Ok((row.get::<_, u8>(0)?, row.get::<_, u32>(1)?))
                })?;
                for row in rows {
                    let (value, count) = row?;
                    total += count;
                    sum += value as u64 * count as u64;
                    distribution.insert(value, count);
                }
            }
            let user_rating = match viewer {
                Some(user_id) => optional(conn.query_row(
                    "SELECT value FROM ratings WHERE user_id = ?1 AND manga_id = ?2",
                    params![user_id, manga_id],
                    |r| r.get::<_, u8>(0),
                ))?,
                None => None,
            };
            let average_rating = if total == 0 {
                0.0
            } else {
                sum as f64 / total as f64
            };
            Ok(RatingStats {
                average_rating,
                total_ratings: total,
                user_rating,
                rating_distribution: distribution,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MangaStatus, NewManga};

    fn seed(store: &Store, users: &[&str]) -> Vec<String> {
        store
            .insert_manga(&NewManga {
                id: Some("m".into()),
                title: "M".into(),
                author: String::new(),
                status: MangaStatus::Ongoing,
                total_chapters: 1,
                genres: vec!["action".into()],
                description: String::new(),
                cover_url: None,
                publication_year: None,
            })
            .unwrap();
        users
            .iter()
            .map(|u| {
                store
                    .create_user(u, &format!("{u}@example.com"), "h")
                    .unwrap()
                    .id
            })
            .collect()
    }

    #[test]
    fn test_out_of_range_rejected() {
        let store = Store::open_in_memory().unwrap();
        let ids = seed(&store, &["a"]);
        assert!(matches!(
            store.upsert_rating(&ids[0], "m", 0),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            store.upsert_rating(&ids[0], "m", 6),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_aggregates() {
        let store = Store::open_in_memory().unwrap();
        let ids = seed(&store, &["a", "b", "c"]);

        store.upsert_rating(&ids[0], "m", 4).unwrap();
        store.upsert_rating(&ids[1], "m", 4).unwrap();
        store.upsert_rating(&ids[2], "m", 5).unwrap();

        let stats = store.rating_stats("m", Some(&ids[2])).unwrap();
        assert_eq!(stats.total_ratings, 3);
        assert!((stats.average_rating - 13.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.user_rating, Some(5));
        assert_eq!(stats.rating_distribution.get(&4), Some(&2));
        assert_eq!(stats.rating_distribution.get(&5), Some(&1));

        // Anonymous viewers get no user_rating.
        let anon = store.rating_stats("m", None).unwrap();
        assert_eq!(anon.user_rating, None);
    }

    #[test]
    fn test_rate_then_unrate_restores_empty_state() {
        let store = Store::open_in_memory().unwrap();
        let ids = seed(&store, &["a"]);

        store.upsert_rating(&ids[0], "m", 4).unwrap();
        let stats = store.rating_stats("m", Some(&ids[0])).unwrap();
        assert_eq!(stats.average_rating, 4.0);
        assert_eq!(stats.total_ratings, 1);
        assert_eq!(stats.user_rating, Some(4));
        assert_eq!(stats.rating_distribution.get(&4), Some(&1));

        store.delete_rating(&ids[0], "m").unwrap();
        let stats = store.rating_stats("m", Some(&ids[0])).unwrap();
        assert_eq!(stats.average_rating, 0.0);
        assert_eq!(stats.total_ratings, 0);
        assert_eq!(stats.user_rating, None);
        assert!(stats.rating_distribution.is_empty());

        assert!(matches!(
            store.delete_rating(&ids[0], "m"),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn test_re_rating_overwrites() {
        let store = Store::open_in_memory().unwrap();
        let ids = seed(&store, &["a"]);

        store.upsert_rating(&ids[0], "m", 2).unwrap();
        store.upsert_rating(&ids[0], "m", 5).unwrap();

        let stats = store.rating_stats("m", Some(&ids[0])).unwrap();
        assert_eq!(stats.total_ratings, 1);
        assert_eq!(stats.user_rating, Some(5));
    }
}

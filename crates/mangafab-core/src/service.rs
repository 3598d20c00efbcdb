// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! The domain service facade (C1).
//!
//! [`Domain`] bundles the store with the auth keys and exposes the
//! operation set the gateway consumes over REST and gRPC. Every method
//! returns a value or a categorized [`DomainError`]; success is defined by
//! the store mutation alone — fan-out to the buses happens in the gateway,
//! after these methods return.

use serde::{Deserialize, Serialize};

use crate::auth::{self, unix_now, AuthKeys};
use crate::error::{DomainError, Result};
use crate::model::{
    CatalogStats, Chapter, ChapterPages, Claims, LibraryItem, LibraryStats, LibraryStatus, Manga,
    MangaPatch, NewManga, ProgressUpdate, RatingStats, SearchQuery, User,
};
use crate::store::Store;

/// A progress mutation, flattened for fan-out: exactly the fields the TCP
/// progress frame carries, plus what the library side-effect needs.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub user_id: String,
    pub username: String,
    pub manga_id: String,
    pub manga_title: String,
    pub chapter: u32,
    pub timestamp: u64,
    /// Present when the update also created/changed the library entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_status: Option<LibraryStatus>,
}

/// Outcome of a library mutation, carrying what the notification needs.
#[derive(Debug, Clone)]
pub struct LibraryChange {
    pub manga_id: String,
    pub manga_title: String,
    pub status: Option<LibraryStatus>,
    /// False for an idempotent re-add with the same status.
    pub changed: bool,
}

/// One item of a batch progress update.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressItem {
    pub manga_id: String,
    pub current_chapter: u32,
}

/// A failed item of a batch progress update.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub manga_id: String,
    pub error: String,
}

/// Profile patch; `None` keeps the current value.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilePatch {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Domain services over the durable store.
#[derive(Clone)]
pub struct Domain {
    store: Store,
    auth: std::sync::Arc<AuthKeys>,
}

impl Domain {
    pub fn new(store: Store, auth: AuthKeys) -> Self {
        Self {
            store,
            auth: std::sync::Arc::new(auth),
        }
    }

    /// Direct store access for seeding and tests.
    pub fn store(&self) -> &Store {
        &self.store
    }

    // ---- accounts -------------------------------------------------------

    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        validate_username(username)?;
        validate_email(email)?;
        if password.len() < 8 {
            return Err(DomainError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }
        let hash = auth::hash_password(password)?;
        let user = self.store.create_user(username, email, &hash)?;
        tracing::info!("registered '{}'", user.username);
        Ok(user)
    }

    /// Exchange credentials for a bearer token.
    pub fn login(&self, identifier: &str, password: &str) -> Result<(String, User)> {
        let user = self
            .store
            .user_by_identifier(identifier)?
            .ok_or_else(|| DomainError::Unauthorized("invalid credentials".into()))?;
        if !auth::verify_password(password, &user.password_hash) {
            tracing::debug!("failed login attempt for '{identifier}'");
            return Err(DomainError::Unauthorized("invalid credentials".into()));
        }
        let token = self.auth.issue(&user)?;
        tracing::info!("'{}' logged in", user.username);
        Ok((token, user))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        self.auth.verify(token)
    }

    pub fn profile(&self, user_id: &str) -> Result<User> {
        self.store
            .user_by_id(user_id)?
            .ok_or_else(|| DomainError::NotFound("user not found".into()))
    }

    pub fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> Result<User> {
        if let Some(username) = &patch.username {
            validate_username(username)?;
        }
        if let Some(email) = &patch.email {
            validate_email(email)?;
        }
        self.store
            .update_user_profile(user_id, patch.username.as_deref(), patch.email.as_deref())
    }

    pub fn change_password(&self, user_id: &str, old: &str, new: &str) -> Result<()> {
        let user = self.profile(user_id)?;
        if !auth::verify_password(old, &user.password_hash) {
            return Err(DomainError::Unauthorized("current password is wrong".into()));
        }
        if new.len() < 8 {
            return Err(DomainError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }
        self.store
            .update_user_password(user_id, &auth::hash_password(new)?)
    }

    // ---- progress -------------------------------------------------------

    /// Update a reading position. Identical chapter values are accepted
    /// and re-emit the event. An optional status also upserts the library
    /// entry; progress rows themselves never carry status.
    pub fn update_progress(&self, user_id: &str, update: &ProgressUpdate) -> Result<ProgressEvent> {
        let user = self.profile(user_id)?;
        let manga = self.get_manga(&update.manga_id)?;

        self.store
            .upsert_progress(user_id, &update.manga_id, update.current_chapter)?;

        let mut library_status = None;
        if let Some(status) = update.status {
            if self.store.upsert_library(user_id, &update.manga_id, status)? {
                library_status = Some(status);
            }
        }

        Ok(ProgressEvent {
            user_id: user.id,
            username: user.username,
            manga_id: manga.id,
            manga_title: manga.title,
            chapter: update.current_chapter,
            timestamp: unix_now(),
            library_status,
        })
    }

    /// Batch variant; failures are reported per item, successes fan out
    /// individually.
    pub fn progress_batch(
        &self,
        user_id: &str,
        items: &[ProgressItem],
    ) -> Result<(Vec<ProgressEvent>, Vec<BatchFailure>)> {
        let mut events = Vec::new();
        let mut failures = Vec::new();
        for item in items {
            let update = ProgressUpdate {
                manga_id: item.manga_id.clone(),
                current_chapter: item.current_chapter,
                status: None,
            };
            match self.update_progress(user_id, &update) {
                Ok(ev) => events.push(ev),
                Err(e) => failures.push(BatchFailure {
                    manga_id: item.manga_id.clone(),
                    error: e.to_string(),
                }),
            }
        }
        Ok((events, failures))
    }

    // ---- library --------------------------------------------------------

    pub fn get_library(&self, user_id: &str) -> Result<Vec<LibraryItem>> {
        self.store.library_for_user(user_id, None)
    }

    pub fn library_filtered(
        &self,
        user_id: &str,
        status: LibraryStatus,
    ) -> Result<Vec<LibraryItem>> {
        self.store.library_for_user(user_id, Some(status))
    }

    pub fn library_stats(&self, user_id: &str) -> Result<LibraryStats> {
        self.store.library_stats(user_id)
    }

    pub fn add_to_library(
        &self,
        user_id: &str,
        manga_id: &str,
        status: LibraryStatus,
    ) -> Result<LibraryChange> {
        let manga = self.get_manga(manga_id)?;
        let changed = self.store.upsert_library(user_id, manga_id, status)?;
        Ok(LibraryChange {
            manga_id: manga.id,
            manga_title: manga.title,
            status: Some(status),
            changed,
        })
    }

    pub fn remove_from_library(&self, user_id: &str, manga_id: &str) -> Result<LibraryChange> {
        let manga = self.get_manga(manga_id)?;
        self.store.remove_library(user_id, manga_id)?;
        Ok(LibraryChange {
            manga_id: manga.id,
            manga_title: manga.title,
            status: None,
            changed: true,
        })
    }

    // ---- ratings --------------------------------------------------------

    pub fn rate_manga(&self, user_id: &str, manga_id: &str, value: u8) -> Result<()> {
        self.get_manga(manga_id)?;
        self.store.upsert_rating(user_id, manga_id, value)
    }

    pub fn delete_rating(&self, user_id: &str, manga_id: &str) -> Result<()> {
        self.get_manga(manga_id)?;
        self.store.delete_rating(user_id, manga_id)
    }

    pub fn rating_stats(&self, manga_id: &str, viewer: Option<&str>) -> Result<RatingStats> {
        self.get_manga(manga_id)?;
        self.store.rating_stats(manga_id, viewer)
    }

    // ---- catalog --------------------------------------------------------

    pub fn get_manga(&self, id: &str) -> Result<Manga> {
        self.store
            .manga_by_id(id)?
            .ok_or_else(|| DomainError::NotFound(format!("manga '{id}' not found")))
    }

    pub fn search_manga(&self, query: &SearchQuery) -> Result<Vec<Manga>> {
        self.store.search_manga(query)
    }

    pub fn popular_manga(&self, limit: u32) -> Result<Vec<Manga>> {
        self.store.popular_manga(limit)
    }

    pub fn genres(&self) -> Result<Vec<String>> {
        self.store.genres()
    }

    pub fn catalog_stats(&self) -> Result<CatalogStats> {
        self.store.catalog_stats()
    }

    pub fn create_manga(&self, new: &NewManga) -> Result<Manga> {
        self.store.insert_manga(new)
    }

    pub fn update_manga(&self, id: &str, patch: &MangaPatch) -> Result<Manga> {
        self.store.update_manga(id, patch)
    }

    pub fn chapter_list(
        &self,
        manga_id: &str,
        langs: &[String],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Chapter>> {
        self.get_manga(manga_id)?;
        self.store.chapter_list(manga_id, langs, limit, offset)
    }

    /// Page list for a chapter. External chapters return the redirect
    /// target instead of pages.
    pub fn chapter_pages(&self, chapter_id: &str, source: Option<&str>) -> Result<ChapterPages> {
        let chapter = self
            .store
            .chapter_by_id(chapter_id)?
            .ok_or_else(|| DomainError::NotFound(format!("chapter '{chapter_id}' not found")))?;
        if let Some(source) = source {
            if !source.is_empty() && chapter.source != source {
                return Err(DomainError::NotFound(format!(
                    "chapter '{chapter_id}' not found for source '{source}'"
                )));
            }
        }
        Ok(ChapterPages {
            chapter_id: chapter.id,
            pages: chapter.pages,
            external_url: chapter.external_url,
            is_external: chapter.is_external,
        })
    }
}

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(DomainError::Validation(
            "username must be 3-32 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(DomainError::Validation(
            "username may contain only letters, digits, '_' and '-'".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    let valid = email.contains('@')
        && !email.starts_with('@')
        && !email.ends_with('@')
        && email.len() <= 254;
    if !valid {
        return Err(DomainError::Validation("invalid email address".into()));
    }
    Ok(())
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! gRPC surface: the same intent set as REST, same auth, same
//! side-effects.
//!
//! Errors are application-level — every response carries `success` and
//! `error` and the transport stays OK — so programmatic clients never
//! have to unpick transport failures from domain failures.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use mangafab_core::model::{
    Chapter, Claims, LibraryItem, LibraryStatus, Manga, MangaPatch, MangaStatus, NewManga,
    ProgressUpdate, SearchQuery, SortKey, User,
};
use mangafab_core::service::{ProfilePatch, ProgressItem};
use mangafab_core::DomainError;
use mangafab_proto::v1;
use mangafab_proto::v1::manga_fab_server::{MangaFab, MangaFabServer};

use crate::effects::{spawn_library_effects, spawn_manga_effects, spawn_progress_effects};
use crate::state::AppState;

/// Build the tonic service for the gateway.
pub fn service(state: Arc<AppState>) -> MangaFabServer<GrpcGateway> {
    MangaFabServer::new(GrpcGateway { state })
}

pub struct GrpcGateway {
    state: Arc<AppState>,
}

impl GrpcGateway {
    /// Required auth: bearer token in the `authorization` metadata entry.
    fn claims<T>(&self, request: &Request<T>) -> Result<Claims, String> {
        let value = request
            .metadata()
            .get("authorization")
            .ok_or_else(|| "missing bearer token".to_string())?;
        let text = value
            .to_str()
            .map_err(|_| "invalid authorization metadata".to_string())?;
        let token = text.strip_prefix("Bearer ").unwrap_or(text).trim();
        self.state
            .domain
            .validate_token(token)
            .map_err(|e| e.to_string())
    }

    /// Optional auth: a valid token tailors the response, absence is fine.
    fn optional_claims<T>(&self, request: &Request<T>) -> Option<Claims> {
        self.claims(request).ok()
    }

    /// Admin gate for catalog mutation RPCs; same membership rule as the
    /// REST surface.
    fn admin_claims<T>(&self, request: &Request<T>) -> Result<Claims, String> {
        let claims = self.claims(request)?;
        if !self.state.config.is_admin(&claims.username) {
            return Err("admin access required".to_string());
        }
        Ok(claims)
    }
}

/// Domain error text for application-level responses; store internals
/// never reach clients verbatim.
fn err_text(e: &DomainError) -> String {
    match e {
        DomainError::Store(detail) => {
            tracing::error!("store failure: {detail}");
            "internal error".to_string()
        }
        other => other.to_string(),
    }
}

fn ok_status() -> v1::StatusResponse {
    v1::StatusResponse {
        success: true,
        error: String::new(),
    }
}

fn err_status(error: impl Into<String>) -> v1::StatusResponse {
    v1::StatusResponse {
        success: false,
        error: error.into(),
    }
}

fn user_info(user: &User) -> v1::UserInfo {
    v1::UserInfo {
        id: user.id.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
    }
}

fn manga_info(manga: &Manga) -> v1::MangaInfo {
    v1::MangaInfo {
        id: manga.id.clone(),
        title: manga.title.clone(),
        author: manga.author.clone(),
        status: manga.status.as_str().to_string(),
        total_chapters: manga.total_chapters,
        genres: manga.genres.clone(),
        description: manga.description.clone(),
        cover_url: manga.cover_url.clone().unwrap_or_default(),
        publication_year: manga.publication_year.unwrap_or(0),
        rating: manga.rating,
        rating_count: manga.rating_count,
    }
}

fn auth_err(error: impl Into<String>) -> v1::AuthResponse {
    v1::AuthResponse {
        success: false,
        error: error.into(),
        token: String::new(),
        user: None,
    }
}

fn profile_ok(user: &User) -> v1::ProfileResponse {
    v1::ProfileResponse {
        success: true,
        error: String::new(),
        user: Some(user_info(user)),
    }
}

fn profile_err(error: impl Into<String>) -> v1::ProfileResponse {
    v1::ProfileResponse {
        success: false,
        error: error.into(),
        user: None,
    }
}

fn chapter_info(chapter: &Chapter) -> v1::ChapterInfo {
    v1::ChapterInfo {
        id: chapter.id.clone(),
        manga_id: chapter.manga_id.clone(),
        number: chapter.number,
        volume: chapter.volume,
        title: chapter.title.clone(),
        language: chapter.language.clone(),
        source: chapter.source.clone(),
        published_at: chapter
            .published_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
        pages: chapter.pages.clone(),
        external_url: chapter.external_url.clone().unwrap_or_default(),
        is_external: chapter.is_external,
    }
}

fn library_entries(items: &[LibraryItem]) -> Vec<v1::LibraryEntry> {
    items
        .iter()
        .map(|item| v1::LibraryEntry {
            manga: Some(manga_info(&item.manga)),
            status: item.status.as_str().to_string(),
            current_chapter: item.current_chapter.unwrap_or(0),
            has_progress: item.current_chapter.is_some(),
        })
        .collect()
}

#[tonic::async_trait]
impl MangaFab for GrpcGateway {
    async fn register(
        &self,
        request: Request<v1::RegisterRequest>,
    ) -> Result<Response<v1::AuthResponse>, Status> {
        let req = request.into_inner();
        let reply = match self
            .state
            .domain
            .register(&req.username, &req.email, &req.password)
        {
            Ok(user) => v1::AuthResponse {
                success: true,
                error: String::new(),
                token: String::new(),
                user: Some(user_info(&user)),
            },
            Err(e) => auth_err(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn login(
        &self,
        request: Request<v1::LoginRequest>,
    ) -> Result<Response<v1::AuthResponse>, Status> {
        let req = request.into_inner();
        let reply = match self.state.domain.login(&req.identifier, &req.password) {
            Ok((token, user)) => {
                // Same side-effect as REST: open the singleton TCP session.
                self.state.tcp_users.connect_user(&user.id);
                v1::AuthResponse {
                    success: true,
                    error: String::new(),
                    token,
                    user: Some(user_info(&user)),
                }
            }
            Err(e) => auth_err(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn logout(
        &self,
        request: Request<v1::Empty>,
    ) -> Result<Response<v1::StatusResponse>, Status> {
        let reply = match self.claims(&request) {
            Ok(claims) => {
                self.state.tcp_users.disconnect_user(&claims.sub);
                ok_status()
            }
            Err(e) => err_status(e),
        };
        Ok(Response::new(reply))
    }

    async fn get_profile(
        &self,
        request: Request<v1::Empty>,
    ) -> Result<Response<v1::ProfileResponse>, Status> {
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(profile_err(e))),
        };
        let reply = match self.state.domain.profile(&claims.sub) {
            Ok(user) => profile_ok(&user),
            Err(e) => profile_err(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn update_profile(
        &self,
        request: Request<v1::UpdateProfileRequest>,
    ) -> Result<Response<v1::ProfileResponse>, Status> {
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(profile_err(e))),
        };
        let req = request.into_inner();
        let patch = ProfilePatch {
            username: req.username,
            email: req.email,
        };
        let reply = match self.state.domain.update_profile(&claims.sub, &patch) {
            Ok(user) => profile_ok(&user),
            Err(e) => profile_err(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn change_password(
        &self,
        request: Request<v1::ChangePasswordRequest>,
    ) -> Result<Response<v1::StatusResponse>, Status> {
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(err_status(e))),
        };
        let req = request.into_inner();
        let reply = match self.state.domain.change_password(
            &claims.sub,
            &req.current_password,
            &req.new_password,
        ) {
            Ok(()) => ok_status(),
            Err(e) => err_status(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn update_progress(
        &self,
        request: Request<v1::UpdateProgressRequest>,
    ) -> Result<Response<v1::StatusResponse>, Status> {
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(err_status(e))),
        };
        let req = request.into_inner();
        let status = match parse_optional(&req.status, LibraryStatus::parse) {
            Ok(s) => s,
            Err(e) => return Ok(Response::new(err_status(err_text(&e)))),
        };
        let update = ProgressUpdate {
            manga_id: req.manga_id,
            current_chapter: req.current_chapter,
            status,
        };
        let reply = match self.state.domain.update_progress(&claims.sub, &update) {
            Ok(event) => {
                spawn_progress_effects(&self.state, event);
                ok_status()
            }
            Err(e) => err_status(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn update_progress_batch(
        &self,
        request: Request<v1::UpdateProgressBatchRequest>,
    ) -> Result<Response<v1::BatchProgressResponse>, Status> {
        let fail = |error: String| v1::BatchProgressResponse {
            success: false,
            error,
            updated: 0,
            failed: vec![],
        };
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(fail(e))),
        };
        let req = request.into_inner();
        let items: Vec<ProgressItem> = req
            .items
            .into_iter()
            .map(|item| ProgressItem {
                manga_id: item.manga_id,
                current_chapter: item.current_chapter,
            })
            .collect();
        let reply = match self.state.domain.progress_batch(&claims.sub, &items) {
            Ok((events, failures)) => {
                for event in &events {
                    spawn_progress_effects(&self.state, event.clone());
                }
                v1::BatchProgressResponse {
                    success: true,
                    error: String::new(),
                    updated: events.len() as u32,
                    failed: failures
                        .into_iter()
                        .map(|f| v1::BatchFailure {
                            manga_id: f.manga_id,
                            error: f.error,
                        })
                        .collect(),
                }
            }
            Err(e) => fail(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn get_library(
        &self,
        request: Request<v1::GetLibraryRequest>,
    ) -> Result<Response<v1::LibraryResponse>, Status> {
        let fail = |error: String| v1::LibraryResponse {
            success: false,
            error,
            entries: vec![],
        };
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(fail(e))),
        };
        let req = request.into_inner();
        let result = match parse_optional(&req.status, LibraryStatus::parse) {
            Ok(Some(status)) => self.state.domain.library_filtered(&claims.sub, status),
            Ok(None) => self.state.domain.get_library(&claims.sub),
            Err(e) => return Ok(Response::new(fail(err_text(&e)))),
        };
        let reply = match result {
            Ok(items) => v1::LibraryResponse {
                success: true,
                error: String::new(),
                entries: library_entries(&items),
            },
            Err(e) => fail(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn get_library_filtered(
        &self,
        request: Request<v1::GetLibraryFilteredRequest>,
    ) -> Result<Response<v1::LibraryResponse>, Status> {
        let fail = |error: String| v1::LibraryResponse {
            success: false,
            error,
            entries: vec![],
        };
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(fail(e))),
        };
        let req = request.into_inner();
        let status = match LibraryStatus::parse(&req.status) {
            Ok(s) => s,
            Err(e) => return Ok(Response::new(fail(err_text(&e)))),
        };
        let reply = match self.state.domain.library_filtered(&claims.sub, status) {
            Ok(items) => v1::LibraryResponse {
                success: true,
                error: String::new(),
                entries: library_entries(&items),
            },
            Err(e) => fail(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn get_library_stats(
        &self,
        request: Request<v1::Empty>,
    ) -> Result<Response<v1::LibraryStatsResponse>, Status> {
        let fail = |error: String| v1::LibraryStatsResponse {
            success: false,
            error,
            total: 0,
            by_status: Default::default(),
            progress_entries: 0,
        };
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(fail(e))),
        };
        let reply = match self.state.domain.library_stats(&claims.sub) {
            Ok(stats) => v1::LibraryStatsResponse {
                success: true,
                error: String::new(),
                total: stats.total,
                by_status: stats.by_status.into_iter().collect(),
                progress_entries: stats.progress_entries,
            },
            Err(e) => fail(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn add_to_library(
        &self,
        request: Request<v1::AddToLibraryRequest>,
    ) -> Result<Response<v1::StatusResponse>, Status> {
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(err_status(e))),
        };
        let req = request.into_inner();
        let status = match LibraryStatus::parse(&req.status) {
            Ok(s) => s,
            Err(e) => return Ok(Response::new(err_status(err_text(&e)))),
        };
        let reply = match self
            .state
            .domain
            .add_to_library(&claims.sub, &req.manga_id, status)
        {
            Ok(change) => {
                if change.changed {
                    spawn_library_effects(&self.state, &claims.username, change, false);
                }
                ok_status()
            }
            Err(e) => err_status(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn remove_from_library(
        &self,
        request: Request<v1::RemoveFromLibraryRequest>,
    ) -> Result<Response<v1::StatusResponse>, Status> {
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(err_status(e))),
        };
        let req = request.into_inner();
        let reply = match self
            .state
            .domain
            .remove_from_library(&claims.sub, &req.manga_id)
        {
            Ok(change) => {
                spawn_library_effects(&self.state, &claims.username, change, true);
                ok_status()
            }
            Err(e) => err_status(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn rate_manga(
        &self,
        request: Request<v1::RateMangaRequest>,
    ) -> Result<Response<v1::StatusResponse>, Status> {
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(err_status(e))),
        };
        let req = request.into_inner();
        let value = u8::try_from(req.rating).unwrap_or(u8::MAX);
        let reply = match self.state.domain.rate_manga(&claims.sub, &req.manga_id, value) {
            Ok(()) => ok_status(),
            Err(e) => err_status(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn delete_rating(
        &self,
        request: Request<v1::DeleteRatingRequest>,
    ) -> Result<Response<v1::StatusResponse>, Status> {
        let claims = match self.claims(&request) {
            Ok(c) => c,
            Err(e) => return Ok(Response::new(err_status(e))),
        };
        let req = request.into_inner();
        let reply = match self.state.domain.delete_rating(&claims.sub, &req.manga_id) {
            Ok(()) => ok_status(),
            Err(e) => err_status(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn get_rating_stats(
        &self,
        request: Request<v1::GetRatingStatsRequest>,
    ) -> Result<Response<v1::RatingStatsResponse>, Status> {
        let viewer = self.optional_claims(&request);
        let req = request.into_inner();
        let reply = match self
            .state
            .domain
            .rating_stats(&req.manga_id, viewer.as_ref().map(|c| c.sub.as_str()))
        {
            Ok(stats) => v1::RatingStatsResponse {
                success: true,
                error: String::new(),
                average_rating: stats.average_rating,
                total_ratings: stats.total_ratings,
                user_rating: stats.user_rating.unwrap_or(0) as u32,
                has_user_rating: stats.user_rating.is_some(),
                rating_distribution: stats
                    .rating_distribution
                    .iter()
                    .map(|(value, count)| (*value as u32, *count))
                    .collect(),
            },
            Err(e) => v1::RatingStatsResponse {
                success: false,
                error: err_text(&e),
                average_rating: 0.0,
                total_ratings: 0,
                user_rating: 0,
                has_user_rating: false,
                rating_distribution: Default::default(),
            },
        };
        Ok(Response::new(reply))
    }

    async fn get_manga(
        &self,
        request: Request<v1::GetMangaRequest>,
    ) -> Result<Response<v1::MangaResponse>, Status> {
        let req = request.into_inner();
        let reply = match self.state.domain.get_manga(&req.id) {
            Ok(manga) => v1::MangaResponse {
                success: true,
                error: String::new(),
                manga: Some(manga_info(&manga)),
            },
            Err(e) => v1::MangaResponse {
                success: false,
                error: err_text(&e),
                manga: None,
            },
        };
        Ok(Response::new(reply))
    }

    async fn search_manga(
        &self,
        request: Request<v1::SearchMangaRequest>,
    ) -> Result<Response<v1::MangaListResponse>, Status> {
        let fail = |error: String| v1::MangaListResponse {
            success: false,
            error,
            manga: vec![],
        };
        let req = request.into_inner();
        let status = match parse_optional(&req.status, MangaStatus::parse) {
            Ok(s) => s,
            Err(e) => return Ok(Response::new(fail(err_text(&e)))),
        };
        let sort = match parse_sort(&req.sort) {
            Ok(s) => s,
            Err(e) => return Ok(Response::new(fail(e))),
        };
        let query = SearchQuery {
            q: non_empty(req.query),
            genre: non_empty(req.genre),
            status,
            sort,
            page: req.page,
            limit: if req.limit == 0 { 20 } else { req.limit },
        };
        let reply = match self.state.domain.search_manga(&query) {
            Ok(results) => v1::MangaListResponse {
                success: true,
                error: String::new(),
                manga: results.iter().map(manga_info).collect(),
            },
            Err(e) => fail(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn get_popular_manga(
        &self,
        request: Request<v1::PopularMangaRequest>,
    ) -> Result<Response<v1::MangaListResponse>, Status> {
        let req = request.into_inner();
        let limit = if req.limit == 0 { 10 } else { req.limit };
        let reply = match self.state.domain.popular_manga(limit) {
            Ok(results) => v1::MangaListResponse {
                success: true,
                error: String::new(),
                manga: results.iter().map(manga_info).collect(),
            },
            Err(e) => v1::MangaListResponse {
                success: false,
                error: err_text(&e),
                manga: vec![],
            },
        };
        Ok(Response::new(reply))
    }

    async fn get_genres(
        &self,
        _request: Request<v1::Empty>,
    ) -> Result<Response<v1::GenresResponse>, Status> {
        let reply = match self.state.domain.genres() {
            Ok(genres) => v1::GenresResponse {
                success: true,
                error: String::new(),
                genres,
            },
            Err(e) => v1::GenresResponse {
                success: false,
                error: err_text(&e),
                genres: vec![],
            },
        };
        Ok(Response::new(reply))
    }

    async fn get_catalog_stats(
        &self,
        _request: Request<v1::Empty>,
    ) -> Result<Response<v1::CatalogStatsResponse>, Status> {
        let reply = match self.state.domain.catalog_stats() {
            Ok(stats) => v1::CatalogStatsResponse {
                success: true,
                error: String::new(),
                manga_count: stats.manga_count,
                chapter_count: stats.chapter_count,
                user_count: stats.user_count,
                rating_count: stats.rating_count,
            },
            Err(e) => v1::CatalogStatsResponse {
                success: false,
                error: err_text(&e),
                manga_count: 0,
                chapter_count: 0,
                user_count: 0,
                rating_count: 0,
            },
        };
        Ok(Response::new(reply))
    }

    async fn get_chapter_list(
        &self,
        request: Request<v1::GetChapterListRequest>,
    ) -> Result<Response<v1::ChapterListResponse>, Status> {
        let req = request.into_inner();
        let limit = if req.limit == 0 { 100 } else { req.limit };
        let reply = match self
            .state
            .domain
            .chapter_list(&req.manga_id, &req.langs, limit, req.offset)
        {
            Ok(chapters) => v1::ChapterListResponse {
                success: true,
                error: String::new(),
                chapters: chapters.iter().map(chapter_info).collect(),
            },
            Err(e) => v1::ChapterListResponse {
                success: false,
                error: err_text(&e),
                chapters: vec![],
            },
        };
        Ok(Response::new(reply))
    }

    async fn get_chapter_pages(
        &self,
        request: Request<v1::GetChapterPagesRequest>,
    ) -> Result<Response<v1::ChapterPagesResponse>, Status> {
        let req = request.into_inner();
        let source = non_empty(req.source);
        let reply = match self
            .state
            .domain
            .chapter_pages(&req.chapter_id, source.as_deref())
        {
            Ok(pages) => v1::ChapterPagesResponse {
                success: true,
                error: String::new(),
                chapter_id: pages.chapter_id,
                pages: pages.pages,
                external_url: pages.external_url.unwrap_or_default(),
                is_external: pages.is_external,
            },
            Err(e) => v1::ChapterPagesResponse {
                success: false,
                error: err_text(&e),
                chapter_id: String::new(),
                pages: vec![],
                external_url: String::new(),
                is_external: false,
            },
        };
        Ok(Response::new(reply))
    }

    async fn create_manga(
        &self,
        request: Request<v1::CreateMangaRequest>,
    ) -> Result<Response<v1::MangaResponse>, Status> {
        let fail = |error: String| v1::MangaResponse {
            success: false,
            error,
            manga: None,
        };
        if let Err(e) = self.admin_claims(&request) {
            return Ok(Response::new(fail(e)));
        }
        let req = request.into_inner();
        let status = match MangaStatus::parse(&req.status) {
            Ok(s) => s,
            Err(e) => return Ok(Response::new(fail(err_text(&e)))),
        };
        let new = NewManga {
            id: req.id,
            title: req.title,
            author: req.author,
            status,
            total_chapters: req.total_chapters,
            genres: req.genres,
            description: req.description,
            cover_url: req.cover_url,
            publication_year: req.publication_year,
        };
        let reply = match self.state.domain.create_manga(&new) {
            Ok(manga) => {
                // Same side-effect as the REST handler.
                spawn_manga_effects(
                    &self.state,
                    "manga_update",
                    manga.id.clone(),
                    format!("New manga added: {} by {}", manga.title, manga.author),
                );
                v1::MangaResponse {
                    success: true,
                    error: String::new(),
                    manga: Some(manga_info(&manga)),
                }
            }
            Err(e) => fail(err_text(&e)),
        };
        Ok(Response::new(reply))
    }

    async fn update_manga(
        &self,
        request: Request<v1::UpdateMangaRequest>,
    ) -> Result<Response<v1::MangaResponse>, Status> {
        let fail = |error: String| v1::MangaResponse {
            success: false,
            error,
            manga: None,
        };
        if let Err(e) = self.admin_claims(&request) {
            return Ok(Response::new(fail(e)));
        }
        let req = request.into_inner();
        let status = match req.status.as_deref().map(MangaStatus::parse).transpose() {
            Ok(s) => s,
            Err(e) => return Ok(Response::new(fail(err_text(&e)))),
        };
        let patch = MangaPatch {
            title: req.title,
            author: req.author,
            status,
            total_chapters: req.total_chapters,
            genres: (!req.genres.is_empty()).then_some(req.genres),
            description: req.description,
            cover_url: req.cover_url,
            publication_year: req.publication_year,
        };
        let before = match self.state.domain.get_manga(&req.id) {
            Ok(m) => m,
            Err(e) => return Ok(Response::new(fail(err_text(&e)))),
        };
        let reply = match self.state.domain.update_manga(&req.id, &patch) {
            Ok(manga) => {
                // Same chapter_release/manga_update split as REST.
                let (kind, message) = if manga.total_chapters > before.total_chapters {
                    (
                        "chapter_release",
                        format!(
                            "New chapter of {}: chapter {}",
                            manga.title, manga.total_chapters
                        ),
                    )
                } else {
                    ("manga_update", format!("{} was updated", manga.title))
                };
                spawn_manga_effects(&self.state, kind, manga.id.clone(), message);
                v1::MangaResponse {
                    success: true,
                    error: String::new(),
                    manga: Some(manga_info(&manga)),
                }
            }
            Err(e) => fail(err_text(&e)),
        };
        Ok(Response::new(reply))
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Empty string means "absent"; anything else must parse.
fn parse_optional<T>(
    raw: &str,
    parse: impl Fn(&str) -> Result<T, DomainError>,
) -> Result<Option<T>, DomainError> {
    if raw.is_empty() {
        Ok(None)
    } else {
        parse(raw).map(Some)
    }
}

fn parse_sort(raw: &str) -> Result<SortKey, String> {
    match raw {
        "" | "title" => Ok(SortKey::Title),
        "rating" => Ok(SortKey::Rating),
        "popularity" => Ok(SortKey::Popularity),
        "year" => Ok(SortKey::Year),
        "newest" => Ok(SortKey::Newest),
        other => Err(format!("unknown sort '{other}'")),
    }
}

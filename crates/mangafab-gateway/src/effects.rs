// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Best-effort side effects on state change.
//!
//! Intent success is defined by the store mutation alone. Everything in
//! this module runs on spawned tasks, logs failures, and swallows them:
//! a dead bus must never abort the REST/gRPC call that triggered it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use mangafab_core::service::{LibraryChange, ProgressEvent};
use mangafab_notify_bus::Notification;
use mangafab_progress_bus::ProgressFrame;

use crate::state::AppState;

const TRIGGER_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the bus admin trigger ports.
#[derive(Clone)]
pub struct TriggerClient {
    http: reqwest::Client,
    tcp_trigger_url: String,
    udp_trigger_url: String,
}

impl TriggerClient {
    pub fn new(tcp_trigger_url: String, udp_trigger_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(TRIGGER_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            tcp_trigger_url,
            udp_trigger_url,
        }
    }

    /// POST a progress frame to the TCP bus admin port.
    pub async fn trigger_progress(&self, frame: &ProgressFrame) {
        self.post(&self.tcp_trigger_url, frame).await;
    }

    /// POST a notification to the UDP bus admin port.
    pub async fn trigger_notification(&self, notification: &Notification) {
        self.post(&self.udp_trigger_url, notification).await;
    }

    async fn post<T: serde::Serialize>(&self, url: &str, body: &T) {
        match self.http.post(url).json(body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("Trigger {url} accepted");
            }
            Ok(resp) => {
                warn!("Trigger {url} answered {}; swallowed", resp.status());
            }
            Err(e) => {
                warn!("Trigger {url} unreachable: {e}; swallowed");
            }
        }
    }
}

/// Fan a progress mutation out: TCP bus trigger, chat-room projection,
/// and a library notification when the update also shelved the manga.
pub fn spawn_progress_effects(state: &Arc<AppState>, event: ProgressEvent) {
    let state = state.clone();
    tokio::spawn(async move {
        let frame = ProgressFrame {
            user_id: event.user_id.clone(),
            username: event.username.clone(),
            manga_title: event.manga_title.clone(),
            chapter: event.chapter,
            timestamp: event.timestamp,
        };
        state.triggers.trigger_progress(&frame).await;

        let room = format!("manga:{}", event.manga_id);
        state
            .chat
            .broadcast_progress_update(&room, &event.user_id, &event.username, event.chapter)
            .await;

        if let Some(status) = event.library_status {
            let notification = Notification {
                kind: "library_add".into(),
                manga_id: Some(event.manga_id.clone()),
                message: format!(
                    "{} shelved {} as {}",
                    event.username,
                    event.manga_title,
                    status.as_str()
                ),
                timestamp: event.timestamp,
            };
            state.triggers.trigger_notification(&notification).await;
        }
    });
}

/// Fan a library mutation out: UDP notification plus the chat-room
/// projection for members watching the manga.
pub fn spawn_library_effects(
    state: &Arc<AppState>,
    username: &str,
    change: LibraryChange,
    removed: bool,
) {
    let state = state.clone();
    let username = username.to_string();
    tokio::spawn(async move {
        let (kind, message) = if removed {
            (
                "library_remove",
                format!("{} removed {} from their library", username, change.manga_title),
            )
        } else {
            let status = change
                .status
                .map(|s| s.as_str())
                .unwrap_or("reading");
            (
                "library_add",
                format!("{} shelved {} as {}", username, change.manga_title, status),
            )
        };
        let notification = Notification {
            kind: kind.into(),
            manga_id: Some(change.manga_id.clone()),
            message: message.clone(),
            timestamp: mangafab_core::auth::unix_now(),
        };
        state.triggers.trigger_notification(&notification).await;
        state
            .chat
            .broadcast_notification(&format!("manga:{}", change.manga_id), kind, &message)
            .await;
    });
}

/// Fan an admin catalog mutation out: `manga_update` or
/// `chapter_release` notification plus the chat-room projection.
pub fn spawn_manga_effects(
    state: &Arc<AppState>,
    kind: &'static str,
    manga_id: String,
    message: String,
) {
    let state = state.clone();
    tokio::spawn(async move {
        let notification = Notification {
            kind: kind.into(),
            manga_id: Some(manga_id.clone()),
            message: message.clone(),
            timestamp: mangafab_core::auth::unix_now(),
        };
        state.triggers.trigger_notification(&notification).await;
        state
            .chat
            .broadcast_notification(&format!("manga:{manga_id}"), kind, &message)
            .await;
    });
}

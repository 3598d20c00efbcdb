// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! SSE bridge: in-process hubs re-projecting bus streams to browsers.
//!
//! The gateway owns two hubs, one per stream kind. Frames bridged from
//! the TCP/UDP clients are published into the matching hub and delivered
//! to every connected SSE client. Each client gets a `connected` event on
//! attach, a `message` event per frame, and a `ping` every 30 seconds;
//! request cancellation drops the stream, which unregisters the client.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::auth::AuthUser;
use crate::state::AppState;

const SSE_KEEPALIVE: Duration = Duration::from_secs(30);
const SSE_CLIENT_QUEUE: usize = 100;

/// Fan-out hub: client id → bounded sender.
pub struct Hub<T> {
    inner: Arc<HubInner<T>>,
}

struct HubInner<T> {
    clients: dashmap::DashMap<u64, mpsc::Sender<T>>,
    next_id: AtomicU64,
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Hub<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                clients: dashmap::DashMap::new(),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Attach a client; returns its id and the receiving end.
    pub fn register(&self, capacity: usize) -> (u64, mpsc::Receiver<T>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(capacity);
        self.inner.clients.insert(id, tx);
        (id, rx)
    }

    pub fn unregister(&self, id: u64) {
        self.inner.clients.remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }
}

impl<T: Clone> Hub<T> {
    /// Deliver one item to every client. A full queue drops the item for
    /// that client (best-effort); a gone receiver is removed. Returns the
    /// delivery count.
    pub fn publish(&self, item: T) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();
        for entry in self.inner.clients.iter() {
            match entry.value().try_send(item.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*entry.key()),
            }
        }
        for id in gone {
            self.inner.clients.remove(&id);
        }
        delivered
    }
}

impl<T: Clone> Default for Hub<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters the SSE client when its stream is dropped (request
/// cancellation included).
struct HubGuard<T> {
    hub: Hub<T>,
    id: u64,
}

impl<T> Drop for HubGuard<T> {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
        debug!("SSE client {} released", self.id);
    }
}

/// GET /sse/progress
pub async fn sse_progress(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // The bridged per-user TCP session may have dropped since login;
    // attaching a progress stream makes the user reconnect-eligible.
    state.tcp_users.connect_user(&claims.sub);
    event_stream(state.progress_hub.clone(), "progress")
}

/// GET /sse/notifications
pub async fn sse_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(_claims): AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    event_stream(state.notify_hub.clone(), "notification")
}

fn event_stream<T>(
    hub: Hub<T>,
    kind: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Clone + Serialize + Send + 'static,
{
    let (id, mut rx) = hub.register(SSE_CLIENT_QUEUE);
    let guard = HubGuard { hub, id };
    debug!("SSE client {id} attached to {kind} stream");

    let stream = async_stream::stream! {
        // Moved into the generator so stream drop releases the client.
        let _guard = guard;

        yield Ok(Event::default()
            .event("connected")
            .data(format!("{{\"stream\":\"{kind}\",\"client_id\":{id}}}")));

        let mut keepalive = tokio::time::interval(SSE_KEEPALIVE);
        keepalive.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                item = rx.recv() => {
                    match item {
                        Some(item) => match serde_json::to_string(&item) {
                            Ok(json) => yield Ok(Event::default().event("message").data(json)),
                            Err(e) => debug!("SSE encode error: {e}"),
                        },
                        None => break,
                    }
                }
                _ = keepalive.tick() => {
                    yield Ok(Event::default().event("ping").data("{}"));
                }
            }
        }
    };

    Sse::new(stream)
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Subscription registry: at most one live connection per user.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// One live subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Monotonic id distinguishing this connection from a replacement.
    pub conn_id: u64,
    pub peer: SocketAddr,
    /// Notified to close this connection when a re-subscribe arrives.
    pub closer: Arc<tokio::sync::Notify>,
    pub last_seen: Instant,
}

/// Registry of live subscriptions keyed by user id.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subs: HashMap<String, Subscription>,
    next_conn_id: u64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription, replacing any previous one for the user.
    ///
    /// Returns the new connection id, its closer, and the closer of the
    /// replaced connection (to be notified by the caller, outside the
    /// lock's critical work).
    pub fn subscribe(
        &mut self,
        user_id: &str,
        peer: SocketAddr,
    ) -> (u64, Arc<tokio::sync::Notify>, Option<Arc<tokio::sync::Notify>>) {
        self.next_conn_id += 1;
        let conn_id = self.next_conn_id;
        let closer = Arc::new(tokio::sync::Notify::new());
        let previous = self.subs.insert(
            user_id.to_string(),
            Subscription {
                conn_id,
                peer,
                closer: closer.clone(),
                last_seen: Instant::now(),
            },
        );
        (conn_id, closer, previous.map(|p| p.closer))
    }

    /// Refresh last_seen, but only for the connection that still owns the
    /// entry.
    pub fn touch(&mut self, user_id: &str, conn_id: u64) {
        if let Some(sub) = self.subs.get_mut(user_id) {
            if sub.conn_id == conn_id {
                sub.last_seen = Instant::now();
            }
        }
    }

    /// Remove the entry if `conn_id` still owns it. A replaced connection
    /// must not tear down its successor's registration.
    pub fn remove_if_current(&mut self, user_id: &str, conn_id: u64) -> bool {
        match self.subs.get(user_id) {
            Some(sub) if sub.conn_id == conn_id => {
                self.subs.remove(user_id);
                true
            }
            _ => false,
        }
    }

    pub fn count(&self) -> usize {
        self.subs.len()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.subs.contains_key(user_id)
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Shared application state.
//!
//! Everything is an explicit service constructed at process start and
//! threaded through here; no process-wide mutable globals.

use std::sync::Arc;
use std::time::Duration;

use mangafab_chat::ChatFabric;
use mangafab_core::Domain;
use mangafab_notify_bus::Notification;
use mangafab_progress_bus::ProgressFrame;

use crate::config::GatewayConfig;
use crate::effects::TriggerClient;
use crate::limit::RateLimiter;
use crate::sse::Hub;
use crate::tcp_client::TcpUserManager;

/// Shared application state.
pub struct AppState {
    pub domain: Domain,
    pub chat: ChatFabric,
    /// SSE fan-out of frames bridged from the TCP progress bus.
    pub progress_hub: Hub<ProgressFrame>,
    /// SSE fan-out of payloads bridged from the UDP notify bus.
    pub notify_hub: Hub<Notification>,
    /// Per-user singleton TCP sessions to the progress bus.
    pub tcp_users: TcpUserManager,
    pub triggers: TriggerClient,
    pub limiter: RateLimiter,
    pub config: GatewayConfig,
    pub shutdown: Arc<tokio::sync::Notify>,
}

impl AppState {
    pub fn new(domain: Domain, config: GatewayConfig) -> Self {
        let progress_hub = Hub::new();
        Self {
            domain,
            chat: ChatFabric::default(),
            notify_hub: Hub::new(),
            tcp_users: TcpUserManager::new(config.tcp_server.clone(), progress_hub.clone()),
            progress_hub,
            triggers: TriggerClient::new(
                config.tcp_trigger_url.clone(),
                config.udp_trigger_url.clone(),
            ),
            limiter: RateLimiter::new(
                config.rate_limit_per_minute,
                Duration::from_secs(60),
            ),
            config,
            shutdown: Arc::new(tokio::sync::Notify::new()),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! mangafab gateway
//!
//! Terminates HTTP/REST, gRPC, WebSocket chat upgrades and SSE streams;
//! enforces auth; calls the domain services; and triggers the TCP/UDP
//! buses on state changes.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (REST 8080, gRPC 50051)
//! mangafab-gateway
//!
//! # Point at remote buses
//! mangafab-gateway --tcp-server 10.0.0.5:7500 \
//!     --tcp-trigger-url http://10.0.0.5:7501/trigger
//! ```
//!
//! Deployment knobs are environment variables (`PORT`, `JWT_SECRET`,
//! `TCP_SERVER_ADDR`, `UDP_SERVER_ADDR`, `CORS_ALLOW_ORIGINS`,
//! `RATE_LIMIT_REQUESTS_PER_MINUTE`, `MAX_REQUEST_SIZE_MB`, …); every
//! flag below falls back to its variable.

mod auth;
mod config;
mod effects;
mod error;
mod grpc;
mod handlers;
mod limit;
mod routes;
mod sse;
mod state;
mod tcp_client;
mod udp_client;
mod ws;

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, Level};

use mangafab_core::{AuthKeys, Domain, Store};

use crate::config::GatewayConfig;
use crate::state::AppState;

/// mangafab gateway - REST + gRPC + WebSocket + SSE front door
#[derive(Parser, Debug)]
#[command(name = "mangafab-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST listener port
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// gRPC listener port
    #[arg(long, env = "GRPC_PORT", default_value = "50051")]
    grpc_port: u16,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "mangafab.db")]
    database: String,

    /// HS256 signing secret for bearer tokens
    #[arg(long, env = "JWT_SECRET", default_value = "dev-secret-change-me")]
    jwt_secret: String,

    /// TCP progress bus data address (per-user sessions)
    #[arg(long, env = "TCP_SERVER_ADDR", default_value = "127.0.0.1:7500")]
    tcp_server: String,

    /// UDP notify bus data address (process-wide registration)
    #[arg(long, env = "UDP_SERVER_ADDR", default_value = "127.0.0.1:7600")]
    udp_server: String,

    /// TCP bus admin trigger URL
    #[arg(long, env = "TCP_TRIGGER_URL", default_value = "http://127.0.0.1:7501/trigger")]
    tcp_trigger_url: String,

    /// UDP bus admin trigger URL
    #[arg(long, env = "UDP_TRIGGER_URL", default_value = "http://127.0.0.1:7601/trigger")]
    udp_trigger_url: String,

    /// Comma-separated CORS origins, or * for any
    #[arg(long, env = "CORS_ALLOW_ORIGINS", default_value = "*")]
    cors_allow_origins: String,

    /// Per-client request budget per minute
    #[arg(long, env = "RATE_LIMIT_REQUESTS_PER_MINUTE", default_value = "120")]
    rate_limit: u32,

    /// Request body cap in MiB
    #[arg(long, env = "MAX_REQUEST_SIZE_MB", default_value = "2")]
    max_request_size_mb: usize,

    /// Comma-separated usernames allowed on admin endpoints
    #[arg(long, env = "ADMIN_USERS", default_value = "")]
    admin_users: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = args.log_level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let config = GatewayConfig::from_args(&args);
    if let Err(e) = config.validate() {
        anyhow::bail!("invalid configuration: {e}");
    }

    info!("mangafab gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("REST:     http://{}:{}", args.bind, args.port);
    info!("gRPC:     {}:{}", args.bind, args.grpc_port);
    info!("TCP bus:  {} (trigger {})", config.tcp_server, config.tcp_trigger_url);
    info!("UDP bus:  {} (trigger {})", config.udp_server, config.udp_trigger_url);

    // Fatal on store-init failure, per the exit-code contract.
    let store = Store::open(&args.database)
        .with_context(|| format!("opening store at {}", args.database))?;
    let domain = Domain::new(store, AuthKeys::new(&config.jwt_secret));

    let state = Arc::new(AppState::new(domain, config.clone()));

    // Process-wide UDP registration feeding the notifications hub.
    let udp_task = udp_client::spawn_udp_bridge(
        config.udp_server.clone(),
        state.notify_hub.clone(),
        state.shutdown.clone(),
    );
    // Idle chat rooms get reaped in the background.
    let reaper = state.chat.spawn_reaper(state.shutdown.clone());

    // REST listener.
    let rest_addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .context("invalid REST bind address")?;
    let rest_listener = tokio::net::TcpListener::bind(rest_addr)
        .await
        .with_context(|| format!("binding REST listener on {rest_addr}"))?;
    let rest_app = routes::build_router(state.clone());
    let rest_shutdown = state.shutdown.clone();
    let rest_task = tokio::spawn(async move {
        axum::serve(
            rest_listener,
            rest_app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { rest_shutdown.notified().await })
        .await
    });

    // gRPC listener.
    let grpc_addr: SocketAddr = format!("{}:{}", args.bind, args.grpc_port)
        .parse()
        .context("invalid gRPC bind address")?;
    let grpc_shutdown = state.shutdown.clone();
    let grpc_service = grpc::service(state.clone());
    let grpc_task = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(grpc_service)
            .serve_with_shutdown(grpc_addr, async move { grpc_shutdown.notified().await })
            .await
    });

    // Signal handling: stop accepting, close sessions, flush bounded.
    let signal_state = state.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping gateway...");
        signal_state.tcp_users.disconnect_all();
        signal_state.shutdown.notify_waiters();
    });

    let (rest_res, grpc_res) = tokio::join!(rest_task, grpc_task);
    if let Ok(Err(e)) = rest_res {
        error!("REST server error: {e}");
        anyhow::bail!("REST server failed");
    }
    if let Ok(Err(e)) = grpc_res {
        error!("gRPC server error: {e}");
        anyhow::bail!("gRPC server failed");
    }
    let _ = udp_task.await;
    let _ = reaper.await;

    info!("Gateway stopped");
    Ok(())
}

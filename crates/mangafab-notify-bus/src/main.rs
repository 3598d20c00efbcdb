// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! mangafab notification bus
//!
//! Fire-and-forget UDP fan-out for domain events.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default ports (data 7600/udp, admin 7601/tcp)
//! mangafab-notify-bus
//!
//! # Custom addresses and a tighter eviction window
//! mangafab-notify-bus --bind 0.0.0.0:9100 --eviction 20
//! ```

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};

use mangafab_notify_bus::{NotifyBus, NotifyConfig};

/// mangafab UDP notification bus - fire-and-forget domain events
#[derive(Parser, Debug)]
#[command(name = "mangafab-notify-bus")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// UDP listener address
    #[arg(long, env = "UDP_BIND_ADDR", default_value = "0.0.0.0:7600")]
    bind: String,

    /// HTTP admin listener address (trigger + health)
    #[arg(long, env = "UDP_ADMIN_BIND", default_value = "127.0.0.1:7601")]
    admin_bind: String,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds without a heartbeat before an endpoint is evicted
    #[arg(long, default_value = "30")]
    eviction: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = args.log_level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let config = if let Some(path) = args.config {
        info!("Loading config from {:?}", path);
        NotifyConfig::from_file(&path)?
    } else {
        NotifyConfig {
            bind_addr: args.bind,
            admin_addr: args.admin_bind,
            eviction_secs: args.eviction,
            ..Default::default()
        }
    };

    info!("mangafab notify bus v{}", env!("CARGO_PKG_VERSION"));
    info!("Data:     {} (udp)", config.bind_addr);
    info!("Admin:    {}", config.admin_addr);
    info!("Eviction: {}s", config.eviction_secs);

    let bus = NotifyBus::bind(config).await?;

    let bus_handle = bus.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping bus...");
        bus_handle.shutdown();
    });

    bus.run().await?;

    info!("Notify bus stopped");
    Ok(())
}

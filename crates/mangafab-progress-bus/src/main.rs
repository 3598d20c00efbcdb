// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! mangafab progress bus
//!
//! Per-user TCP fan-out for reading-progress events.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default ports (data 7500, admin 7501)
//! mangafab-progress-bus
//!
//! # Custom addresses
//! mangafab-progress-bus --bind 0.0.0.0:9000 --admin-bind 127.0.0.1:9001
//! ```

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};

use mangafab_progress_bus::{BusConfig, ProgressBus};

/// mangafab TCP progress bus - per-user fan-out for progress events
#[derive(Parser, Debug)]
#[command(name = "mangafab-progress-bus")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data listener address
    #[arg(long, env = "TCP_BIND_ADDR", default_value = "0.0.0.0:7500")]
    bind: String,

    /// HTTP admin listener address (trigger + health)
    #[arg(long, env = "TCP_ADMIN_BIND", default_value = "127.0.0.1:7501")]
    admin_bind: String,

    /// Configuration file (JSON format); flags override nothing when set
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds a subscription may stay silent before it is reaped
    #[arg(long, default_value = "90")]
    read_deadline: u64,

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
        BusConfig::from_file(&path)?
    } else {
        BusConfig {
            bind_addr: args.bind,
            admin_addr: args.admin_bind,
            read_deadline_secs: args.read_deadline,
            ..Default::default()
        }
    };

    info!("mangafab progress bus v{}", env!("CARGO_PKG_VERSION"));
    info!("Data:  {}", config.bind_addr);
    info!("Admin: {}", config.admin_addr);

    let bus = ProgressBus::new(config)?;

    let bus_handle = bus.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping bus...");
        bus_handle.shutdown();
    });

    bus.run().await?;

    info!("Progress bus stopped");
    Ok(())
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! UDP notification bus.
//!
//! Fire-and-forget fan-out of domain events (new manga, chapter release,
//! library changes) to registered UDP endpoints. Delivery is best-effort:
//! datagram loss is expected and receivers must not rely on it.
//!
//! # Wire format
//!
//! UTF-8 datagrams. `REGISTER`, `PING`, `PONG` and `REGISTERED` are bare
//! words; anything else is a JSON notification payload:
//!
//! ```json
//! {"type": "manga_update", "manga_id": "md-42", "message": "…", "timestamp": 1700000000}
//! ```
//!
//! Endpoints register by sending `REGISTER` from the socket they read on
//! and must heartbeat (`PONG` or re-register) before the eviction window
//! elapses.

pub mod config;
pub mod payload;
pub mod server;

pub use config::NotifyConfig;
pub use payload::Notification;
pub use server::NotifyBus;

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! TCP progress bus.
//!
//! Maintains a set of per-user long-lived TCP sessions and fans every
//! progress event out to all of them. Events enter either as a frame
//! written by a subscribed client or as a `POST /trigger` on the HTTP
//! admin port; the two sources are indistinguishable to receivers.
//!
//! # Wire format
//!
//! UTF-8, newline-delimited. The control lines `PING`, `PONG` and
//! `DISCONNECT` are bare words; any other line is JSON. A client starts
//! with a subscribe frame:
//!
//! ```json
//! {"type": "subscribe", "user_id": "…"}
//! ```
//!
//! after which it receives progress frames:
//!
//! ```json
//! {"user_id": "…", "username": "…", "manga_title": "…", "chapter": 12, "timestamp": 1700000000}
//! ```

pub mod config;
pub mod frame;
pub mod server;

pub use config::BusConfig;
pub use frame::{Line, ProgressFrame};
pub use server::ProgressBus;

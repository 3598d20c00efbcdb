// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Chat fabric.
//!
//! A process-wide registry of rooms keyed by topic id (`general`,
//! `manga:{manga_id}`). Rooms exist implicitly on first join and are
//! reaped once empty past an idle threshold. Nothing here touches a
//! socket: sessions are a bounded outbound channel plus an id, and the
//! gateway owns the WebSocket reader/writer tasks on the other side.
//!
//! Domain events (progress updates, notifications) are projected into the
//! matching room so connected members see them inline.

pub mod fabric;
pub mod protocol;
pub mod room;

pub use fabric::{ChatFabric, SessionHandle};
pub use protocol::{ChatError, ClientEvent, RosterUser, ServerEvent, MAX_MESSAGE_LEN};

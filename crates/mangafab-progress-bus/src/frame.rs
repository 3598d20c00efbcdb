// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Wire frames for the progress bus.

use serde::{Deserialize, Serialize};

/// Liveness probe.
pub const PING: &str = "PING";
/// Liveness answer.
pub const PONG: &str = "PONG";
/// Clean client farewell; the server drains queued frames and closes.
pub const DISCONNECT: &str = "DISCONNECT";

/// A progress event as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressFrame {
    pub user_id: String,
    pub username: String,
    pub manga_title: String,
    pub chapter: u32,
    /// Unix seconds.
    pub timestamp: u64,
}

/// The subscribe frame a client sends after connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { user_id: String },
}

/// One classified inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Ping,
    Pong,
    Disconnect,
    Subscribe { user_id: String },
    Progress(ProgressFrame),
    /// Non-JSON, non-control garbage; ignored per protocol.
    Ignored,
}

/// Classify a raw inbound line.
pub fn classify(raw: &str) -> Line {
    match raw.trim() {
        "" => Line::Ignored,
        PING => Line::Ping,
        PONG => Line::Pong,
        DISCONNECT => Line::Disconnect,
        other => {
            if let Ok(ClientFrame::Subscribe { user_id }) = serde_json::from_str(other) {
                return Line::Subscribe { user_id };
            }
            match serde_json::from_str::<ProgressFrame>(other) {
                Ok(frame) => Line::Progress(frame),
                Err(_) => Line::Ignored,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_controls() {
        assert_eq!(classify("PING"), Line::Ping);
        assert_eq!(classify("PONG\r"), Line::Pong);
        assert_eq!(classify("  DISCONNECT "), Line::Disconnect);
    }

    #[test]
    fn classify_subscribe() {
        let line = r#"{"type": "subscribe", "user_id": "u-1"}"#;
        assert_eq!(
            classify(line),
            Line::Subscribe {
                user_id: "u-1".into()
            }
        );
    }

    #[test]
    fn classify_progress() {
        let line = r#"{"user_id":"u-1","username":"guts","manga_title":"Berserk","chapter":12,"timestamp":1700000000}"#;
        match classify(line) {
            Line::Progress(frame) => {
                assert_eq!(frame.username, "guts");
                assert_eq!(frame.chapter, 12);
            }
            other => panic!("expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn classify_garbage_is_ignored() {
        assert_eq!(classify("hello there"), Line::Ignored);
        assert_eq!(classify("{\"type\":\"unknown\"}"), Line::Ignored);
        assert_eq!(classify("{not json"), Line::Ignored);
        assert_eq!(classify(""), Line::Ignored);
    }

    #[test]
    fn progress_frame_roundtrip() {
        let frame = ProgressFrame {
            user_id: "u-1".into(),
            username: "guts".into(),
            manga_title: "Berserk".into(),
            chapter: 364,
            timestamp: 1700000000,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(serde_json::from_str::<ProgressFrame>(&json).unwrap(), frame);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Datagram classification and the notification payload.

use serde::{Deserialize, Serialize};

/// Client registration request.
pub const REGISTER: &str = "REGISTER";
/// Registration acknowledgement.
pub const REGISTERED: &str = "REGISTERED";
/// Liveness probe.
pub const PING: &str = "PING";
/// Liveness answer / heartbeat.
pub const PONG: &str = "PONG";

/// A domain event as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    /// Event kind: `manga_update`, `chapter_release`, `library_add`,
    /// `library_remove`, …
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manga_id: Option<String>,
    pub message: String,
    /// Unix seconds.
    pub timestamp: u64,
}

/// One classified inbound datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    Register,
    Ping,
    Pong,
    Notification(Notification),
    /// Unparseable payload; dropped.
    Ignored,
}

/// Classify a raw datagram.
pub fn classify(raw: &[u8]) -> Datagram {
    let text = match std::str::from_utf8(raw) {
        Ok(t) => t.trim(),
        Err(_) => return Datagram::Ignored,
    };
    match text {
        REGISTER => Datagram::Register,
        PING => Datagram::Ping,
        PONG => Datagram::Pong,
        _ => match serde_json::from_str::<Notification>(text) {
            Ok(n) => Datagram::Notification(n),
            Err(_) => Datagram::Ignored,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_controls() {
        assert_eq!(classify(b"REGISTER"), Datagram::Register);
        assert_eq!(classify(b"PING\n"), Datagram::Ping);
        assert_eq!(classify(b"  PONG  "), Datagram::Pong);
    }

    #[test]
    fn classify_notification() {
        let raw = br#"{"type":"manga_update","manga_id":"md-42","message":"New chapter","timestamp":1700000000}"#;
        match classify(raw) {
            Datagram::Notification(n) => {
                assert_eq!(n.kind, "manga_update");
                assert_eq!(n.manga_id.as_deref(), Some("md-42"));
            }
            other => panic!("expected Notification, got {other:?}"),
        }
    }

    #[test]
    fn classify_garbage() {
        assert_eq!(classify(b"hello"), Datagram::Ignored);
        assert_eq!(classify(&[0xff, 0xfe]), Datagram::Ignored);
        assert_eq!(classify(b"{\"type\":\"x\"}"), Datagram::Ignored); // missing fields
    }

    #[test]
    fn notification_omits_absent_manga_id() {
        let n = Notification {
            kind: "library_add".into(),
            manga_id: None,
            message: "added".into(),
            timestamp: 1,
        };
        let json = serde_json::to_string(&n).unwrap();
        assert!(!json.contains("manga_id"));
        assert!(json.contains("\"type\":\"library_add\""));
    }
}

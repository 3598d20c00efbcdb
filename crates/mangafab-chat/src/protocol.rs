// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Chat wire protocol.
//!
//! JSON frames tagged by `type`. Server→client covers membership,
//! presence and the domain-event projections; client→server is messages
//! only.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound on a chat message body, in characters.
pub const MAX_MESSAGE_LEN: usize = 2000;

/// One entry of the presence roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterUser {
    pub user_id: String,
    pub username: String,
}

/// Server → client frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A member's chat message.
    Message {
        user_id: String,
        username: String,
        message: String,
        timestamp: u64,
    },

    /// Somebody joined the room.
    Join {
        user_id: String,
        username: String,
        message: String,
    },

    /// Somebody left the room.
    Leave {
        user_id: String,
        username: String,
        message: String,
    },

    /// Presence roster, sent to a joiner and after membership changes.
    UserList { users: Vec<RosterUser> },

    /// Progress-event projection (shadow of the TCP bus frame).
    ProgressUpdate {
        user_id: String,
        username: String,
        chapter: u32,
        timestamp: u64,
    },

    /// Domain-notification projection (shadow of the UDP bus payload).
    Notification {
        kind: String,
        message: String,
        timestamp: u64,
    },

    /// Server-originated informational message.
    System { message: String },
}

impl ServerEvent {
    pub fn join(user_id: &str, username: &str) -> Self {
        Self::Join {
            user_id: user_id.to_string(),
            username: username.to_string(),
            message: format!("{username} joined"),
        }
    }

    pub fn leave(user_id: &str, username: &str) -> Self {
        Self::Leave {
            user_id: user_id.to_string(),
            username: username.to_string(),
            message: format!("{username} left"),
        }
    }

    pub fn message(user_id: &str, username: &str, body: &str) -> Self {
        Self::Message {
            user_id: user_id.to_string(),
            username: username.to_string(),
            message: body.to_string(),
            timestamp: unix_now(),
        }
    }
}

/// Client → server frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Message { message: String, room: String },
}

/// Chat fabric error types.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ChatError {
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("message exceeds {MAX_MESSAGE_LEN} characters")]
    MessageTooLong,
    #[error("not a member of room '{0}'")]
    NotAMember(String),
}

/// Validate a message body: non-empty, bounded length.
pub fn validate_message(body: &str) -> Result<(), ChatError> {
    if body.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    if body.chars().count() > MAX_MESSAGE_LEN {
        return Err(ChatError::MessageTooLong);
    }
    Ok(())
}

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_client_message() {
        let json = r#"{"type": "message", "message": "hi", "room": "manga:md-42"}"#;
        let msg: ClientEvent = serde_json::from_str(json).unwrap();
        match msg {
            ClientEvent::Message { message, room } => {
                assert_eq!(message, "hi");
                assert_eq!(room, "manga:md-42");
            }
        }
    }

    #[test]
    fn serialize_server_events() {
        let json = serde_json::to_string(&ServerEvent::join("u-1", "guts")).unwrap();
        assert!(json.contains("\"type\":\"join\""));
        assert!(json.contains("guts joined"));

        let json = serde_json::to_string(&ServerEvent::ProgressUpdate {
            user_id: "u-1".into(),
            username: "guts".into(),
            chapter: 12,
            timestamp: 1700000000,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"progress_update\""));

        let json = serde_json::to_string(&ServerEvent::UserList { users: vec![] }).unwrap();
        assert!(json.contains("\"type\":\"user_list\""));
    }

    #[test]
    fn validate_rejects_boundary_cases() {
        assert_eq!(validate_message(""), Err(ChatError::EmptyMessage));
        assert_eq!(validate_message("   \n"), Err(ChatError::EmptyMessage));
        assert!(validate_message("hello").is_ok());

        let long = "x".repeat(MAX_MESSAGE_LEN);
        assert!(validate_message(&long).is_ok());
        let too_long = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert_eq!(validate_message(&too_long), Err(ChatError::MessageTooLong));
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! One chat room: member set and fan-out.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::protocol::{RosterUser, ServerEvent};

/// One member session. Sessions own only their outbound channel and id;
/// the room never hands out references back into the fabric.
#[derive(Debug)]
pub struct Member {
    pub user_id: String,
    pub username: String,
    pub tx: mpsc::Sender<ServerEvent>,
}

/// A room: members keyed by session id plus an activity timestamp.
#[derive(Debug)]
pub struct Room {
    members: HashMap<String, Member>,
    pub last_activity: Instant,
}

impl Room {
    pub fn new() -> Self {
        Self {
            members: HashMap::new(),
            last_activity: Instant::now(),
        }
    }

    pub fn insert(&mut self, session_id: String, member: Member) {
        self.members.insert(session_id, member);
        self.touch();
    }

    pub fn remove(&mut self, session_id: &str) -> Option<Member> {
        let removed = self.members.remove(session_id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn member(&self, session_id: &str) -> Option<&Member> {
        self.members.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Current presence roster. Duplicate sessions for one user collapse
    /// to a single entry.
    pub fn roster(&self) -> Vec<RosterUser> {
        let mut users: Vec<RosterUser> = Vec::new();
        for member in self.members.values() {
            if !users.iter().any(|u| u.user_id == member.user_id) {
                users.push(RosterUser {
                    user_id: member.user_id.clone(),
                    username: member.username.clone(),
                });
            }
        }
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    /// Queue an event to every member session.
    ///
    /// Non-blocking: a full queue marks the session for closure (slow
    /// client, not the room's problem). Returns the session ids that
    /// overflowed or whose receiver is gone.
    pub fn broadcast(&self, event: &ServerEvent) -> Vec<String> {
        let mut dead = Vec::new();
        for (session_id, member) in &self.members {
            if member.tx.try_send(event.clone()).is_err() {
                dead.push(session_id.clone());
            }
        }
        dead
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(user_id: &str, username: &str, capacity: usize) -> (Member, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Member {
                user_id: user_id.into(),
                username: username.into(),
                tx,
            },
            rx,
        )
    }

    #[test]
    fn test_roster_collapses_duplicate_sessions() {
        let mut room = Room::new();
        let (m1, _rx1) = member("u-1", "guts", 8);
        let (m2, _rx2) = member("u-1", "guts", 8);
        let (m3, _rx3) = member("u-2", "casca", 8);
        room.insert("s-1".into(), m1);
        room.insert("s-2".into(), m2);
        room.insert("s-3".into(), m3);

        assert_eq!(room.len(), 3);
        let roster = room.roster();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].username, "casca");
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let mut room = Room::new();
        let (m1, mut rx1) = member("u-1", "guts", 8);
        let (m2, mut rx2) = member("u-1", "guts", 8);
        room.insert("s-1".into(), m1);
        room.insert("s-2".into(), m2);

        let dead = room.broadcast(&ServerEvent::System {
            message: "hello".into(),
        });
        assert!(dead.is_empty());

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                ServerEvent::System { message } => assert_eq!(message, "hello"),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_broadcast_reports_overflowed_sessions() {
        let mut room = Room::new();
        let (m1, _rx1) = member("u-1", "guts", 1);
        room.insert("s-1".into(), m1);

        assert!(room
            .broadcast(&ServerEvent::System { message: "a".into() })
            .is_empty());
        // Queue full, receiver not draining: second broadcast overflows.
        let dead = room.broadcast(&ServerEvent::System { message: "b".into() });
        assert_eq!(dead, vec!["s-1".to_string()]);
    }

    #[test]
    fn test_broadcast_reports_closed_receivers() {
        let mut room = Room::new();
        let (m1, rx1) = member("u-1", "guts", 8);
        room.insert("s-1".into(), m1);
        drop(rx1);

        let dead = room.broadcast(&ServerEvent::System { message: "a".into() });
        assert_eq!(dead, vec!["s-1".to_string()]);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! The room registry and its fan-out policies.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::protocol::{unix_now, validate_message, ChatError, ServerEvent};
use crate::room::{Member, Room};

/// Handed to the transport side on join: the session's identity plus the
/// receiving end of its bounded outbound queue. Dropping the receiver (or
/// overflowing the queue) ends the session.
pub struct SessionHandle {
    pub session_id: String,
    pub room: String,
    pub user_id: String,
    pub username: String,
    pub events: mpsc::Receiver<ServerEvent>,
}

/// Process-wide chat fabric. Constructed once at startup and threaded
/// through the gateway; rooms are purely in-memory.
#[derive(Clone)]
pub struct ChatFabric {
    rooms: Arc<RwLock<HashMap<String, Room>>>,
    queue_capacity: usize,
    idle_ttl: Duration,
}

impl ChatFabric {
    pub fn new(queue_capacity: usize, idle_ttl: Duration) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            queue_capacity,
            idle_ttl,
        }
    }

    /// Join a topic. The room is created implicitly on first join.
    ///
    /// Broadcasts the join to every member, then sends the presence
    /// roster to the new session. A second session for the same
    /// (user, topic) pair is permitted; each receives broadcasts.
    pub async fn join(&self, topic: &str, user_id: &str, username: &str) -> SessionHandle {
        let session_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(topic.to_string()).or_insert_with(|| {
            info!("Creating room '{topic}'");
            Room::new()
        });

        room.insert(
            session_id.clone(),
            Member {
                user_id: user_id.to_string(),
                username: username.to_string(),
                tx: tx.clone(),
            },
        );
        debug!("'{username}' joined '{topic}' ({session_id})");

        let removed = broadcast_and_reap(room, &ServerEvent::join(user_id, username));
        let _ = tx.try_send(ServerEvent::UserList {
            users: room.roster(),
        });
        announce_departures(room, removed);

        SessionHandle {
            session_id,
            room: topic.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            events: rx,
        }
    }

    /// Leave a topic. Remaining members see the leave and a refreshed
    /// roster; an emptied room stays until the idle reaper collects it.
    pub async fn leave(&self, topic: &str, session_id: &str) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(topic) else {
            return;
        };
        let Some(member) = room.remove(session_id) else {
            return;
        };
        debug!("'{}' left '{topic}' ({session_id})", member.username);
        if !room.is_empty() {
            let removed =
                broadcast_and_reap(room, &ServerEvent::leave(&member.user_id, &member.username));
            let _ = broadcast_and_reap(
                room,
                &ServerEvent::UserList {
                    users: room.roster(),
                },
            );
            announce_departures(room, removed);
        }
    }

    /// Validate, stamp and broadcast a member's message.
    pub async fn publish_message(
        &self,
        topic: &str,
        session_id: &str,
        body: &str,
    ) -> Result<(), ChatError> {
        validate_message(body)?;
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(topic)
            .ok_or_else(|| ChatError::NotAMember(topic.to_string()))?;
        let member = room
            .member(session_id)
            .ok_or_else(|| ChatError::NotAMember(topic.to_string()))?;

        let event = ServerEvent::message(&member.user_id, &member.username, body);
        let removed = broadcast_and_reap(room, &event);
        room.touch();
        announce_departures(room, removed);
        Ok(())
    }

    /// Project a progress event into a room. Members only; an absent room
    /// means nobody is watching and the event is dropped.
    pub async fn broadcast_progress_update(
        &self,
        topic: &str,
        user_id: &str,
        username: &str,
        chapter: u32,
    ) {
        let event = ServerEvent::ProgressUpdate {
            user_id: user_id.to_string(),
            username: username.to_string(),
            chapter,
            timestamp: unix_now(),
        };
        self.project(topic, event).await;
    }

    /// Project a domain notification into a room.
    pub async fn broadcast_notification(&self, topic: &str, kind: &str, message: &str) {
        let event = ServerEvent::Notification {
            kind: kind.to_string(),
            message: message.to_string(),
            timestamp: unix_now(),
        };
        self.project(topic, event).await;
    }

    async fn project(&self, topic: &str, event: ServerEvent) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(topic) {
            let removed = broadcast_and_reap(room, &event);
            announce_departures(room, removed);
        }
    }

    pub async fn member_count(&self, topic: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(topic)
            .map(|r| r.len())
            .unwrap_or(0)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Drop rooms that have been empty past the idle threshold.
    pub async fn reap_idle(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|topic, room| {
            let stale = room.is_empty() && room.last_activity.elapsed() > self.idle_ttl;
            if stale {
                info!("Reaping idle room '{topic}'");
            }
            !stale
        });
        before - rooms.len()
    }

    /// Background reaper; stops when `shutdown` is notified.
    pub fn spawn_reaper(&self, shutdown: Arc<tokio::sync::Notify>) -> tokio::task::JoinHandle<()> {
        let fabric = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(30)) => {
                        fabric.reap_idle().await;
                    }
                    _ = shutdown.notified() => {
                        debug!("Room reaper shutting down");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for ChatFabric {
    fn default() -> Self {
        Self::new(64, Duration::from_secs(300))
    }
}

/// Broadcast, then close every session whose queue overflowed or whose
/// receiver is gone. Returns the removed members.
fn broadcast_and_reap(room: &mut Room, event: &ServerEvent) -> Vec<Member> {
    let dead = room.broadcast(event);
    let mut removed = Vec::new();
    for session_id in dead {
        if let Some(member) = room.remove(&session_id) {
            info!("Closing slow/gone session {session_id} ('{}')", member.username);
            removed.push(member);
        }
    }
    removed
}

/// Tell the survivors about force-closed sessions. One round only;
/// overflow during the announcement is left to the next broadcast.
fn announce_departures(room: &mut Room, removed: Vec<Member>) {
    for member in removed {
        let _ = room.broadcast(&ServerEvent::leave(&member.user_id, &member.username));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    async fn next(handle: &mut SessionHandle) -> ServerEvent {
        timeout(Duration::from_secs(1), handle.events.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_join_sends_roster_and_broadcasts() {
        let fabric = ChatFabric::default();

        let mut a = fabric.join("manga:md-42", "u-a", "guts").await;
        // First event for the joiner: their own join broadcast, then the roster.
        assert_eq!(next(&mut a).await, ServerEvent::join("u-a", "guts"));
        match next(&mut a).await {
            ServerEvent::UserList { users } => assert_eq!(users.len(), 1),
            other => panic!("expected roster, got {other:?}"),
        }

        let mut b = fabric.join("manga:md-42", "u-b", "casca").await;
        // Existing member sees the join.
        assert_eq!(next(&mut a).await, ServerEvent::join("u-b", "casca"));
        // The new member's roster lists both users.
        assert_eq!(next(&mut b).await, ServerEvent::join("u-b", "casca"));
        match next(&mut b).await {
            ServerEvent::UserList { users } => assert_eq!(users.len(), 2),
            other => panic!("expected roster, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_message_flow() {
        let fabric = ChatFabric::default();
        let mut a = fabric.join("general", "u-a", "guts").await;
        let mut b = fabric.join("general", "u-b", "casca").await;

        // Drain join/roster noise.
        next(&mut a).await;
        next(&mut a).await;
        next(&mut a).await;
        next(&mut b).await;
        next(&mut b).await;

        fabric
            .publish_message("general", &a.session_id, "hi")
            .await
            .unwrap();

        match next(&mut b).await {
            ServerEvent::Message {
                username,
                message,
                timestamp,
                ..
            } => {
                assert_eq!(username, "guts");
                assert_eq!(message, "hi");
                assert!(timestamp > 0);
            }
            other => panic!("expected message, got {other:?}"),
        }
        // The sender's own echo is permitted.
        match next(&mut a).await {
            ServerEvent::Message { message, .. } => assert_eq!(message, "hi"),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_message_validation() {
        let fabric = ChatFabric::default();
        let a = fabric.join("general", "u-a", "guts").await;

        assert_eq!(
            fabric.publish_message("general", &a.session_id, "  ").await,
            Err(ChatError::EmptyMessage)
        );
        let oversize = "x".repeat(crate::MAX_MESSAGE_LEN + 1);
        assert_eq!(
            fabric
                .publish_message("general", &a.session_id, &oversize)
                .await,
            Err(ChatError::MessageTooLong)
        );
        assert_eq!(
            fabric.publish_message("general", "not-a-session", "hi").await,
            Err(ChatError::NotAMember("general".into()))
        );
        assert_eq!(
            fabric.publish_message("other-room", &a.session_id, "hi").await,
            Err(ChatError::NotAMember("other-room".into()))
        );
    }

    #[tokio::test]
    async fn test_leave_broadcasts_and_refreshes_roster() {
        let fabric = ChatFabric::default();
        let mut a = fabric.join("general", "u-a", "guts").await;
        let b = fabric.join("general", "u-b", "casca").await;
        let c = fabric.join("general", "u-c", "judeau").await;

        // a sees: own join + roster, b join, c join.
        for _ in 0..4 {
            next(&mut a).await;
        }

        fabric.leave("general", &c.session_id).await;

        assert_eq!(next(&mut a).await, ServerEvent::leave("u-c", "judeau"));
        match next(&mut a).await {
            ServerEvent::UserList { users } => {
                assert_eq!(users.len(), 2);
                assert!(users.iter().all(|u| u.user_id != "u-c"));
            }
            other => panic!("expected roster, got {other:?}"),
        }
        drop(b);
    }

    #[tokio::test]
    async fn test_duplicate_sessions_both_receive() {
        let fabric = ChatFabric::default();
        let mut first = fabric.join("general", "u-a", "guts").await;
        let mut second = fabric.join("general", "u-a", "guts").await;
        let sender = fabric.join("general", "u-b", "casca").await;

        // Drain membership noise: first sees its own join + roster, the
        // second session's join, and the sender's join.
        for _ in 0..4 {
            next(&mut first).await;
        }
        for _ in 0..3 {
            next(&mut second).await;
        }

        fabric
            .publish_message("general", &sender.session_id, "yo")
            .await
            .unwrap();

        for handle in [&mut first, &mut second] {
            match next(handle).await {
                ServerEvent::Message { message, .. } => assert_eq!(message, "yo"),
                other => panic!("expected message, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_projections_reach_members_only() {
        let fabric = ChatFabric::default();
        let mut member = fabric.join("manga:md-42", "u-a", "guts").await;
        let mut outsider = fabric.join("manga:other", "u-b", "casca").await;
        next(&mut member).await;
        next(&mut member).await;
        next(&mut outsider).await;
        next(&mut outsider).await;

        fabric
            .broadcast_progress_update("manga:md-42", "u-z", "zodd", 12)
            .await;
        fabric
            .broadcast_notification("manga:md-42", "chapter_release", "Chapter 365 is out")
            .await;
        // Projecting into a room nobody joined is a no-op.
        fabric
            .broadcast_progress_update("manga:empty", "u-z", "zodd", 1)
            .await;

        match next(&mut member).await {
            ServerEvent::ProgressUpdate { username, chapter, .. } => {
                assert_eq!(username, "zodd");
                assert_eq!(chapter, 12);
            }
            other => panic!("expected progress_update, got {other:?}"),
        }
        match next(&mut member).await {
            ServerEvent::Notification { kind, .. } => assert_eq!(kind, "chapter_release"),
            other => panic!("expected notification, got {other:?}"),
        }

        let silent = timeout(Duration::from_millis(200), outsider.events.recv()).await;
        assert!(silent.is_err(), "non-members must not receive projections");
    }

    #[tokio::test]
    async fn test_overflow_closes_slow_session() {
        let fabric = ChatFabric::new(2, Duration::from_secs(300));
        let slow = fabric.join("general", "u-slow", "slowpoke").await;

        // slow never drains; its queue already holds its join + roster,
        // so the very next broadcast overflows it.
        let sender = fabric.join("general", "u-b", "casca").await;
        assert_eq!(fabric.member_count("general").await, 1);

        fabric
            .publish_message("general", &sender.session_id, "still here")
            .await
            .unwrap();
        assert_eq!(fabric.member_count("general").await, 1);
        drop(slow);
    }

    #[tokio::test]
    async fn test_idle_room_reaped() {
        let fabric = ChatFabric::new(8, Duration::from_millis(10));
        let a = fabric.join("general", "u-a", "guts").await;
        assert_eq!(fabric.room_count().await, 1);

        // Occupied rooms are never reaped.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fabric.reap_idle().await, 0);

        fabric.leave("general", &a.session_id).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fabric.reap_idle().await, 1);
        assert_eq!(fabric.room_count().await, 0);
    }
}

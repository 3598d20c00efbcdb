// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Per-user TCP sessions to the progress bus (gateway side).
//!
//! One outbound session per logged-in user, keyed by user id; a second
//! `connect_user` for the same id is a no-op. The session subscribes as
//! the user, heartbeats every 30 s, and forwards parsed progress frames
//! into the SSE progress hub. On read error the session is dropped and
//! the user becomes reconnect-eligible.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, warn};

use mangafab_progress_bus::frame::{classify, ClientFrame, Line, DISCONNECT, PING, PONG};
use mangafab_progress_bus::ProgressFrame;

use crate::sse::Hub;

const HEARTBEAT: Duration = Duration::from_secs(30);

struct UserSession {
    closer: Arc<Notify>,
}

struct Inner {
    addr: String,
    hub: Hub<ProgressFrame>,
    sessions: DashMap<String, UserSession>,
}

/// Registry of per-user bus sessions.
#[derive(Clone)]
pub struct TcpUserManager {
    inner: Arc<Inner>,
}

impl TcpUserManager {
    pub fn new(addr: String, hub: Hub<ProgressFrame>) -> Self {
        Self {
            inner: Arc::new(Inner {
                addr,
                hub,
                sessions: DashMap::new(),
            }),
        }
    }

    /// Open a session for the user unless one already exists.
    pub fn connect_user(&self, user_id: &str) {
        let closer = Arc::new(Notify::new());
        match self.inner.sessions.entry(user_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => return,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(UserSession {
                    closer: closer.clone(),
                });
            }
        }
        let inner = self.inner.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = drive_session(&inner, &user_id, &closer).await {
                warn!("TCP session for '{user_id}' failed: {e}");
            }
            // Only this session's own entry may be cleaned up; a
            // disconnect+reconnect pair may already own the slot.
            inner
                .sessions
                .remove_if(&user_id, |_, s| Arc::ptr_eq(&s.closer, &closer));
            debug!("TCP session for '{user_id}' ended, reconnect-eligible");
        });
    }

    /// Close the user's session (logout).
    pub fn disconnect_user(&self, user_id: &str) {
        if let Some((_, session)) = self.inner.sessions.remove(user_id) {
            session.closer.notify_one();
        }
    }

    /// Close every session (shutdown).
    pub fn disconnect_all(&self) {
        for entry in self.inner.sessions.iter() {
            entry.value().closer.notify_one();
        }
        self.inner.sessions.clear();
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.inner.sessions.contains_key(user_id)
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }
}

async fn drive_session(
    inner: &Arc<Inner>,
    user_id: &str,
    closer: &Arc<Notify>,
) -> std::io::Result<()> {
    let stream = TcpStream::connect(&inner.addr).await?;
    let (read_half, mut write_half) = stream.into_split();

    let subscribe = serde_json::to_string(&ClientFrame::Subscribe {
        user_id: user_id.to_string(),
    })
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_half.write_all(subscribe.as_bytes()).await?;
    write_half.write_all(b"\n").await?;

    let mut lines = BufReader::new(read_half).lines();
    let mut heartbeat = tokio::time::interval(HEARTBEAT);
    heartbeat.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => match classify(&line) {
                        Line::Progress(frame) => {
                            inner.hub.publish(frame);
                        }
                        Line::Ping => {
                            write_half.write_all(PONG.as_bytes()).await?;
                            write_half.write_all(b"\n").await?;
                        }
                        Line::Pong | Line::Ignored | Line::Subscribe { .. } | Line::Disconnect => {}
                    },
                    None => {
                        debug!("Bus closed the session for '{user_id}'");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                write_half.write_all(PING.as_bytes()).await?;
                write_half.write_all(b"\n").await?;
            }
            _ = closer.notified() => {
                let _ = write_half.write_all(DISCONNECT.as_bytes()).await;
                let _ = write_half.write_all(b"\n").await;
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mangafab_progress_bus::{BusConfig, ProgressBus};
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};

    async fn spawn_bus() -> (ProgressBus, String) {
        let bus = ProgressBus::new(BusConfig {
            bind_addr: "127.0.0.1:0".into(),
            admin_addr: "127.0.0.1:0".into(),
            ..Default::default()
        })
        .unwrap();
        let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let admin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = data.local_addr().unwrap().to_string();
        let run = bus.clone();
        tokio::spawn(async move { run.run_with_listeners(data, admin).await });
        (bus, addr)
    }

    async fn wait_for_bus_subscribers(bus: &ProgressBus, n: usize) {
        for _ in 0..100 {
            if bus.subscriber_count().await == n {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("bus never reached {n} subscribers");
    }

    #[tokio::test]
    async fn test_bridged_frames_reach_the_hub() {
        let (bus, addr) = spawn_bus().await;
        let hub: Hub<ProgressFrame> = Hub::new();
        let manager = TcpUserManager::new(addr, hub.clone());
        let (_id, mut rx) = hub.register(16);

        manager.connect_user("u-1");
        wait_for_bus_subscribers(&bus, 1).await;

        bus.inject(ProgressFrame {
            user_id: "u-2".into(),
            username: "casca".into(),
            manga_title: "Berserk".into(),
            chapter: 9,
            timestamp: 1700000000,
        });

        let frame = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.username, "casca");
        assert_eq!(frame.chapter, 9);

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_connect_is_singleton_per_user() {
        let (bus, addr) = spawn_bus().await;
        let hub: Hub<ProgressFrame> = Hub::new();
        let manager = TcpUserManager::new(addr, hub);

        manager.connect_user("u-1");
        manager.connect_user("u-1");
        manager.connect_user("u-1");
        wait_for_bus_subscribers(&bus, 1).await;
        assert_eq!(manager.session_count(), 1);

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_makes_user_reconnect_eligible() {
        let (bus, addr) = spawn_bus().await;
        let hub: Hub<ProgressFrame> = Hub::new();
        let manager = TcpUserManager::new(addr, hub);

        manager.connect_user("u-1");
        wait_for_bus_subscribers(&bus, 1).await;

        manager.disconnect_user("u-1");
        assert!(!manager.is_connected("u-1"));
        wait_for_bus_subscribers(&bus, 0).await;

        manager.connect_user("u-1");
        wait_for_bus_subscribers(&bus, 1).await;

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_unreachable_bus_leaves_no_session() {
        let hub: Hub<ProgressFrame> = Hub::new();
        // Nothing listens here.
        let manager = TcpUserManager::new("127.0.0.1:1".into(), hub);

        manager.connect_user("u-1");
        for _ in 0..100 {
            if !manager.is_connected("u-1") {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("failed session was never cleaned up");
    }
}

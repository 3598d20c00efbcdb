// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Process-wide UDP registration with the notify bus (gateway side).
//!
//! One registration per gateway process. Incoming notification datagrams
//! are published into the SSE notifications hub; heartbeats keep the
//! endpoint alive; a lost socket re-registers after a backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{debug, warn};

use mangafab_notify_bus::payload::{classify, Datagram, PONG, REGISTER};
use mangafab_notify_bus::Notification;

use crate::sse::Hub;

/// Heartbeat cadence; must stay under the bus's 25 s requirement.
const HEARTBEAT: Duration = Duration::from_secs(20);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Spawn the bridge task. It runs until `shutdown` is notified.
pub fn spawn_udp_bridge(
    server_addr: String,
    hub: Hub<Notification>,
    shutdown: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match run_bridge(&server_addr, &hub, &shutdown).await {
                Ok(()) => {
                    debug!("UDP bridge stopped");
                    break;
                }
                Err(e) => {
                    warn!("UDP bridge error: {e}; re-registering in {RECONNECT_BACKOFF:?}");
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                        _ = shutdown.notified() => break,
                    }
                }
            }
        }
    })
}

async fn run_bridge(
    server_addr: &str,
    hub: &Hub<Notification>,
    shutdown: &Arc<Notify>,
) -> std::io::Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.send_to(REGISTER.as_bytes(), server_addr).await?;
    debug!("Registered with notify bus at {server_addr}");

    let mut heartbeat = tokio::time::interval(HEARTBEAT);
    heartbeat.tick().await; // the first tick fires immediately

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                let (len, _) = result?;
                match classify(&buf[..len]) {
                    Datagram::Notification(n) => {
                        hub.publish(n);
                    }
                    Datagram::Ping => {
                        socket.send_to(PONG.as_bytes(), server_addr).await?;
                    }
                    Datagram::Register | Datagram::Pong | Datagram::Ignored => {}
                }
            }
            _ = heartbeat.tick() => {
                socket.send_to(PONG.as_bytes(), server_addr).await?;
            }
            _ = shutdown.notified() => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mangafab_notify_bus::{NotifyBus, NotifyConfig};
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};

    async fn spawn_bus() -> (NotifyBus, String) {
        let bus = NotifyBus::bind(NotifyConfig {
            bind_addr: "127.0.0.1:0".into(),
            admin_addr: "127.0.0.1:0".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        let addr = bus.local_addr().unwrap().to_string();
        let admin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let run = bus.clone();
        tokio::spawn(async move { run.run_with_admin(admin).await });
        (bus, addr)
    }

    #[tokio::test]
    async fn test_bridge_registers_and_forwards() {
        let (bus, addr) = spawn_bus().await;
        let hub: Hub<Notification> = Hub::new();
        let (_id, mut rx) = hub.register(16);
        let shutdown = Arc::new(Notify::new());

        let task = spawn_udp_bridge(addr, hub.clone(), shutdown.clone());

        for _ in 0..100 {
            if bus.endpoint_count().await == 1 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(bus.endpoint_count().await, 1);

        bus.inject(&Notification {
            kind: "manga_update".into(),
            manga_id: Some("md-42".into()),
            message: "New manga added: Berserk by Kentaro Miura".into(),
            timestamp: 1700000000,
        })
        .await;

        let got = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.kind, "manga_update");

        shutdown.notify_waiters();
        let _ = task.await;
        bus.shutdown();
    }
}

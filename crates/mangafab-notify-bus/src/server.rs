// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Notification bus core implementation.

use crate::config::NotifyConfig;
use crate::payload::{classify, Datagram, Notification, PING, PONG, REGISTERED};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

pub mod registry;

pub use registry::EndpointRegistry;

/// UDP notification bus.
#[derive(Clone)]
pub struct NotifyBus {
    config: Arc<NotifyConfig>,
    socket: Arc<UdpSocket>,
    registry: Arc<RwLock<EndpointRegistry>>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl NotifyBus {
    /// Bind the UDP socket and create the bus.
    pub async fn bind(config: NotifyConfig) -> Result<Self, BusError> {
        config
            .validate()
            .map_err(|e| BusError::Config(e.to_string()))?;
        let socket = UdpSocket::bind(&config.bind_addr)
            .await
            .map_err(|e| BusError::Bind(format!("{}: {e}", config.bind_addr)))?;
        Ok(Self {
            config: Arc::new(config),
            socket: Arc::new(socket),
            registry: Arc::new(RwLock::new(EndpointRegistry::new())),
            shutdown: Arc::new(tokio::sync::Notify::new()),
        })
    }

    /// The bound UDP address (tests bind on port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, BusError> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn endpoint_count(&self) -> usize {
        self.registry
            .read()
            .await
            .live(self.config.eviction_window())
            .len()
    }

    /// Fan a notification out to every live endpoint. Send failures evict
    /// the endpoint. Returns the number of datagrams sent.
    pub async fn inject(&self, notification: &Notification) -> usize {
        let payload = match serde_json::to_vec(notification) {
            Ok(p) => p,
            Err(e) => {
                error!("Notification encode failed: {e}");
                return 0;
            }
        };
        let targets = self
            .registry
            .read()
            .await
            .live(self.config.eviction_window());

        let mut sent = 0;
        let mut failed = Vec::new();
        for addr in targets {
            match self.socket.send_to(&payload, addr).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    warn!("Send to {addr} failed, evicting: {e}");
                    failed.push(addr);
                }
            }
        }
        if !failed.is_empty() {
            let mut reg = self.registry.write().await;
            for addr in failed {
                reg.remove(&addr);
            }
        }
        sent
    }

    /// Run until shutdown: datagram loop, eviction sweeper, admin port.
    pub async fn run(&self) -> Result<(), BusError> {
        let admin = TcpListener::bind(&self.config.admin_addr)
            .await
            .map_err(|e| BusError::Bind(format!("{}: {e}", self.config.admin_addr)))?;
        self.run_with_admin(admin).await
    }

    /// Run with a pre-bound admin listener (tests bind on port 0).
    pub async fn run_with_admin(&self, admin: TcpListener) -> Result<(), BusError> {
        info!(
            "Notify bus listening on {} (admin {})",
            self.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            admin.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        );

        let admin_app = admin_router(self.clone());
        let admin_shutdown = self.shutdown.clone();
        let admin_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(admin, admin_app)
                .with_graceful_shutdown(async move { admin_shutdown.notified().await })
                .await
            {
                error!("Admin listener error: {e}");
            }
        });

        // Eviction sweeper; probes endpoints past half the window.
        let sweeper = {
            let bus = self.clone();
            tokio::spawn(async move {
                let window = bus.config.eviction_window();
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(bus.config.sweep_interval()) => {
                            let (expired, stale) = {
                                let mut reg = bus.registry.write().await;
                                (reg.remove_expired(window), reg.older_than(window / 2))
                            };
                            if !expired.is_empty() {
                                info!("Evicted {} silent endpoints", expired.len());
                                for addr in &expired {
                                    debug!("  - {addr}");
                                }
                            }
                            for addr in stale {
                                let _ = bus.socket.send_to(PING.as_bytes(), addr).await;
                            }
                        }
                        _ = bus.shutdown.notified() => {
                            debug!("Sweeper shutting down");
                            break;
                        }
                    }
                }
            })
        };

        let mut buf = vec![0u8; 64 * 1024];
        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => self.handle_datagram(&buf[..len], peer).await,
                        Err(e) => error!("Receive error: {e}"),
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        let _ = sweeper.await;
        let _ = admin_task.await;
        Ok(())
    }

    async fn handle_datagram(&self, raw: &[u8], peer: SocketAddr) {
        match classify(raw) {
            Datagram::Register => {
                let fresh = self.registry.write().await.register(peer);
                if fresh {
                    info!("Registered endpoint {peer}");
                } else {
                    debug!("Refreshed endpoint {peer}");
                }
                if let Err(e) = self.socket.send_to(REGISTERED.as_bytes(), peer).await {
                    warn!("REGISTERED ack to {peer} failed: {e}");
                }
            }
            Datagram::Pong => {
                self.registry.write().await.touch(&peer);
            }
            Datagram::Ping => {
                self.registry.write().await.touch(&peer);
                let _ = self.socket.send_to(PONG.as_bytes(), peer).await;
            }
            Datagram::Notification(n) => {
                // A registered client's datagram is a broadcast source,
                // same as the admin trigger.
                if self.registry.read().await.contains(&peer) {
                    self.registry.write().await.touch(&peer);
                    let sent = self.inject(&n).await;
                    debug!("Notification '{}' from {peer} fanned out to {sent}", n.kind);
                } else {
                    debug!("Dropping notification from unregistered {peer}");
                }
            }
            Datagram::Ignored => {
                debug!("Ignoring unparseable datagram from {peer}");
            }
        }
    }

    /// Signal the bus to shut down.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

/// HTTP admin surface: event injection and health.
fn admin_router(bus: NotifyBus) -> axum::Router {
    use axum::routing::{get, post};
    axum::Router::new()
        .route("/trigger", post(admin_trigger))
        .route("/health", get(admin_health))
        .with_state(bus)
}

async fn admin_trigger(
    axum::extract::State(bus): axum::extract::State<NotifyBus>,
    axum::Json(notification): axum::Json<Notification>,
) -> axum::Json<serde_json::Value> {
    let sent = bus.inject(&notification).await;
    axum::Json(serde_json::json!({ "status": "ok", "delivered": sent }))
}

async fn admin_health(
    axum::extract::State(bus): axum::extract::State<NotifyBus>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": bus.endpoint_count().await,
    }))
}

/// Bus error types.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Bind error: {0}")]
    Bind(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout, Duration};

    async fn spawn_bus(eviction_secs: u64) -> (NotifyBus, SocketAddr) {
        let bus = NotifyBus::bind(NotifyConfig {
            bind_addr: "127.0.0.1:0".into(),
            admin_addr: "127.0.0.1:0".into(),
            eviction_secs,
            sweep_interval_secs: 1,
        })
        .await
        .unwrap();
        let addr = bus.local_addr().unwrap();
        let admin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let run = bus.clone();
        tokio::spawn(async move { run.run_with_admin(admin).await });
        (bus, addr)
    }

    async fn register(server: SocketAddr) -> UdpSocket {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"REGISTER", server).await.unwrap();
        let mut buf = [0u8; 32];
        let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"REGISTERED");
        client
    }

    fn notification(kind: &str) -> Notification {
        Notification {
            kind: kind.into(),
            manga_id: Some("md-42".into()),
            message: "New manga added: Berserk by Kentaro Miura".into(),
            timestamp: 1700000000,
        }
    }

    #[tokio::test]
    async fn test_register_and_receive_fanout() {
        let (bus, addr) = spawn_bus(30).await;
        let client = register(addr).await;
        assert_eq!(bus.endpoint_count().await, 1);

        let sent = bus.inject(&notification("manga_update")).await;
        assert_eq!(sent, 1);

        let mut buf = [0u8; 2048];
        let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let got: Notification = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(got, notification("manga_update"));

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_endpoint() {
        let (bus, addr) = spawn_bus(30).await;
        let a = register(addr).await;
        let b = register(addr).await;

        let sent = bus.inject(&notification("chapter_release")).await;
        assert_eq!(sent, 2);

        for client in [&a, &b] {
            let mut buf = [0u8; 2048];
            let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            let got: Notification = serde_json::from_slice(&buf[..len]).unwrap();
            assert_eq!(got.kind, "chapter_release");
        }

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_registered_client_datagram_is_a_broadcast_source() {
        let (bus, addr) = spawn_bus(30).await;
        let sender = register(addr).await;
        let receiver = register(addr).await;

        let payload = serde_json::to_vec(&notification("library_add")).unwrap();
        sender.send_to(&payload, addr).await.unwrap();

        let mut buf = [0u8; 2048];
        let (len, _) = timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let got: Notification = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(got.kind, "library_add");

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_eviction_after_silence_and_fresh_reregister() {
        let (bus, addr) = spawn_bus(1).await;
        let client = register(addr).await;
        assert_eq!(bus.endpoint_count().await, 1);

        // Stop heartbeating; wait out the eviction window.
        sleep(Duration::from_millis(1300)).await;
        assert_eq!(bus.endpoint_count().await, 0);
        assert_eq!(bus.inject(&notification("manga_update")).await, 0);

        // A fresh REGISTER from the same address rebuilds the entry.
        client.send_to(b"REGISTER", addr).await.unwrap();
        let mut buf = [0u8; 32];
        timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bus.endpoint_count().await, 1);
        assert_eq!(bus.inject(&notification("manga_update")).await, 1);

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_pong_keeps_endpoint_alive() {
        let (bus, addr) = spawn_bus(1).await;
        let client = register(addr).await;

        for _ in 0..4 {
            sleep(Duration::from_millis(400)).await;
            client.send_to(b"PONG", addr).await.unwrap();
        }
        sleep(Duration::from_millis(100)).await;
        assert_eq!(bus.endpoint_count().await, 1);

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_unregistered_sender_is_not_a_source() {
        let (bus, addr) = spawn_bus(30).await;
        let receiver = register(addr).await;

        let outsider = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let payload = serde_json::to_vec(&notification("manga_update")).unwrap();
        outsider.send_to(&payload, addr).await.unwrap();

        let mut buf = [0u8; 2048];
        let res = timeout(Duration::from_millis(300), receiver.recv_from(&mut buf)).await;
        assert!(res.is_err(), "unregistered sender must not trigger fan-out");

        bus.shutdown();
    }
}

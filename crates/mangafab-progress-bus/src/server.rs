// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Progress bus core implementation.

use crate::config::BusConfig;
use crate::frame::{classify, Line, ProgressFrame, PONG};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

pub mod registry;

pub use registry::SubscriberRegistry;

/// TCP progress bus.
///
/// Per-subscription state machine: CONNECTED (awaiting the subscribe
/// frame) → SUBSCRIBED → DRAINING (after `DISCONNECT`) → CLOSED.
#[derive(Clone)]
pub struct ProgressBus {
    config: Arc<BusConfig>,
    registry: Arc<RwLock<SubscriberRegistry>>,
    events: broadcast::Sender<ProgressFrame>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl ProgressBus {
    /// Create a new bus.
    pub fn new(config: BusConfig) -> Result<Self, BusError> {
        config
            .validate()
            .map_err(|e| BusError::Config(e.to_string()))?;
        let (events, _) = broadcast::channel(config.queue_capacity);
        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(RwLock::new(SubscriberRegistry::new())),
            events,
            shutdown: Arc::new(tokio::sync::Notify::new()),
        })
    }

    /// Inject a progress event, fanning it out to every live
    /// subscription. Returns the number of receivers at send time.
    ///
    /// This is the single broadcast entry point: subscribed client writes
    /// and the HTTP admin trigger both land here.
    pub fn inject(&self, frame: ProgressFrame) -> usize {
        self.events.send(frame).unwrap_or(0)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.registry.read().await.count()
    }

    /// Bind both listeners and run until shutdown.
    pub async fn run(&self) -> Result<(), BusError> {
        let data = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| BusError::Bind(format!("{}: {e}", self.config.bind_addr)))?;
        let admin = TcpListener::bind(&self.config.admin_addr)
            .await
            .map_err(|e| BusError::Bind(format!("{}: {e}", self.config.admin_addr)))?;
        self.run_with_listeners(data, admin).await
    }

    /// Run on pre-bound listeners (tests bind on port 0).
    pub async fn run_with_listeners(
        &self,
        data: TcpListener,
        admin: TcpListener,
    ) -> Result<(), BusError> {
        info!(
            "Progress bus listening on {} (admin {})",
            data.local_addr().map(|a| a.to_string()).unwrap_or_default(),
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

        loop {
            tokio::select! {
                result = data.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!("New connection from {peer_addr}");
                            let bus = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = bus.handle_connection(stream, peer_addr).await {
                                    warn!("Connection error from {peer_addr}: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {e}");
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        let _ = admin_task.await;
        Ok(())
    }

    /// Signal the bus to shut down.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Drive one client connection through its lifecycle.
    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), BusError> {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let deadline = self.config.read_deadline();

        // CONNECTED: nothing is delivered until the subscribe frame.
        let user_id = loop {
            let line = match tokio::time::timeout(deadline, lines.next_line()).await {
                Err(_) => {
                    debug!("{peer_addr} idle before subscribing, closing");
                    return Ok(());
                }
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => return Ok(()),
                Ok(Err(e)) => return Err(e.into()),
            };
            match classify(&line) {
                Line::Ping => write_line(&mut write_half, PONG).await?,
                Line::Disconnect => return Ok(()),
                Line::Subscribe { user_id } => break user_id,
                // Progress writes from unsubscribed peers are not a
                // broadcast source.
                Line::Progress(_) | Line::Pong | Line::Ignored => {}
            }
        };

        // Take the event receiver before publishing the registration so a
        // frame injected right after the count becomes visible is not lost.
        let mut rx = self.events.subscribe();
        let (conn_id, closer, previous) = self
            .registry
            .write()
            .await
            .subscribe(&user_id, peer_addr);
        if let Some(prev) = previous {
            info!("Re-subscribe for '{user_id}', closing previous connection");
            prev.notify_one();
        }
        info!("Subscribed '{user_id}' from {peer_addr}");

        // SUBSCRIBED: pump events out, watch the line for controls and
        // progress writes, reap on silence.
        let idle = tokio::time::sleep(deadline);
        tokio::pin!(idle);
        let mut drain = false;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            idle.as_mut().reset(tokio::time::Instant::now() + deadline);
                            self.registry.write().await.touch(&user_id, conn_id);
                            match classify(&line) {
                                Line::Ping => {
                                    if write_line(&mut write_half, PONG).await.is_err() {
                                        break;
                                    }
                                }
                                Line::Pong => {}
                                Line::Disconnect => {
                                    drain = true;
                                    break;
                                }
                                Line::Progress(frame) => {
                                    let _ = self.events.send(frame);
                                }
                                Line::Subscribe { user_id: other } => {
                                    if other != user_id {
                                        debug!("Ignoring mid-stream re-subscribe as '{other}'");
                                    }
                                }
                                Line::Ignored => {}
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Read error from '{user_id}': {e}");
                            break;
                        }
                    }
                }
                evt = rx.recv() => {
                    match evt {
                        Ok(frame) => {
                            if write_frame(&mut write_half, &frame).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("'{user_id}' lagged, dropped {n} oldest frames");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = closer.notified() => {
                    debug!("Subscription for '{user_id}' replaced, closing {peer_addr}");
                    break;
                }
                _ = self.shutdown.notified() => {
                    drain = true;
                    break;
                }
                _ = &mut idle => {
                    info!("Idle timeout for '{user_id}', reaping");
                    break;
                }
            }
        }

        // DRAINING: flush what is already queued, bounded, then close.
        if drain {
            let mut flushed = 0;
            while flushed < self.config.drain_budget {
                match rx.try_recv() {
                    Ok(frame) => {
                        if write_frame(&mut write_half, &frame).await.is_err() {
                            break;
                        }
                        flushed += 1;
                    }
                    Err(_) => break,
                }
            }
        }

        if self
            .registry
            .write()
            .await
            .remove_if_current(&user_id, conn_id)
        {
            info!("Removed subscription '{user_id}'");
        }
        Ok(())
    }
}

async fn write_line(w: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await
}

async fn write_frame(w: &mut OwnedWriteHalf, frame: &ProgressFrame) -> std::io::Result<()> {
    let json = serde_json::to_string(frame)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_line(w, &json).await
}

/// HTTP admin surface: event injection and health.
fn admin_router(bus: ProgressBus) -> axum::Router {
    use axum::routing::{get, post};
    axum::Router::new()
        .route("/trigger", post(admin_trigger))
        .route("/health", get(admin_health))
        .with_state(bus)
}

async fn admin_trigger(
    axum::extract::State(bus): axum::extract::State<ProgressBus>,
    axum::Json(frame): axum::Json<ProgressFrame>,
) -> axum::Json<serde_json::Value> {
    let delivered = bus.inject(frame);
    axum::Json(serde_json::json!({ "status": "ok", "delivered": delivered }))
}

async fn admin_health(
    axum::extract::State(bus): axum::extract::State<ProgressBus>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "subscribers": bus.subscriber_count().await,
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
    use tokio::io::AsyncReadExt;
    use tokio::time::{sleep, timeout, Duration};

    fn test_bus() -> ProgressBus {
        ProgressBus::new(BusConfig {
            bind_addr: "127.0.0.1:0".into(),
            admin_addr: "127.0.0.1:0".into(),
            ..Default::default()
        })
        .unwrap()
    }

    async fn spawn_bus(bus: &ProgressBus) -> SocketAddr {
        let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let admin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = data.local_addr().unwrap();
        let bus = bus.clone();
        tokio::spawn(async move { bus.run_with_listeners(data, admin).await });
        addr
    }

    async fn wait_for_subscribers(bus: &ProgressBus, n: usize) {
        for _ in 0..100 {
            if bus.subscriber_count().await == n {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("never reached {n} subscribers");
    }

    fn frame(chapter: u32) -> ProgressFrame {
        ProgressFrame {
            user_id: "u-writer".into(),
            username: "guts".into(),
            manga_title: "Berserk".into(),
            chapter,
            timestamp: 1700000000,
        }
    }

    async fn subscribe(addr: SocketAddr, user_id: &str) -> TcpStream {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let sub = format!("{{\"type\":\"subscribe\",\"user_id\":\"{user_id}\"}}\n");
        stream.write_all(sub.as_bytes()).await.unwrap();
        stream
    }

    #[tokio::test]
    async fn test_subscribe_and_receive_broadcast() {
        let bus = test_bus();
        let addr = spawn_bus(&bus).await;

        let stream = subscribe(addr, "u-1").await;
        wait_for_subscribers(&bus, 1).await;

        assert_eq!(bus.inject(frame(12)), 1);

        let mut lines = BufReader::new(stream).lines();
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let got: ProgressFrame = serde_json::from_str(&line).unwrap();
        assert_eq!(got, frame(12));

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_ping_answered_with_pong() {
        let bus = test_bus();
        let addr = spawn_bus(&bus).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"PING\n").await.unwrap();

        let mut buf = [0u8; 5];
        timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"PONG\n");

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_reconnect_replaces_previous_subscription() {
        let bus = test_bus();
        let addr = spawn_bus(&bus).await;

        let conn1 = subscribe(addr, "u-1").await;
        wait_for_subscribers(&bus, 1).await;

        let conn2 = subscribe(addr, "u-1").await;
        // Still exactly one subscription for the user.
        sleep(Duration::from_millis(100)).await;
        assert_eq!(bus.subscriber_count().await, 1);

        // conn1 was closed server-side.
        let mut lines1 = BufReader::new(conn1).lines();
        let eof = timeout(Duration::from_secs(2), lines1.next_line())
            .await
            .unwrap()
            .unwrap();
        assert!(eof.is_none());

        // The next event arrives exactly once, on conn2.
        bus.inject(frame(7));
        let mut lines2 = BufReader::new(conn2).lines();
        let line = timeout(Duration::from_secs(2), lines2.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let got: ProgressFrame = serde_json::from_str(&line).unwrap();
        assert_eq!(got.chapter, 7);

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_subscribed_write_fans_out_to_other_subscriber() {
        let bus = test_bus();
        let addr = spawn_bus(&bus).await;

        let mut writer = subscribe(addr, "u-writer").await;
        let reader = subscribe(addr, "u-reader").await;
        wait_for_subscribers(&bus, 2).await;

        let json = serde_json::to_string(&frame(3)).unwrap();
        writer.write_all(json.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();

        let mut lines = BufReader::new(reader).lines();
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let got: ProgressFrame = serde_json::from_str(&line).unwrap();
        assert_eq!(got, frame(3));

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_garbage_lines_are_ignored() {
        let bus = test_bus();
        let addr = spawn_bus(&bus).await;

        let mut stream = subscribe(addr, "u-1").await;
        wait_for_subscribers(&bus, 1).await;

        stream.write_all(b"this is not json\n{broken\n").await.unwrap();
        sleep(Duration::from_millis(50)).await;

        // Connection survives garbage; events still arrive.
        bus.inject(frame(1));
        let mut lines = BufReader::new(stream).lines();
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(line.contains("\"chapter\":1"));

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_drains_and_closes() {
        let bus = test_bus();
        let addr = spawn_bus(&bus).await;

        let mut stream = subscribe(addr, "u-1").await;
        wait_for_subscribers(&bus, 1).await;

        stream.write_all(b"DISCONNECT\n").await.unwrap();

        // Server closes; subscription is gone.
        let mut lines = BufReader::new(stream).lines();
        let eof = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert!(eof.is_none());
        wait_for_subscribers(&bus, 0).await;

        bus.shutdown();
    }

    #[tokio::test]
    async fn test_inject_without_subscribers() {
        let bus = test_bus();
        assert_eq!(bus.inject(frame(1)), 0);
    }
}

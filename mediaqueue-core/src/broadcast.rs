//! Broadcast Bus (spec §4.9): fans domain events out to local websocket
//! peers, and — in cluster mode — to every other node via PostgreSQL
//! `LISTEN`/`NOTIFY` on the `ffmate` channel.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event_bus::{DomainEvent, EventBus};

/// The one wire-contract channel name shared with every other cluster
/// node (§6) — not an artifact to rename.
const CLUSTER_CHANNEL: &str = "ffmate";
const LOCAL_QUEUE_CAPACITY: usize = 1000;
const CLUSTER_QUEUE_CAPACITY: usize = 1000;
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(90);

/// One frame as written to every websocket peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub subject: String,
    pub payload: serde_json::Value,
}

/// Wire shape of a cluster notify payload (§6): the frame plus the
/// originating session so peers can suppress their own echoes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClusterMessage {
    subject: String,
    payload: serde_json::Value,
    client: Uuid,
}

#[derive(Default)]
pub struct WebsocketPeers {
    peers: Mutex<Vec<mpsc::UnboundedSender<String>>>,
}

impl WebsocketPeers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new peer and returns the receiving half it should
    /// drain and forward to its socket.
    pub async fn register(self: &Arc<Self>) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.lock().await.push(tx);
        rx
    }

    async fn send_all(&self, frame_json: &str) {
        let mut peers = self.peers.lock().await;
        peers.retain(|tx| tx.send(frame_json.to_string()).is_ok());
    }
}

pub struct BroadcastBus {
    local_tx: mpsc::Sender<Frame>,
    cluster_tx: Option<mpsc::Sender<ClusterMessage>>,
    dropped_local: Arc<AtomicU64>,
    dropped_cluster: Arc<AtomicU64>,
    self_session: Uuid,
}

impl BroadcastBus {
    /// Spawns the local consumer, and — if `pool` is `Some` — the
    /// cluster notifier and listener loops (§4.9 "enabled iff the store
    /// is PostgreSQL"). Returns the bus handle and the peer registry.
    pub fn spawn(
        events: EventBus,
        pool: Option<PgPool>,
        self_session: Uuid,
        shutdown: CancellationToken,
    ) -> (Self, Arc<WebsocketPeers>) {
        let peers = WebsocketPeers::new();
        let (local_tx, local_rx) = mpsc::channel(LOCAL_QUEUE_CAPACITY);
        let dropped_local = Arc::new(AtomicU64::new(0));
        let dropped_cluster = Arc::new(AtomicU64::new(0));

        tokio::spawn(run_local_consumer(local_rx, peers.clone(), shutdown.clone()));

        let cluster_tx = pool.as_ref().map(|pool| {
            let (tx, rx) = mpsc::channel(CLUSTER_QUEUE_CAPACITY);
            tokio::spawn(run_cluster_notifier(rx, pool.clone(), shutdown.clone()));
            tokio::spawn(run_cluster_listener(
                pool.clone(),
                peers.clone(),
                self_session,
                dropped_cluster.clone(),
                shutdown.clone(),
            ));
            tx
        });

        let mut receiver = events.subscribe();
        let bus = Self {
            local_tx,
            cluster_tx,
            dropped_local: dropped_local.clone(),
            dropped_cluster: dropped_cluster.clone(),
            self_session,
        };
        let forwarder = bus.sender_handles();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = receiver.recv() => {
                        match event {
                            Ok(event) => forwarder.publish(&event).await,
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });

        (bus, peers)
    }

    fn sender_handles(&self) -> BusSenders {
        BusSenders {
            local_tx: self.local_tx.clone(),
            cluster_tx: self.cluster_tx.clone(),
            dropped_local: self.dropped_local.clone(),
            dropped_cluster: self.dropped_cluster.clone(),
            self_session: self.self_session,
        }
    }

    pub fn dropped_local_count(&self) -> u64 {
        self.dropped_local.load(Ordering::Relaxed)
    }

    pub fn dropped_cluster_count(&self) -> u64 {
        self.dropped_cluster.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
struct BusSenders {
    local_tx: mpsc::Sender<Frame>,
    cluster_tx: Option<mpsc::Sender<ClusterMessage>>,
    dropped_local: Arc<AtomicU64>,
    dropped_cluster: Arc<AtomicU64>,
    self_session: Uuid,
}

impl BusSenders {
    async fn publish(&self, event: &DomainEvent) {
        let frame = Frame {
            subject: event.subject().to_string(),
            payload: event.payload_json(),
        };

        // Enqueue is non-blocking; a full queue drops the newest send
        // (§4.9, §5 ordering guarantee).
        if self.local_tx.try_send(frame.clone()).is_err() {
            self.dropped_local.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(subject = %frame.subject, "local broadcast queue full, dropping");
        }

        if event.is_cluster_eligible() {
            if let Some(cluster_tx) = &self.cluster_tx {
                let message = ClusterMessage {
                    subject: frame.subject.clone(),
                    payload: frame.payload.clone(),
                    client: self.self_session,
                };
                if cluster_tx.try_send(message).is_err() {
                    self.dropped_cluster.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(subject = %frame.subject, "cluster notify queue full, dropping");
                }
            }
        }
    }
}

async fn run_local_consumer(
    mut rx: mpsc::Receiver<Frame>,
    peers: Arc<WebsocketPeers>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Ok(json) = serde_json::to_string(&frame) {
                            peers.send_all(&json).await;
                        }
                    }
                    None => break,
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

async fn run_cluster_notifier(
    mut rx: mpsc::Receiver<ClusterMessage>,
    pool: PgPool,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            message = rx.recv() => {
                match message {
                    Some(message) => {
                        if let Err(e) = notify_one(&pool, &message).await {
                            tracing::warn!(error = %e, "cluster notify failed");
                        }
                    }
                    None => break,
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

async fn notify_one(pool: &PgPool, message: &ClusterMessage) -> Result<(), sqlx::Error> {
    let json = serde_json::to_vec(message).unwrap_or_default();
    let compressed = brotli_compress(&json);
    let encoded = base64_encode(&compressed);
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(CLUSTER_CHANNEL)
        .bind(encoded)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_cluster_listener(
    pool: PgPool,
    peers: Arc<WebsocketPeers>,
    self_session: Uuid,
    dropped_cluster: Arc<AtomicU64>,
    shutdown: CancellationToken,
) {
    let _ = &dropped_cluster;
    let mut listener = match PgListener::connect_with(&pool).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "failed to open cluster LISTEN connection");
            return;
        }
    };
    if let Err(e) = listener.listen(CLUSTER_CHANNEL).await {
        tracing::error!(error = %e, "failed to LISTEN on cluster channel");
        return;
    }

    loop {
        tokio::select! {
            notification = listener.recv() => {
                match notification {
                    Ok(notification) => {
                        if let Some(frame) = decode_cluster_message(notification.payload(), self_session) {
                            if let Ok(json) = serde_json::to_string(&frame) {
                                peers.send_all(&json).await;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "cluster LISTEN connection error");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(KEEPALIVE_INTERVAL) => {
                if listener.ping().await.is_err() {
                    tracing::warn!("cluster LISTEN keepalive ping failed");
                    break;
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

/// Decodes one `pg_notify` payload back into a `Frame`, suppressing
/// messages that originated from this process's own session and
/// stripping the `self` flag from a `client:updated` message that came
/// from elsewhere (§4.9).
fn decode_cluster_message(payload: &str, self_session: Uuid) -> Option<Frame> {
    let compressed = base64_decode(payload)?;
    let json = brotli_decompress(&compressed)?;
    let message: ClusterMessage = serde_json::from_slice(&json).ok()?;
    if message.client == self_session {
        return None;
    }

    let mut payload = message.payload;
    if message.subject == "client:updated" {
        if let Some(obj) = payload.as_object_mut() {
            obj.remove("self");
        }
    }

    Some(Frame {
        subject: message.subject,
        payload,
    })
}

fn brotli_compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let params = brotli::enc::BrotliEncoderParams::default();
    let mut reader = std::io::Cursor::new(data);
    let _ = brotli::BrotliCompress(&mut reader, &mut out, &params);
    out
}

fn brotli_decompress(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut reader = std::io::Cursor::new(data);
    brotli::BrotliDecompress(&mut reader, &mut out).ok()?;
    Some(out)
}

fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn base64_decode(data: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brotli_round_trips() {
        let payload = b"{\"subject\":\"task:updated\"}".to_vec();
        let compressed = brotli_compress(&payload);
        let decompressed = brotli_decompress(&compressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn base64_round_trips() {
        let data = b"hello cluster".to_vec();
        let encoded = base64_encode(&data);
        assert_eq!(base64_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn self_originated_message_is_suppressed() {
        let session = Uuid::new_v4();
        let message = ClusterMessage {
            subject: "task:updated".to_string(),
            payload: serde_json::json!({}),
            client: session,
        };
        let json = serde_json::to_vec(&message).unwrap();
        let compressed = brotli_compress(&json);
        let encoded = base64_encode(&compressed);
        assert!(decode_cluster_message(&encoded, session).is_none());
    }

    #[test]
    fn client_updated_self_flag_is_stripped_from_peers() {
        let sender = Uuid::new_v4();
        let receiver = Uuid::new_v4();
        let message = ClusterMessage {
            subject: "client:updated".to_string(),
            payload: serde_json::json!({"identifier": "node-a", "self": true}),
            client: sender,
        };
        let json = serde_json::to_vec(&message).unwrap();
        let compressed = brotli_compress(&json);
        let encoded = base64_encode(&compressed);
        let frame = decode_cluster_message(&encoded, receiver).unwrap();
        assert!(frame.payload.get("self").is_none());
    }
}

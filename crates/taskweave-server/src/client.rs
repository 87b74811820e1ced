use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use taskweave_core::ServerEvent;
use taskweave_engine::{EventChannel, EventHandler, HandlerError};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Unique client identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event handler for one socket: serializes events into its bounded queue.
///
/// A full queue drops the event instead of stalling the publisher.
struct ClientForwarder {
    id: ClientId,
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl EventHandler for ClientForwarder {
    fn name(&self) -> &str {
        &self.id.0
    }

    async fn handle(&self, event: &ServerEvent) -> Result<(), HandlerError> {
        let json = serde_json::to_string(event)
            .map_err(|e| HandlerError::new(format!("serialize event: {e}")))?;
        match self.tx.try_send(json) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    client_id = %self.id,
                    kind = %event.kind,
                    msg_len = msg.len(),
                    "send queue full, dropping event"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(HandlerError::new("client disconnected"))
            }
        }
    }
}

/// Connected WebSocket clients, each subscribed to every event kind.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<dyn EventHandler>>,
    events: Arc<EventChannel>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(events: Arc<EventChannel>, max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            events,
            max_send_queue: max_send_queue.max(1),
        }
    }

    /// Register a client and subscribe it to all events.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let handler: Arc<dyn EventHandler> = Arc::new(ClientForwarder { id: id.clone(), tx });
        self.events.subscribe_all(Arc::clone(&handler));
        let _ = self.clients.insert(id.clone(), handler);
        (id, rx)
    }

    /// Drop a client and its subscriptions. Returns `false` if unknown.
    pub fn unregister(&self, id: &ClientId) -> bool {
        match self.clients.remove(id) {
            Some((_, handler)) => {
                let _ = self.events.unsubscribe_all(&handler);
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }
}

/// Wait for either task to finish, then abort the other.
async fn join_first(mut a: JoinHandle<()>, mut b: JoinHandle<()>) {
    tokio::select! {
        _ = &mut a => b.abort(),
        _ = &mut b => a.abort(),
    }
}

/// Drive one WebSocket: a writer drains the client's queue (with periodic
/// pings) and a reader waits for close. Inbound text is ignored.
pub async fn handle_ws_connection(
    socket: WebSocket,
    client_id: ClientId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_cid = client_id.clone();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // first tick is immediate

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::<u8>::new().into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(client_id = %writer_cid, "sent ping");
                }
            }
        }
    });

    let reader_cid = client_id.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Close(_) => break,
                WsMessage::Text(text) => {
                    tracing::trace!(client_id = %reader_cid, len = text.as_str().len(), "ignoring client text");
                }
                _ => {}
            }
        }
    });

    join_first(writer, reader).await;

    let _ = registry.unregister(&client_id);
    tracing::info!(client_id = %client_id, "WebSocket client disconnected");
}

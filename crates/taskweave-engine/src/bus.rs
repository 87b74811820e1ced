use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use taskweave_core::{EventKind, ServerEvent};
use tracing::{debug, warn};

pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure reported by a handler. Logged by the channel, never propagated.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Receives events published on an [`EventChannel`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, event: &ServerEvent) -> Result<(), HandlerError>;
}

/// Outcome of one `publish` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Typed publish/subscribe channel shared by the coordinator, routes and
/// WebSocket connections.
///
/// Handlers for one kind run sequentially in subscription order. A handler
/// that errors, panics or exceeds the timeout is skipped with a warning.
pub struct EventChannel {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    handler_timeout: Duration,
}

impl EventChannel {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Register `handler` for `kind`. Duplicate registrations each fire.
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        debug!(kind = %kind, handler = handler.name(), "subscribe");
        self.handlers.write().entry(kind).or_default().push(handler);
    }

    /// Remove one registration of `handler` for `kind`.
    ///
    /// Identity is the `Arc` allocation. Returns `false` when nothing matched.
    pub fn unsubscribe(&self, kind: EventKind, handler: &Arc<dyn EventHandler>) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let Some(pos) = list.iter().position(|h| Arc::ptr_eq(h, handler)) else {
            return false;
        };
        let _ = list.remove(pos);
        if list.is_empty() {
            let _ = handlers.remove(&kind);
        }
        true
    }

    pub fn subscribe_all(&self, handler: Arc<dyn EventHandler>) {
        for kind in EventKind::ALL {
            self.subscribe(kind, Arc::clone(&handler));
        }
    }

    /// Returns how many registrations were removed.
    pub fn unsubscribe_all(&self, handler: &Arc<dyn EventHandler>) -> usize {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.unsubscribe(*kind, handler))
            .count()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to the handlers registered for its kind right now.
    pub async fn publish(&self, event: &ServerEvent) -> PublishReport {
        // Snapshot so the lock is released before any handler runs.
        let snapshot: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();

        let mut report = PublishReport::default();
        for handler in snapshot {
            let fut = AssertUnwindSafe(handler.handle(event)).catch_unwind();
            match tokio::time::timeout(self.handler_timeout, fut).await {
                Ok(Ok(Ok(()))) => report.delivered += 1,
                Ok(Ok(Err(err))) => {
                    warn!(
                        handler = handler.name(),
                        kind = %event.kind,
                        error = %err,
                        "event handler failed"
                    );
                    report.failed += 1;
                }
                Ok(Err(_panic)) => {
                    warn!(handler = handler.name(), kind = %event.kind, "event handler panicked");
                    report.failed += 1;
                }
                Err(_elapsed) => {
                    warn!(
                        handler = handler.name(),
                        kind = %event.kind,
                        timeout_ms = self.handler_timeout.as_millis() as u64,
                        "event handler timed out"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

//! Event store: records server messages sent on a resumable SSE stream so
//! a reconnecting client's `Last-Event-Id` can replay what it missed.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::Future;

use crate::model::ServerJsonRpcMessage;

/// Opaque identifier for one logical SSE stream within a session (one per
/// outstanding request that opened a per-request stream, plus the
/// standalone stream opened by `GET`).
pub type StreamId = String;

/// Opaque, globally-unique, per-stream-monotonic identifier for one stored
/// event. Callers must not parse structure into it; `LocalEventStore`
/// happens to encode `"{stream_id}_{index}"` but that's an implementation
/// detail, not a contract.
pub type EventId = String;

/// Where a server persists the messages it sends on resumable streams, and
/// how it answers a reconnecting client's replay request.
///
/// `store_event` must return an id that is unique across the whole store
/// and strictly increasing within `stream_id` — callers besides
/// `LocalEventStore` (e.g. a Redis-backed store shared across server
/// replicas) are expected to preserve that by using a per-stream sequence
/// rather than a global one, to keep the monotonic property cheap to
/// enforce.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn store_event(
        &self,
        stream_id: StreamId,
        message: ServerJsonRpcMessage,
    ) -> Result<EventId, Self::Error>;

    /// Replay every event stored after `last_event_id`, in order, via
    /// `send`, then report which stream `last_event_id` belonged to (so the
    /// caller knows where to keep appending new events). Returns `Ok(None)`
    /// if `last_event_id` is unknown.
    async fn replay_events_after<F, Fut>(
        &self,
        last_event_id: EventId,
        send: F,
    ) -> Result<Option<StreamId>, Self::Error>
    where
        F: Fn(EventId, ServerJsonRpcMessage) -> Fut + Send,
        Fut: Future<Output = ()> + Send;
}

struct StoredEvent {
    stream_id: StreamId,
    index: u64,
    message: ServerJsonRpcMessage,
}

/// In-memory [`EventStore`], scoped to a single process — the default for
/// a [`super::streamable_http::LocalSessionManager`]. Each stream's events
/// are capped at `max_events_per_stream`; the oldest are dropped to bound
/// memory, trading perfect resumability for a bounded footprint, the same
/// tradeoff any single-process event store has to make.
pub struct LocalEventStore {
    max_events_per_stream: usize,
    events: Mutex<HashMap<EventId, StoredEvent>>,
    next_index: Mutex<HashMap<StreamId, u64>>,
    order: Mutex<HashMap<StreamId, Vec<EventId>>>,
}

impl Default for LocalEventStore {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl LocalEventStore {
    pub fn new(max_events_per_stream: usize) -> Self {
        Self {
            max_events_per_stream,
            events: Mutex::new(HashMap::new()),
            next_index: Mutex::new(HashMap::new()),
            order: Mutex::new(HashMap::new()),
        }
    }

    fn lock_events(&self) -> std::sync::MutexGuard<'_, HashMap<EventId, StoredEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_next_index(&self) -> std::sync::MutexGuard<'_, HashMap<StreamId, u64>> {
        self.next_index.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_order(&self) -> std::sync::MutexGuard<'_, HashMap<StreamId, Vec<EventId>>> {
        self.order.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("local event store is infallible")]
pub struct LocalEventStoreError;

#[async_trait]
impl EventStore for LocalEventStore {
    type Error = LocalEventStoreError;

    async fn store_event(
        &self,
        stream_id: StreamId,
        message: ServerJsonRpcMessage,
    ) -> Result<EventId, Self::Error> {
        let index = {
            let mut next_index = self.lock_next_index();
            let entry = next_index.entry(stream_id.clone()).or_insert(0);
            let index = *entry;
            *entry += 1;
            index
        };
        let event_id = format!("{stream_id}_{index}");

        self.lock_events().insert(
            event_id.clone(),
            StoredEvent {
                stream_id: stream_id.clone(),
                index,
                message,
            },
        );

        let mut order = self.lock_order();
        let ids = order.entry(stream_id).or_default();
        ids.push(event_id.clone());
        if ids.len() > self.max_events_per_stream {
            let evicted = ids.remove(0);
            self.lock_events().remove(&evicted);
        }

        Ok(event_id)
    }

    async fn replay_events_after<F, Fut>(
        &self,
        last_event_id: EventId,
        send: F,
    ) -> Result<Option<StreamId>, Self::Error>
    where
        F: Fn(EventId, ServerJsonRpcMessage) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        let (stream_id, after_index) = match self.lock_events().get(&last_event_id) {
            Some(event) => (event.stream_id.clone(), event.index),
            None => return Ok(None),
        };

        let ids = self
            .lock_order()
            .get(&stream_id)
            .cloned()
            .unwrap_or_default();

        for id in ids {
            let message = {
                let events = self.lock_events();
                match events.get(&id) {
                    Some(event) if event.index > after_index => Some(event.message.clone()),
                    _ => None,
                }
            };
            if let Some(message) = message {
                send(id, message).await;
            }
        }

        Ok(Some(stream_id))
    }
}

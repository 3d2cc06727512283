//! Process-wide session registry: creates and tears down sessions, and
//! turns a [`Session`]'s raw outbound messages into the event-stamped,
//! resumable SSE streams the HTTP layer serves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use uuid::Uuid;

use crate::error::{InitializeError, RmcpError};
use crate::model::{ClientJsonRpcMessage, JsonRpcMessage, RequestId, ServerJsonRpcMessage};
use crate::service::{Service, server::RoleServer, server::serve_server_with_ct};
use crate::transport::event_store::{EventId, EventStore, LocalEventStore, StreamId};

use super::session::{session, SessionHandle, SessionId};

/// One message delivered on an SSE stream, carrying the event id it was
/// stored under so the HTTP layer can emit it as the frame's `id:` field.
#[derive(Debug, Clone)]
pub struct ServerSseMessage {
    pub event_id: Option<EventId>,
    pub message: ServerJsonRpcMessage,
}

/// What a concrete Streamable HTTP binding (axum, or any other framework)
/// needs from session state: create a session, feed it messages, and open
/// streams against it. Mirrors the four HTTP verbs' worth of behavior this
/// transport defines.
#[async_trait]
pub trait SessionManager: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn create_session(&self) -> Result<(SessionId, SessionHandle), Self::Error>;

    async fn initialize_session(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<ServerJsonRpcMessage, Self::Error>;

    async fn has_session(&self, id: &SessionId) -> bool;

    async fn close_session(&self, id: &SessionId) -> Result<(), Self::Error>;

    /// Open the per-request SSE stream for `message` (a `Request`), which
    /// yields exactly the messages routed to it until its response arrives.
    async fn create_stream(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ServerSseMessage> + Send>>, Self::Error>;

    async fn accept_message(&self, id: &SessionId, message: ClientJsonRpcMessage) -> Result<(), Self::Error>;

    /// Open the standalone stream (there is at most one at a time per
    /// session; opening a second replaces the first).
    async fn create_standalone_stream(
        &self,
        id: &SessionId,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ServerSseMessage> + Send>>, Self::Error>;

    /// Resume whichever stream `last_event_id` belonged to (a per-request
    /// stream or the standalone stream) from the event after it, replaying
    /// what was missed before picking up live traffic.
    async fn resume(
        &self,
        id: &SessionId,
        last_event_id: EventId,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ServerSseMessage> + Send>>, Self::Error>;
}

struct Entry {
    handle: SessionHandle,
    /// Awaits the `initialize`/`initialized` handshake; aborted by
    /// `close_session` if the session is torn down before it finishes.
    handshake: tokio::task::JoinHandle<()>,
    /// Populated once the handshake completes, letting `close_session`
    /// cancel the steady-state loop too.
    running: Arc<Mutex<Option<crate::service::RunningService<RoleServer>>>>,
    /// Which request id each per-request stream's event-store stream id
    /// belongs to, so `resume` knows whether a replayed stream id names a
    /// per-request stream (and which one) or the standalone stream.
    request_streams: Mutex<HashMap<StreamId, RequestId>>,
}

/// A [`SessionManager`] over an in-process [`HashMap`], persisting events
/// through a [`LocalEventStore`] by default. Appropriate for a single
/// server process; a multi-replica deployment needs a `SessionManager`
/// backed by shared storage instead (see the event-store resumption note
/// in `DESIGN.md`).
pub struct LocalSessionManager<S, E = LocalEventStore> {
    make_service: Box<dyn Fn() -> S + Send + Sync>,
    sessions: Mutex<HashMap<SessionId, Entry>>,
    event_store: Arc<E>,
}

impl<S> LocalSessionManager<S, LocalEventStore>
where
    S: Service<RoleServer>,
{
    pub fn new(make_service: impl Fn() -> S + Send + Sync + 'static) -> Self {
        Self {
            make_service: Box::new(make_service),
            sessions: Mutex::new(HashMap::new()),
            event_store: Arc::new(LocalEventStore::default()),
        }
    }
}

impl<S, E> LocalSessionManager<S, E>
where
    S: Service<RoleServer>,
    E: EventStore,
{
    pub fn with_event_store(make_service: impl Fn() -> S + Send + Sync + 'static, event_store: Arc<E>) -> Self {
        Self {
            make_service: Box::new(make_service),
            sessions: Mutex::new(HashMap::new()),
            event_store,
        }
    }

    fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|entry| entry.handle.clone())
    }

    fn register_request_stream(&self, id: &SessionId, stream_id: StreamId, request_id: RequestId) {
        if let Some(entry) = self.sessions.lock().unwrap_or_else(|e| e.into_inner()).get(id) {
            entry
                .request_streams
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(stream_id, request_id);
        }
    }

    fn lookup_request_stream(&self, id: &SessionId, stream_id: &StreamId) -> Option<RequestId> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .and_then(|entry| {
                entry
                    .request_streams
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(stream_id)
                    .cloned()
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LocalSessionManagerError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("stream not found for last-event-id {0}")]
    StreamNotFound(EventId),
    #[error(transparent)]
    Initialize(#[from] InitializeError),
    #[error("session accept failed: {0}")]
    Session(#[from] super::session::SessionError),
    #[error("event store error: {0}")]
    EventStore(String),
}

impl From<LocalSessionManagerError> for RmcpError {
    fn from(err: LocalSessionManagerError) -> Self {
        match err {
            LocalSessionManagerError::NotFound(id) => RmcpError::SessionNotFound(id.to_string()),
            LocalSessionManagerError::StreamNotFound(id) => RmcpError::StreamNotFound(id),
            LocalSessionManagerError::Initialize(e) => RmcpError::Initialize(e),
            LocalSessionManagerError::Session(e) => RmcpError::SessionNotFound(e.to_string()),
            LocalSessionManagerError::EventStore(msg) => RmcpError::SessionNotFound(msg),
        }
    }
}

#[async_trait]
impl<S, E> SessionManager for LocalSessionManager<S, E>
where
    S: Service<RoleServer>,
    E: EventStore,
{
    type Error = LocalSessionManagerError;

    async fn create_session(&self) -> Result<(SessionId, SessionHandle), Self::Error> {
        let id: SessionId = Arc::from(Uuid::new_v4().to_string());
        let (handle, transport) = session(id.clone(), 128);
        let service = (self.make_service)();
        let running_slot = Arc::new(Mutex::new(None));
        let handshake = {
            let running_slot = running_slot.clone();
            tokio::spawn(async move {
                match serve_server_with_ct(service, transport, tokio_util::sync::CancellationToken::new()).await {
                    Ok(running) => *running_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(running),
                    Err(error) => tracing::warn!(%error, "initialize handshake failed"),
                }
            })
        };
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).insert(
            id.clone(),
            Entry {
                handle: handle.clone(),
                handshake,
                running: running_slot,
                request_streams: Mutex::new(HashMap::new()),
            },
        );
        Ok((id, handle))
    }

    /// Feed the client's `initialize` request into the freshly created
    /// session and wait for the `InitializeResult` the handshake task
    /// writes back, routed here the same way any other request's response
    /// would be (see [`super::session::SessionHandle::accept_request`]).
    async fn initialize_session(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<ServerJsonRpcMessage, Self::Error> {
        let handle = self.get(id).ok_or_else(|| LocalSessionManagerError::NotFound(id.clone()))?;
        let (tx, mut rx) = mpsc::channel(1);
        handle.accept_request(message, tx).await?;
        rx.recv()
            .await
            .ok_or_else(|| LocalSessionManagerError::NotFound(id.clone()))
    }

    async fn has_session(&self, id: &SessionId) -> bool {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).contains_key(id)
    }

    async fn close_session(&self, id: &SessionId) -> Result<(), Self::Error> {
        let entry = self.sessions.lock().unwrap_or_else(|e| e.into_inner()).remove(id);
        if let Some(entry) = entry {
            entry.handshake.abort();
            if let Some(running) = entry.running.lock().unwrap_or_else(|e| e.into_inner()).take() {
                running.cancel();
            }
        }
        Ok(())
    }

    async fn create_stream(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ServerSseMessage> + Send>>, Self::Error> {
        let handle = self.get(id).ok_or_else(|| LocalSessionManagerError::NotFound(id.clone()))?;
        let request_id = match &message {
            JsonRpcMessage::Request(req) => req.id.clone(),
            _ => unreachable!("create_stream is only called with a Request message"),
        };
        let (raw_tx, raw_rx) = mpsc::channel(32);
        handle.accept_request(message, raw_tx).await?;
        let stream_id: StreamId = format!("{id}-req-{request_id}");
        self.register_request_stream(id, stream_id.clone(), request_id);
        Ok(Box::pin(stamp_with_event_ids(raw_rx, stream_id, self.event_store.clone())))
    }

    async fn accept_message(&self, id: &SessionId, message: ClientJsonRpcMessage) -> Result<(), Self::Error> {
        let handle = self.get(id).ok_or_else(|| LocalSessionManagerError::NotFound(id.clone()))?;
        handle.accept_message(message).await?;
        Ok(())
    }

    async fn create_standalone_stream(
        &self,
        id: &SessionId,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ServerSseMessage> + Send>>, Self::Error> {
        let handle = self.get(id).ok_or_else(|| LocalSessionManagerError::NotFound(id.clone()))?;
        let (raw_tx, raw_rx) = mpsc::channel(32);
        handle.open_standalone(raw_tx);
        let stream_id: StreamId = format!("{id}-standalone");
        Ok(Box::pin(stamp_with_event_ids(raw_rx, stream_id, self.event_store.clone())))
    }

    /// Replay every event stored after `last_event_id` (each keeping its
    /// original event id, never re-stamped), then chain into the live tail
    /// of whichever stream actually owned `last_event_id`: the original
    /// per-request stream if one is still pending, or the standalone
    /// stream otherwise.
    async fn resume(
        &self,
        id: &SessionId,
        last_event_id: EventId,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ServerSseMessage> + Send>>, Self::Error> {
        let handle = self.get(id).ok_or_else(|| LocalSessionManagerError::NotFound(id.clone()))?;

        let (replay_tx, replay_rx) = mpsc::unbounded_channel::<ServerSseMessage>();
        let stream_id = self
            .event_store
            .replay_events_after(last_event_id.clone(), move |event_id, message| {
                let replay_tx = replay_tx.clone();
                async move {
                    let _ = replay_tx.send(ServerSseMessage { event_id: Some(event_id), message });
                }
            })
            .await
            .map_err(|e| LocalSessionManagerError::EventStore(e.to_string()))?
            .ok_or_else(|| LocalSessionManagerError::StreamNotFound(last_event_id.clone()))?;

        let (raw_tx, raw_rx) = mpsc::channel(32);
        match self.lookup_request_stream(id, &stream_id) {
            Some(request_id) => {
                handle.reattach_request(&request_id, raw_tx);
            }
            None => handle.open_standalone(raw_tx),
        }
        let live = stamp_with_event_ids(raw_rx, stream_id, self.event_store.clone());
        let replay = UnboundedReceiverStream::new(replay_rx);
        Ok(Box::pin(replay.chain(live)))
    }
}

fn stamp_with_event_ids<E: EventStore>(
    rx: mpsc::Receiver<ServerJsonRpcMessage>,
    stream_id: StreamId,
    event_store: Arc<E>,
) -> impl Stream<Item = ServerSseMessage> {
    ReceiverStream::new(rx).then(move |message| {
        let stream_id = stream_id.clone();
        let event_store = event_store.clone();
        async move {
            let event_id = event_store.store_event(stream_id, message.clone()).await.ok();
            ServerSseMessage { event_id, message }
        }
    })
}

/// A [`SessionManager`] for stateless mode (§6 of the transport spec): no
/// session is ever retained, every `POST` gets an ephemeral one-shot
/// transport, and `GET`/`DELETE`/resumption are all unsupported.
pub struct NeverSessionManager;

#[async_trait]
impl SessionManager for NeverSessionManager {
    type Error = RmcpError;

    async fn create_session(&self) -> Result<(SessionId, SessionHandle), Self::Error> {
        Err(RmcpError::SessionNotFound("stateless mode has no sessions".into()))
    }

    async fn initialize_session(
        &self,
        id: &SessionId,
        _message: ClientJsonRpcMessage,
    ) -> Result<ServerJsonRpcMessage, Self::Error> {
        Err(RmcpError::SessionNotFound(id.to_string()))
    }

    async fn has_session(&self, _id: &SessionId) -> bool {
        false
    }

    async fn close_session(&self, _id: &SessionId) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn create_stream(
        &self,
        id: &SessionId,
        _message: ClientJsonRpcMessage,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ServerSseMessage> + Send>>, Self::Error> {
        Err(RmcpError::SessionNotFound(id.to_string()))
    }

    async fn accept_message(&self, id: &SessionId, _message: ClientJsonRpcMessage) -> Result<(), Self::Error> {
        Err(RmcpError::SessionNotFound(id.to_string()))
    }

    async fn create_standalone_stream(
        &self,
        id: &SessionId,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ServerSseMessage> + Send>>, Self::Error> {
        Err(RmcpError::SessionNotFound(id.to_string()))
    }

    async fn resume(
        &self,
        id: &SessionId,
        _last_event_id: EventId,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ServerSseMessage> + Send>>, Self::Error> {
        Err(RmcpError::StreamNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::handler::ServerHandler;
    use crate::model::{
        CallToolRequestParam, CallToolResult, ClientNotification, ClientRequest, Content, ErrorData,
        InitializeRequestParam, ProgressNotificationParam, ProgressToken, RequestMeta,
    };
    use crate::service::RequestContext;

    use super::*;

    #[derive(Clone, Default)]
    struct ProgressThenDoneServer;

    impl ServerHandler for ProgressThenDoneServer {
        async fn call_tool(
            &self,
            _request: CallToolRequestParam,
            context: RequestContext<RoleServer>,
        ) -> Result<CallToolResult, ErrorData> {
            let _ = context
                .peer
                .notify_progress(ProgressNotificationParam {
                    progress_token: ProgressToken::from(1u32),
                    progress: 0.5,
                    total: None,
                    message: None,
                })
                .await;
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(CallToolResult::success(vec![Content::text("done")]))
        }
    }

    /// A client that drops its per-request SSE stream after the first
    /// progress event and reconnects via `resume` must keep receiving
    /// events for *that* request, not silently lose the final response to
    /// a dead per-request sender the way a hardcoded `open_standalone`
    /// reattachment would.
    #[tokio::test]
    async fn resume_reattaches_to_the_original_request_not_the_standalone_stream() {
        let manager = LocalSessionManager::new(ProgressThenDoneServer::default);
        let (id, _handle) = manager.create_session().await.unwrap();

        let init_request = JsonRpcMessage::request(
            ClientRequest::InitializeRequest(InitializeRequestParam::default()),
            RequestId::from(0u32),
        );
        manager.initialize_session(&id, init_request).await.unwrap();
        manager
            .accept_message(&id, JsonRpcMessage::notification(ClientNotification::InitializedNotification))
            .await
            .unwrap();

        let request_id = RequestId::from(1u32);
        let call = JsonRpcMessage::request(
            ClientRequest::CallToolRequest(CallToolRequestParam {
                name: "noop".into(),
                arguments: None,
                meta: Some(RequestMeta {
                    progress_token: Some(ProgressToken::from(1u32)),
                }),
            }),
            request_id.clone(),
        );
        let mut stream = manager.create_stream(&id, call).await.unwrap();

        let progress_event = stream.next().await.expect("progress event");
        let last_event_id = progress_event.event_id.expect("progress event carries an id");
        drop(stream); // simulate the client's connection dropping

        let mut resumed = manager.resume(&id, last_event_id).await.unwrap();
        let response = tokio::time::timeout(Duration::from_secs(2), resumed.next())
            .await
            .expect("resumed stream should still receive the response")
            .expect("resumed stream should not end before the response");

        match response.message {
            JsonRpcMessage::Response(resp) => assert_eq!(resp.id, request_id),
            other => panic!("expected the call_tool response, got {other:?}"),
        }
    }
}

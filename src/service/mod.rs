//! The symmetric base session: request/notification dispatch, id
//! correlation, cancellation propagation, and the initialization gate that
//! both [`client`] and [`server`] specialize.

pub mod client;
pub mod server;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::model::{ErrorData, Extensions, JsonRpcMessage, Meta, NumberOrString, RequestId};

pub use client::RoleClient;
pub use server::RoleServer;

/// How long [`Peer::send_request`] waits for an answer before giving up and
/// cancelling the request on the peer.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// One of the two JSON-RPC message directions of a session, parameterized
/// by the type each side sends and receives. [`RoleServer`]/[`RoleClient`]
/// are the only implementors; application code never implements this
/// itself.
pub trait ServiceRole: Send + Sync + Clone + 'static {
    /// Requests this role receives and must answer.
    type Req: Send + Sync + 'static;
    /// Results this role sends in answer to `Req`.
    type Resp: Send + Sync + 'static;
    /// Notifications this role receives.
    type Not: Send + Sync + 'static;
    /// Requests this role sends to its peer.
    type PeerReq: Send + Sync + 'static;
    /// Results the peer sends back in answer to `PeerReq`.
    type PeerResp: Send + Sync + 'static;
    /// Notifications this role sends to its peer.
    type PeerNot: Send + Sync + 'static;
    /// Information about the peer learned at `initialize` time
    /// (`InitializeRequestParam` for a server's view of its client,
    /// `InitializeResult` for a client's view of its server).
    type PeerInfo: Clone + Send + Sync + 'static;
    /// Information this role presents to its peer during the `initialize`
    /// handshake (`InitializeResult` for a server, `InitializeRequestParam`
    /// for a client).
    type Info: Clone + Send + Sync + 'static;
}

/// The message shape this role reads off the wire: inbound requests,
/// inbound notifications, and responses to requests *we* sent.
pub type Inbound<R> =
    JsonRpcMessage<<R as ServiceRole>::Req, <R as ServiceRole>::PeerResp, <R as ServiceRole>::Not>;

/// The message shape this role writes to the wire: requests we send,
/// results answering inbound requests, and notifications we send.
pub type Outbound<R> =
    JsonRpcMessage<<R as ServiceRole>::PeerReq, <R as ServiceRole>::Resp, <R as ServiceRole>::PeerNot>;

/// Monotonic request id allocator for outbound requests, one per
/// [`Peer`].
#[derive(Debug, Default)]
struct AtomicU32RequestIdProvider(AtomicU32);

impl AtomicU32RequestIdProvider {
    fn next(&self) -> RequestId {
        NumberOrString::Number(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

type PendingMap<R> = Mutex<HashMap<RequestId, oneshot::Sender<Result<<R as ServiceRole>::PeerResp, ErrorData>>>>;

struct PeerInner<R: ServiceRole> {
    tx: mpsc::Sender<Outbound<R>>,
    pending: PendingMap<R>,
    ids: AtomicU32RequestIdProvider,
    peer_info: std::sync::RwLock<Option<R::PeerInfo>>,
    ct: CancellationToken,
}

/// A cloneable handle for sending requests/notifications to the peer of a
/// running session and learning what was exchanged at `initialize`.
pub struct Peer<R: ServiceRole> {
    inner: Arc<PeerInner<R>>,
}

impl<R: ServiceRole> Clone for Peer<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: ServiceRole> Peer<R> {
    fn new(tx: mpsc::Sender<Outbound<R>>, ct: CancellationToken) -> Self {
        Self {
            inner: Arc::new(PeerInner {
                tx,
                pending: Mutex::new(HashMap::new()),
                ids: AtomicU32RequestIdProvider::default(),
                peer_info: std::sync::RwLock::new(None),
                ct,
            }),
        }
    }

    pub fn peer_info(&self) -> Option<R::PeerInfo> {
        self.inner
            .peer_info
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_peer_info(&self, info: R::PeerInfo) {
        *self.inner.peer_info.write().unwrap_or_else(|e| e.into_inner()) = Some(info);
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.ct.clone()
    }

    /// Send a notification with no expectation of a reply.
    pub async fn send_notification(&self, notification: R::PeerNot) -> Result<(), ServiceError> {
        self.inner
            .tx
            .send(Outbound::<R>::notification(notification))
            .await
            .map_err(|_| ServiceError::ConnectionClosed)
    }

    /// Send a request and wait for the peer's answer, timing out after
    /// [`DEFAULT_REQUEST_TIMEOUT`]. Use [`send_request_with_timeout`](Self::send_request_with_timeout)
    /// to override the duration for a single call.
    pub async fn send_request(&self, request: R::PeerReq) -> Result<R::PeerResp, ServiceError>
    where
        R::PeerNot: CancelNotification,
    {
        self.send_request_with_timeout(request, DEFAULT_REQUEST_TIMEOUT).await
    }

    /// Send a request and wait for the peer's answer, failing with
    /// [`ServiceError::Timeout`] if no answer arrives within `timeout`. On
    /// timeout the pending slot is removed and `notifications/cancelled` is
    /// sent to the peer so it can stop working on a request nobody is
    /// waiting for anymore.
    pub async fn send_request_with_timeout(
        &self,
        request: R::PeerReq,
        timeout: Duration,
    ) -> Result<R::PeerResp, ServiceError>
    where
        R::PeerNot: CancelNotification,
    {
        let id = self.inner.ids.next();
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), tx);
        if self
            .inner
            .tx
            .send(Outbound::<R>::request(request, id.clone()))
            .await
            .is_err()
        {
            self.inner
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
            return Err(ServiceError::ConnectionClosed);
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(error))) => Err(ServiceError::PeerError(error)),
            Ok(Err(_)) => Err(ServiceError::ConnectionClosed),
            Err(_) => {
                self.inner
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&id);
                let _ = self.send_notification(R::PeerNot::cancelled(id)).await;
                Err(ServiceError::Timeout)
            }
        }
    }

    fn settle_response(&self, id: RequestId, result: Result<R::PeerResp, ErrorData>) {
        if let Some(tx) = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
        {
            let _ = tx.send(result);
        }
    }

    fn drain_pending(&self) {
        for (_, tx) in self
            .inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
        {
            let _ = tx.send(Err(ErrorData::internal_error("connection closed", None)));
        }
    }
}

/// A one-shot capability to answer a specific inbound request.
///
/// Dropping a responder without calling [`respond`](Self::respond) sends
/// `-32603 internal error` back to the peer rather than leaving the
/// request hanging forever: a handler that panics, gets cancelled, or is
/// simply buggy must never cause a silently-stuck caller.
pub struct RequestResponder<R: ServiceRole> {
    id: Option<RequestId>,
    tx: mpsc::Sender<Outbound<R>>,
}

impl<R: ServiceRole> RequestResponder<R> {
    fn new(id: RequestId, tx: mpsc::Sender<Outbound<R>>) -> Self {
        Self { id: Some(id), tx }
    }

    pub async fn respond(mut self, result: Result<R::Resp, ErrorData>) {
        if let Some(id) = self.id.take() {
            let message = match result {
                Ok(resp) => Outbound::<R>::response(resp, id),
                Err(err) => Outbound::<R>::error(err, id),
            };
            let _ = self.tx.send(message).await;
        }
    }
}

impl<R: ServiceRole> Drop for RequestResponder<R> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            let message = Outbound::<R>::error(
                ErrorData::internal_error("handler dropped without responding", None),
                id,
            );
            let _ = self.tx.try_send(message);
        }
    }
}

/// Context handed to a [`Service`] on every inbound request: who to answer
/// as (via `responder`, consumed exactly once), a handle to talk back to
/// the peer unprompted, and a token cancelled if `notifications/cancelled`
/// names this request before it completes.
pub struct RequestContext<R: ServiceRole> {
    pub request_id: RequestId,
    pub meta: Meta,
    pub extensions: Extensions,
    pub peer: Peer<R>,
    pub ct: CancellationToken,
}

/// The handler surface an embedding application implements: how to answer
/// inbound requests and react to inbound notifications.
pub trait Service<R: ServiceRole>: Send + Sync + 'static {
    /// What to present as this role's side of the `initialize` handshake.
    fn get_info(&self) -> R::Info;

    fn handle_request(
        &self,
        request: R::Req,
        context: RequestContext<R>,
    ) -> impl Future<Output = Result<R::Resp, ErrorData>> + Send;

    fn handle_notification(
        &self,
        notification: R::Not,
        extensions: Extensions,
    ) -> impl Future<Output = Result<(), ErrorData>> + Send {
        async move {
            let _ = (notification, extensions);
            Ok(())
        }
    }
}

/// A session that has completed initialization and is running its
/// steady-state message loop in a background task.
pub struct RunningService<R: ServiceRole> {
    peer: Peer<R>,
    ct: CancellationToken,
    handle: tokio::task::JoinHandle<Result<(), ServiceError>>,
}

impl<R: ServiceRole> RunningService<R> {
    pub fn peer(&self) -> &Peer<R> {
        &self.peer
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.ct.clone()
    }

    pub fn cancel(&self) {
        self.ct.cancel();
    }

    pub async fn waiting(self) -> Result<(), ServiceError> {
        self.handle.await?
    }
}

/// Drive `service` over an already-split sink/stream pair until the
/// connection closes or `ct` fires. Does not perform the `initialize`
/// handshake: callers use [`server::serve_server_with_ct`] or
/// [`client::serve_client_with_ct`] for that, both of which read the first
/// message or two directly off `stream`/`sink` before handing off here.
pub(crate) fn spawn_session<R, S, Sk, St>(
    service: Arc<S>,
    sink: Sk,
    stream: St,
    peer: Peer<R>,
    outbound_rx: mpsc::Receiver<Outbound<R>>,
    ct: CancellationToken,
) -> RunningService<R>
where
    R: ServiceRole,
    R::Not: CancelledId,
    S: Service<R>,
    Sk: Sink<Outbound<R>> + Send + Unpin + 'static,
    Sk::Error: std::error::Error + Send + Sync + 'static,
    St: Stream<Item = Inbound<R>> + Send + Unpin + 'static,
{
    let session_ct = ct.clone();
    let session_peer = peer.clone();
    let handle = tokio::spawn(run_session(
        service,
        sink,
        stream,
        outbound_rx,
        session_peer,
        session_ct,
    ));
    RunningService { peer, ct, handle }
}

async fn run_session<R, S, Sk, St>(
    service: Arc<S>,
    mut sink: Sk,
    mut stream: St,
    mut outbound_rx: mpsc::Receiver<Outbound<R>>,
    peer: Peer<R>,
    ct: CancellationToken,
) -> Result<(), ServiceError>
where
    R: ServiceRole,
    R::Not: CancelledId,
    S: Service<R>,
    Sk: Sink<Outbound<R>> + Unpin,
    Sk::Error: std::error::Error + Send + Sync + 'static,
    St: Stream<Item = Inbound<R>> + Unpin,
{
    let in_flight: Arc<Mutex<HashMap<RequestId, CancellationToken>>> = Arc::new(Mutex::new(HashMap::new()));
    let mut handlers = JoinSet::new();

    let result = loop {
        tokio::select! {
            biased;
            _ = ct.cancelled() => break Ok(()),
            Some(message) = outbound_rx.recv() => {
                if let Err(error) = sink.send(message).await {
                    warn!(%error, "transport sink closed");
                    break Err(ServiceError::transport(error));
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(message) => dispatch_inbound(message, &service, &peer, &in_flight, &mut handlers, &ct),
                    None => break Ok(()),
                }
            }
            Some(outcome) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(error) = outcome {
                    if !error.is_cancelled() {
                        warn!(%error, "request handler task panicked");
                    }
                }
            }
        }
    };

    peer.drain_pending();
    handlers.shutdown().await;
    let _ = sink.close().await;
    result
}

fn dispatch_inbound<R, S>(
    message: Inbound<R>,
    service: &Arc<S>,
    peer: &Peer<R>,
    in_flight: &Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
    handlers: &mut JoinSet<()>,
    session_ct: &CancellationToken,
) where
    R: ServiceRole,
    R::Not: CancelledId,
    S: Service<R>,
{
    match message {
        JsonRpcMessage::Request(req) => {
            let id = req.id.clone();
            let request_ct = session_ct.child_token();
            in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(id.clone(), request_ct.clone());
            let context = RequestContext {
                request_id: id.clone(),
                meta: Meta::default(),
                extensions: Extensions::new(),
                peer: peer.clone(),
                ct: request_ct,
            };
            let responder = RequestResponder::new(id.clone(), responder_tx(peer));
            let service = service.clone();
            let in_flight = in_flight.clone();
            let id_for_cleanup = id;
            handlers.spawn(async move {
                let result = service.handle_request(req.request, context).await;
                responder.respond(result).await;
                in_flight
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&id_for_cleanup);
            });
        }
        JsonRpcMessage::Notification(not) => {
            if let Some(cancelled_id) = cancelled_request_id(&not.notification) {
                if let Some(token) = in_flight
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&cancelled_id)
                {
                    token.cancel();
                }
                debug!(%cancelled_id, "request cancelled by peer");
                return;
            }
            let service = service.clone();
            handlers.spawn(async move {
                if let Err(error) = service.handle_notification(not.notification, Extensions::new()).await {
                    warn!(%error, "notification handler failed");
                }
            });
        }
        JsonRpcMessage::Response(resp) => peer.settle_response(resp.id, Ok(resp.result)),
        JsonRpcMessage::Error(err) => peer.settle_response(err.id, Err(err.error)),
        JsonRpcMessage::BatchRequest(_) | JsonRpcMessage::BatchResponse(_) => {
            warn!("batch JSON-RPC messages are not supported, dropping");
        }
    }
}

/// Requires each role's notification type to know how to recognize its own
/// `notifications/cancelled` variant; implemented in `server`/`client`.
fn cancelled_request_id<N: CancelledId>(notification: &N) -> Option<RequestId> {
    notification.cancelled_request_id()
}

/// Implemented by `ClientNotification`/`ServerNotification` so the base
/// session loop can route cancellation without knowing the concrete
/// notification enum.
pub trait CancelledId {
    fn cancelled_request_id(&self) -> Option<RequestId>;
}

/// Implemented by `ServerNotification`/`ClientNotification` (the *peer*
/// notification type of each role) so [`Peer::send_request_with_timeout`]
/// can build a `notifications/cancelled` without knowing the concrete
/// notification enum.
pub trait CancelNotification {
    fn cancelled(request_id: RequestId) -> Self;
}

fn responder_tx<R: ServiceRole>(peer: &Peer<R>) -> mpsc::Sender<Outbound<R>> {
    peer.inner.tx.clone()
}

//! Per-session message routing: decides which open SSE stream (if any) a
//! server-to-client message belongs on.
//!
//! A session may have several HTTP requests in flight at once: a handful
//! of `POST`s each waiting on the response (and progress) for one
//! in-flight client request, and at most one standalone `GET` stream for
//! anything not tied to a particular request. [`Session`] is the
//! [`crate::transport::Transport`] the base session loop reads and writes;
//! routing incoming `POST` bodies in and dispatching outbound messages to
//! the right stream is entirely this module's job.

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::{Sink, Stream};
use tokio::sync::mpsc;
use tracing::trace;

use crate::model::{
    ClientJsonRpcMessage, JsonRpcMessage, ProgressToken, RequestId, ServerJsonRpcMessage, ServerNotification,
};

pub type SessionId = Arc<str>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
}

struct RequestWise {
    progress_token: Option<ProgressToken>,
    tx: mpsc::Sender<ServerJsonRpcMessage>,
}

enum OutboundChannel {
    RequestWise(mpsc::Sender<ServerJsonRpcMessage>),
    Common,
    Drop,
}

struct Inner {
    request_router: Mutex<HashMap<RequestId, RequestWise>>,
    common: Mutex<Option<mpsc::Sender<ServerJsonRpcMessage>>>,
    pending_common: Mutex<Vec<ServerJsonRpcMessage>>,
}

impl Inner {
    fn resolve_outbound_channel(&self, message: &ServerJsonRpcMessage) -> OutboundChannel {
        match message {
            JsonRpcMessage::Request(_) => OutboundChannel::Common,
            JsonRpcMessage::Notification(n) => match &n.notification {
                ServerNotification::ProgressNotification(p) => {
                    let router = self.request_router.lock().unwrap_or_else(|e| e.into_inner());
                    match router
                        .values()
                        .find(|rw| rw.progress_token.as_ref() == Some(&p.progress_token))
                    {
                        Some(rw) => OutboundChannel::RequestWise(rw.tx.clone()),
                        None => OutboundChannel::Common,
                    }
                }
                ServerNotification::CancelledNotification(p) => {
                    let router = self.request_router.lock().unwrap_or_else(|e| e.into_inner());
                    match router.get(&p.request_id) {
                        Some(rw) => OutboundChannel::RequestWise(rw.tx.clone()),
                        None => OutboundChannel::Common,
                    }
                }
                _ => OutboundChannel::Common,
            },
            JsonRpcMessage::Response(r) => {
                let mut router = self.request_router.lock().unwrap_or_else(|e| e.into_inner());
                match router.remove(&r.id) {
                    Some(rw) => OutboundChannel::RequestWise(rw.tx),
                    None => OutboundChannel::Drop,
                }
            }
            JsonRpcMessage::Error(e) => {
                let mut router = self.request_router.lock().unwrap_or_else(|e| e.into_inner());
                match router.remove(&e.id) {
                    Some(rw) => OutboundChannel::RequestWise(rw.tx),
                    None => OutboundChannel::Drop,
                }
            }
            JsonRpcMessage::BatchRequest(_) | JsonRpcMessage::BatchResponse(_) => {
                unreachable!("the base session never emits batch messages")
            }
        }
    }

    fn route(&self, message: ServerJsonRpcMessage) {
        match self.resolve_outbound_channel(&message) {
            OutboundChannel::RequestWise(tx) => {
                if tx.try_send(message).is_err() {
                    trace!("request-wise SSE receiver dropped, message lost");
                }
            }
            OutboundChannel::Common => {
                let common = self.common.lock().unwrap_or_else(|e| e.into_inner());
                match common.as_ref() {
                    Some(tx) => {
                        if tx.try_send(message).is_err() {
                            trace!("standalone SSE receiver dropped, message lost");
                        }
                    }
                    None => self
                        .pending_common
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(message),
                }
            }
            OutboundChannel::Drop => {
                trace!("no open stream claims this response/error, dropping");
            }
        }
    }
}

/// Shared handle to a session's routing state, held by the
/// [`super::session_manager::LocalSessionManager`] to register new
/// per-request streams and feed inbound `POST` bodies in. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    inner: Arc<Inner>,
    inbound_tx: mpsc::Sender<ClientJsonRpcMessage>,
}

impl SessionHandle {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Feed a decoded inbound message to the base session loop without
    /// associating it with any SSE stream (notifications, and responses to
    /// requests the server itself sent).
    pub async fn accept_message(&self, message: ClientJsonRpcMessage) -> Result<(), SessionError> {
        self.inbound_tx.send(message).await.map_err(|_| SessionError::Closed)
    }

    /// Feed an inbound client request, registering `tx` as the stream that
    /// should receive its eventual response, any progress notifications
    /// carrying its progress token, and any `notifications/cancelled` that
    /// names it.
    pub async fn accept_request(
        &self,
        message: ClientJsonRpcMessage,
        tx: mpsc::Sender<ServerJsonRpcMessage>,
    ) -> Result<(), SessionError> {
        if let Some((request, id)) = extract_request(&message) {
            let progress_token = request.progress_token();
            self.inner
                .request_router
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(id, RequestWise { progress_token, tx });
        }
        self.inbound_tx.send(message).await.map_err(|_| SessionError::Closed)
    }

    /// Open the standalone stream, flushing anything that had been
    /// buffered for it while no standalone stream was open.
    pub fn open_standalone(&self, tx: mpsc::Sender<ServerJsonRpcMessage>) {
        let pending = std::mem::take(
            &mut *self.inner.pending_common.lock().unwrap_or_else(|e| e.into_inner()),
        );
        for message in pending {
            if tx.try_send(message).is_err() {
                break;
            }
        }
        *self.inner.common.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
    }

    pub fn close_standalone(&self) {
        *self.inner.common.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Deregister a per-request stream without waiting for its response
    /// (the HTTP client disconnected early); a later response still routes
    /// harmlessly to [`OutboundChannel::Drop`].
    pub fn forget_request(&self, id: &RequestId) {
        self.inner
            .request_router
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    /// Re-point an already-registered per-request entry at a fresh sender,
    /// used when a client reconnects to resume a dropped per-request SSE
    /// stream. Returns `false` (a no-op) if the request already completed
    /// and its entry was removed.
    pub fn reattach_request(&self, id: &RequestId, tx: mpsc::Sender<ServerJsonRpcMessage>) -> bool {
        let mut router = self.inner.request_router.lock().unwrap_or_else(|e| e.into_inner());
        match router.get_mut(id) {
            Some(rw) => {
                rw.tx = tx;
                true
            }
            None => false,
        }
    }
}

fn extract_request(message: &ClientJsonRpcMessage) -> Option<(crate::model::ClientRequest, RequestId)> {
    match message {
        JsonRpcMessage::Request(r) => Some((r.request.clone(), r.id.clone())),
        _ => None,
    }
}

/// The [`crate::transport::Transport`] implementation backing one session:
/// a [`Stream`] of messages pushed in via [`SessionHandle::accept_message`]
/// / [`SessionHandle::accept_request`], and a [`Sink`] that routes the base
/// session's outbound messages to the right SSE stream.
pub struct Session {
    inner: Arc<Inner>,
    inbound_rx: mpsc::Receiver<ClientJsonRpcMessage>,
}

pub fn session(id: SessionId, buffer: usize) -> (SessionHandle, Session) {
    let inner = Arc::new(Inner {
        request_router: Mutex::new(HashMap::new()),
        common: Mutex::new(None),
        pending_common: Mutex::new(Vec::new()),
    });
    let (inbound_tx, inbound_rx) = mpsc::channel(buffer);
    (
        SessionHandle { id, inner: inner.clone(), inbound_tx },
        Session { inner, inbound_rx },
    )
}

impl Stream for Session {
    type Item = ClientJsonRpcMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbound_rx.poll_recv(cx)
    }
}

impl Sink<ServerJsonRpcMessage> for Session {
    type Error = Infallible;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: ServerJsonRpcMessage) -> Result<(), Self::Error> {
        self.inner.route(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CallToolRequestParam, ClientRequest, NumberOrString, RequestMeta};

    #[tokio::test]
    async fn progress_notification_routes_to_the_request_that_carries_its_token() {
        let (handle, mut transport) = session(Arc::from("s1"), 8);
        let token = ProgressToken::from(1u32);
        let request = JsonRpcMessage::request(
            ClientRequest::CallToolRequest(CallToolRequestParam {
                name: "demo".into(),
                arguments: None,
                meta: Some(RequestMeta { progress_token: Some(token.clone()) }),
            }),
            NumberOrString::Number(1),
        );
        let (tx, mut rx) = mpsc::channel(8);
        handle.accept_request(request, tx).await.unwrap();

        use futures::StreamExt;
        let _ = transport.next().await.unwrap();

        use futures::SinkExt;
        transport
            .send(JsonRpcMessage::notification(ServerNotification::ProgressNotification(
                crate::model::ProgressNotificationParam {
                    progress_token: token,
                    progress: 0.5,
                    total: None,
                    message: None,
                },
            )))
            .await
            .unwrap();

        assert!(rx.try_recv().is_ok());
    }
}

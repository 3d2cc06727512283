//! The server side of a session: answers `initialize`, then hands off to
//! the base session loop in [`super`].

use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{CancelNotification, CancelledId, Inbound, Outbound, Peer, RunningService, Service, ServiceRole, spawn_session};
use crate::error::InitializeError;
use crate::model::{
    ClientNotification, ClientRequest, ClientResult, EmptyResult, InitializeRequestParam,
    InitializeResult, JsonRpcMessage, RequestId, ServerNotification, ServerRequest, ServerResult,
    SUPPORTED_PROTOCOL_VERSIONS,
};

/// The server's side of a session: it receives [`ClientRequest`]s and
/// [`ClientNotification`]s, and may itself send [`ServerRequest`]s such as
/// `sampling/createMessage`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleServer;

impl ServiceRole for RoleServer {
    type Req = ClientRequest;
    type Resp = ServerResult;
    type Not = ClientNotification;
    type PeerReq = ServerRequest;
    type PeerResp = ClientResult;
    type PeerNot = ServerNotification;
    type PeerInfo = InitializeRequestParam;
    type Info = InitializeResult;
}

impl CancelledId for ClientNotification {
    fn cancelled_request_id(&self) -> Option<RequestId> {
        match self {
            ClientNotification::CancelledNotification(param) => Some(param.request_id.clone()),
            _ => None,
        }
    }
}

impl CancelNotification for ServerNotification {
    fn cancelled(request_id: RequestId) -> Self {
        ServerNotification::CancelledNotification(crate::model::CancelledNotificationParam::new(request_id))
    }
}

/// Application-facing alias: a handler that answers requests from an MCP
/// client is a [`Service`] over [`RoleServer`].
pub trait ServerHandler: Service<RoleServer> {}
impl<S: Service<RoleServer>> ServerHandler for S {}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Initialize(#[from] InitializeError),
}

/// Read the client's `initialize` request, answer it, wait for
/// `notifications/initialized`, then spawn the steady-state session loop.
#[instrument(skip_all)]
pub async fn serve_server_with_ct<S, T>(
    service: S,
    transport: T,
    ct: CancellationToken,
) -> Result<RunningService<RoleServer>, InitializeError>
where
    S: Service<RoleServer>,
    T: Sink<Outbound<RoleServer>> + Stream<Item = Inbound<RoleServer>> + Send + Unpin + 'static,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    let service = Arc::new(service);
    let (mut sink, mut stream) = transport.split();

    let (id, params) = expect_init_request(&mut stream).await?;
    let client_info = params;
    if !SUPPORTED_PROTOCOL_VERSIONS.contains(&client_info.protocol_version.as_str()) {
        tracing::warn!(
            requested = %client_info.protocol_version,
            "client requested an unrecognized protocol version, proceeding with our own"
        );
    }

    let result = service.get_info();
    let response = JsonRpcMessage::<ServerRequest, ServerResult, ServerNotification>::response(
        ServerResult::InitializeResult(result),
        id,
    );
    sink.send(response)
        .await
        .map_err(|e| InitializeError::Transport(Box::new(e)))?;

    expect_initialized_notification(&mut stream).await?;

    let (outbound_tx, outbound_rx) = mpsc::channel(128);
    let peer = Peer::new(outbound_tx, ct.clone());
    peer.set_peer_info(client_info);

    Ok(spawn_session(service, sink, stream, peer, outbound_rx, ct))
}

pub async fn serve_server<S, T>(
    service: S,
    transport: T,
) -> Result<RunningService<RoleServer>, InitializeError>
where
    S: Service<RoleServer>,
    T: Sink<Outbound<RoleServer>> + Stream<Item = Inbound<RoleServer>> + Send + Unpin + 'static,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    serve_server_with_ct(service, transport, CancellationToken::new()).await
}

async fn expect_init_request<St>(
    stream: &mut St,
) -> Result<(RequestId, InitializeRequestParam), InitializeError>
where
    St: Stream<Item = Inbound<RoleServer>> + Unpin,
{
    match stream.next().await {
        Some(JsonRpcMessage::Request(req)) => match req.request {
            ClientRequest::InitializeRequest(params) => Ok((req.id, params)),
            _ => Err(InitializeError::ExpectedInitRequest),
        },
        Some(_) => Err(InitializeError::ExpectedInitRequest),
        None => Err(InitializeError::ConnectionClosed),
    }
}

async fn expect_initialized_notification<St>(stream: &mut St) -> Result<(), InitializeError>
where
    St: Stream<Item = Inbound<RoleServer>> + Unpin,
{
    match stream.next().await {
        Some(JsonRpcMessage::Notification(not)) => match not.notification {
            ClientNotification::InitializedNotification => Ok(()),
            _ => Err(InitializeError::ExpectedInitNotification),
        },
        Some(_) => Err(InitializeError::ExpectedInitNotification),
        None => Err(InitializeError::ConnectionClosed),
    }
}

impl super::Peer<RoleServer> {
    /// `sampling/createMessage`: ask the client's configured model to
    /// generate a completion over `params`.
    pub async fn create_message(
        &self,
        params: crate::model::CreateMessageRequestParam,
    ) -> Result<crate::model::CreateMessageResult, crate::error::ServiceError> {
        match self.send_request(ServerRequest::CreateMessageRequest(params)).await? {
            ClientResult::CreateMessageResult(result) => Ok(result),
            _ => Err(crate::error::ServiceError::PeerError(
                crate::model::ErrorData::internal_error("unexpected result for sampling/createMessage", None),
            )),
        }
    }

    /// `roots/list`: ask the client to report its configured roots.
    pub async fn list_roots(&self) -> Result<crate::model::ListRootsResult, crate::error::ServiceError> {
        match self.send_request(ServerRequest::ListRootsRequest).await? {
            ClientResult::ListRootsResult(result) => Ok(result),
            _ => Err(crate::error::ServiceError::PeerError(
                crate::model::ErrorData::internal_error("unexpected result for roots/list", None),
            )),
        }
    }

    pub async fn ping(&self) -> Result<(), crate::error::ServiceError> {
        match self.send_request(ServerRequest::PingRequest).await? {
            ClientResult::EmptyResult(EmptyResult {}) => Ok(()),
            _ => Ok(()),
        }
    }

    pub async fn notify_logging_message(
        &self,
        param: crate::model::LoggingMessageNotificationParam,
    ) -> Result<(), crate::error::ServiceError> {
        self.send_notification(ServerNotification::LoggingMessageNotification(param)).await
    }

    pub async fn notify_progress(
        &self,
        param: crate::model::ProgressNotificationParam,
    ) -> Result<(), crate::error::ServiceError> {
        self.send_notification(ServerNotification::ProgressNotification(param)).await
    }

    pub async fn notify_cancelled(
        &self,
        param: crate::model::CancelledNotificationParam,
    ) -> Result<(), crate::error::ServiceError> {
        self.send_notification(ServerNotification::CancelledNotification(param)).await
    }

    pub async fn notify_resource_updated(&self, uri: String) -> Result<(), crate::error::ServiceError> {
        self.send_notification(ServerNotification::ResourceUpdatedNotification(
            crate::model::ResourceUpdatedNotificationParam { uri },
        ))
        .await
    }

    pub async fn notify_resource_list_changed(&self) -> Result<(), crate::error::ServiceError> {
        self.send_notification(ServerNotification::ResourceListChangedNotification).await
    }

    pub async fn notify_tool_list_changed(&self) -> Result<(), crate::error::ServiceError> {
        self.send_notification(ServerNotification::ToolListChangedNotification).await
    }

    pub async fn notify_prompt_list_changed(&self) -> Result<(), crate::error::ServiceError> {
        self.send_notification(ServerNotification::PromptListChangedNotification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_server_cancelled_id_extracts_request_id() {
        let not = ClientNotification::CancelledNotification(crate::model::CancelledNotificationParam::new(
            RequestId::from(7u32),
        ));
        assert_eq!(not.cancelled_request_id(), Some(RequestId::from(7u32)));
        assert_eq!(ClientNotification::InitializedNotification.cancelled_request_id(), None);
    }
}

//! The client side of a session: drives `initialize`, then hands off to
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

/// The client's side of a session: it receives [`ServerRequest`]s and
/// [`ServerNotification`]s, and drives the `initialize` handshake before
/// sending any [`ClientRequest`]s of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleClient;

impl ServiceRole for RoleClient {
    type Req = ServerRequest;
    type Resp = ClientResult;
    type Not = ServerNotification;
    type PeerReq = ClientRequest;
    type PeerResp = ServerResult;
    type PeerNot = ClientNotification;
    type PeerInfo = InitializeResult;
    type Info = InitializeRequestParam;
}

impl CancelledId for ServerNotification {
    fn cancelled_request_id(&self) -> Option<RequestId> {
        match self {
            ServerNotification::CancelledNotification(param) => Some(param.request_id.clone()),
            _ => None,
        }
    }
}

impl CancelNotification for ClientNotification {
    fn cancelled(request_id: RequestId) -> Self {
        ClientNotification::CancelledNotification(crate::model::CancelledNotificationParam::new(request_id))
    }
}

/// Application-facing alias: a handler driving an MCP client is a
/// [`Service`] over [`RoleClient`].
pub trait ClientHandler: Service<RoleClient> {}
impl<S: Service<RoleClient>> ClientHandler for S {}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Initialize(#[from] InitializeError),
}

/// Send `initialize`, wait for the server's answer, confirm the protocol
/// version is one we understand, then send `notifications/initialized`
/// and spawn the steady-state session loop.
#[instrument(skip_all)]
pub async fn serve_client_with_ct<S, T>(
    service: S,
    transport: T,
    ct: CancellationToken,
) -> Result<RunningService<RoleClient>, InitializeError>
where
    S: Service<RoleClient>,
    T: Sink<Outbound<RoleClient>> + Stream<Item = Inbound<RoleClient>> + Send + Unpin + 'static,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    let service = Arc::new(service);
    let (mut sink, mut stream) = transport.split();

    let init_params = service.get_info();
    let request_id: RequestId = 0u32.into();
    let request = JsonRpcMessage::<ClientRequest, ClientResult, ClientNotification>::request(
        ClientRequest::InitializeRequest(init_params),
        request_id.clone(),
    );
    sink.send(request)
        .await
        .map_err(|e| InitializeError::Transport(Box::new(e)))?;

    let server_info = expect_init_response(&mut stream, &request_id).await?;

    let notification = JsonRpcMessage::<ClientRequest, ClientResult, ClientNotification>::notification(
        ClientNotification::InitializedNotification,
    );
    sink.send(notification)
        .await
        .map_err(|e| InitializeError::Transport(Box::new(e)))?;

    let (outbound_tx, outbound_rx) = mpsc::channel(128);
    let peer = Peer::new(outbound_tx, ct.clone());
    peer.set_peer_info(server_info);

    Ok(spawn_session(service, sink, stream, peer, outbound_rx, ct))
}

pub async fn serve_client<S, T>(
    service: S,
    transport: T,
) -> Result<RunningService<RoleClient>, InitializeError>
where
    S: Service<RoleClient>,
    T: Sink<Outbound<RoleClient>> + Stream<Item = Inbound<RoleClient>> + Send + Unpin + 'static,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    serve_client_with_ct(service, transport, CancellationToken::new()).await
}

async fn expect_init_response<St>(
    stream: &mut St,
    expected_id: &RequestId,
) -> Result<InitializeResult, InitializeError>
where
    St: Stream<Item = Inbound<RoleClient>> + Unpin,
{
    match stream.next().await {
        Some(JsonRpcMessage::Response(resp)) => {
            if &resp.id != expected_id {
                return Err(InitializeError::ConflictInitResponseId {
                    expected: expected_id.to_string(),
                    got: resp.id.to_string(),
                });
            }
            match resp.result {
                ServerResult::InitializeResult(result) => {
                    if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
                        return Err(InitializeError::UnsupportedProtocolVersion(result.protocol_version));
                    }
                    Ok(result)
                }
                _ => Err(InitializeError::ExpectedInitResponse),
            }
        }
        Some(JsonRpcMessage::Error(err)) => Err(InitializeError::Transport(Box::new(err.error))),
        Some(_) => Err(InitializeError::ExpectedInitResponse),
        None => Err(InitializeError::ConnectionClosed),
    }
}

impl super::Peer<RoleClient> {
    pub async fn call_tool(
        &self,
        params: crate::model::CallToolRequestParam,
    ) -> Result<crate::model::CallToolResult, crate::error::ServiceError> {
        match self.send_request(ClientRequest::CallToolRequest(params)).await? {
            ServerResult::CallToolResult(result) => Ok(result),
            _ => Err(crate::error::ServiceError::PeerError(
                crate::model::ErrorData::internal_error("unexpected result for tools/call", None),
            )),
        }
    }

    pub async fn list_tools(
        &self,
        cursor: Option<String>,
    ) -> Result<crate::model::ListToolsResult, crate::error::ServiceError> {
        match self
            .send_request(ClientRequest::ListToolsRequest(
                cursor.map(|cursor| crate::model::PaginatedRequestParam { cursor: Some(cursor) }),
            ))
            .await?
        {
            ServerResult::ListToolsResult(result) => Ok(result),
            _ => Err(crate::error::ServiceError::PeerError(
                crate::model::ErrorData::internal_error("unexpected result for tools/list", None),
            )),
        }
    }

    /// Page through `tools/list` until the server reports no further
    /// cursor, accumulating every tool along the way.
    pub async fn list_all_tools(&self) -> Result<Vec<crate::model::Tool>, crate::error::ServiceError> {
        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.list_tools(cursor).await?;
            tools.extend(page.tools);
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(tools)
    }

    pub async fn read_resource(
        &self,
        uri: String,
    ) -> Result<crate::model::ReadResourceResult, crate::error::ServiceError> {
        match self
            .send_request(ClientRequest::ReadResourceRequest(crate::model::ReadResourceRequestParam { uri }))
            .await?
        {
            ServerResult::ReadResourceResult(result) => Ok(result),
            _ => Err(crate::error::ServiceError::PeerError(
                crate::model::ErrorData::internal_error("unexpected result for resources/read", None),
            )),
        }
    }

    pub async fn get_prompt(
        &self,
        params: crate::model::GetPromptRequestParam,
    ) -> Result<crate::model::GetPromptResult, crate::error::ServiceError> {
        match self.send_request(ClientRequest::GetPromptRequest(params)).await? {
            ServerResult::GetPromptResult(result) => Ok(result),
            _ => Err(crate::error::ServiceError::PeerError(
                crate::model::ErrorData::internal_error("unexpected result for prompts/get", None),
            )),
        }
    }

    pub async fn set_level(&self, level: crate::model::LoggingLevel) -> Result<(), crate::error::ServiceError> {
        match self
            .send_request(ClientRequest::SetLevelRequest(crate::model::SetLevelRequestParam { level }))
            .await?
        {
            ServerResult::EmptyResult(EmptyResult {}) => Ok(()),
            _ => Ok(()),
        }
    }

    pub async fn ping(&self) -> Result<(), crate::error::ServiceError> {
        self.send_request(ClientRequest::PingRequest).await.map(|_| ())
    }

    pub async fn notify_cancelled(
        &self,
        param: crate::model::CancelledNotificationParam,
    ) -> Result<(), crate::error::ServiceError> {
        self.send_notification(ClientNotification::CancelledNotification(param)).await
    }

    pub async fn notify_progress(
        &self,
        param: crate::model::ProgressNotificationParam,
    ) -> Result<(), crate::error::ServiceError> {
        self.send_notification(ClientNotification::ProgressNotification(param)).await
    }

    pub async fn notify_roots_list_changed(&self) -> Result<(), crate::error::ServiceError> {
        self.send_notification(ClientNotification::RootsListChangedNotification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_client_cancelled_id_extracts_request_id() {
        let not = ServerNotification::CancelledNotification(crate::model::CancelledNotificationParam::new(
            RequestId::from(3u32),
        ));
        assert_eq!(not.cancelled_request_id(), Some(RequestId::from(3u32)));
        assert_eq!(
            ServerNotification::ResourceListChangedNotification.cancelled_request_id(),
            None
        );
    }
}

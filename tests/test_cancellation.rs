//! A client-issued `notifications/cancelled` must fire the matching
//! in-flight request's child `CancellationToken`, and a cooperative handler
//! must observe it before its work completes.

use std::sync::Arc;
use std::time::Duration;

use mcp_runtime::handler::{ClientHandler, ServerHandler};
use mcp_runtime::model::{
    CallToolRequestParam, CallToolResult, CancelledNotificationParam, Content, ErrorData,
    InitializeRequestParam, InitializeResult, RequestId,
};
use mcp_runtime::service::client::{RoleClient, serve_client};
use mcp_runtime::service::server::{RoleServer, serve_server};
use mcp_runtime::service::RequestContext;
use mcp_runtime::transport::duplex::duplex;

#[derive(Clone, Default)]
struct SlowServer;

impl ServerHandler for SlowServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult::default()
    }

    async fn call_tool(
        &self,
        _request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        tokio::select! {
            _ = context.ct.cancelled() => {
                Err(ErrorData::internal_error("cancelled", None))
            }
            _ = tokio::time::sleep(Duration::from_secs(30)) => {
                Ok(CallToolResult::success(vec![Content::text("too slow to matter")]))
            }
        }
    }
}

#[derive(Clone, Default)]
struct NoopClient;

impl ClientHandler for NoopClient {
    fn get_info(&self) -> InitializeRequestParam {
        InitializeRequestParam::default()
    }
}

#[tokio::test]
async fn cancelled_notification_stops_the_in_flight_handler() {
    let (client_transport, server_transport) = duplex::<
        mcp_runtime::model::ClientJsonRpcMessage,
        mcp_runtime::model::ServerJsonRpcMessage,
    >(32);

    let running_server = serve_server(SlowServer, server_transport).await.expect("server handshake");
    let running_client = serve_client(NoopClient, client_transport).await.expect("client handshake");

    let peer = running_client.peer().clone();
    let call = tokio::spawn({
        let peer = peer.clone();
        async move {
            peer.call_tool(CallToolRequestParam {
                name: "slow".into(),
                arguments: None,
                meta: None,
            })
            .await
        }
    });

    // The first request this peer ever sends is allocated id 0.
    tokio::time::sleep(Duration::from_millis(20)).await;
    peer.notify_cancelled(CancelledNotificationParam::new(RequestId::from(0u32)))
        .await
        .expect("notify_cancelled");

    let result = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("handler should react to cancellation long before the 30s sleep")
        .unwrap();
    assert!(result.is_err(), "cancelled call_tool must surface as an error to the caller");

    running_client.cancel();
    running_server.cancel();
}

#[tokio::test]
async fn cancelling_a_notification_with_no_matching_request_is_a_no_op() {
    let (client_transport, server_transport) = duplex::<
        mcp_runtime::model::ClientJsonRpcMessage,
        mcp_runtime::model::ServerJsonRpcMessage,
    >(32);

    let running_server = serve_server(SlowServer, server_transport).await.expect("server handshake");
    let running_client = serve_client(NoopClient, client_transport).await.expect("client handshake");

    running_client
        .peer()
        .notify_cancelled(CancelledNotificationParam::new(RequestId::from(999u32)))
        .await
        .expect("sending a cancel for an unknown request must not fail");

    // give the server's dispatch loop a beat to process (and ignore) it
    tokio::time::sleep(Duration::from_millis(20)).await;
    running_client.peer().ping().await.expect("session is still alive");

    running_client.cancel();
    running_server.cancel();
}

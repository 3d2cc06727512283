//! End-to-end handshake and request/response flow over the in-process
//! duplex transport: a client and server `Service` connected directly,
//! no HTTP involved.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mcp_runtime::handler::{ClientHandler, ServerHandler};
use mcp_runtime::model::{
    CallToolRequestParam, CallToolResult, Content, InitializeRequestParam, InitializeResult,
    ListToolsResult, Tool,
};
use mcp_runtime::service::client::{RoleClient, serve_client};
use mcp_runtime::service::server::{RoleServer, serve_server};
use mcp_runtime::service::RequestContext;
use mcp_runtime::transport::duplex::duplex;

#[derive(Clone, Default)]
struct EchoServer;

impl ServerHandler for EchoServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult::default()
    }

    async fn list_tools(
        &self,
        _request: Option<mcp_runtime::model::PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, mcp_runtime::model::ErrorData> {
        Ok(ListToolsResult {
            tools: vec![Tool {
                name: "echo".into(),
                description: Some("echoes its input".into()),
                input_schema: Arc::new(serde_json::Map::new()),
                output_schema: None,
                annotations: None,
            }],
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, mcp_runtime::model::ErrorData> {
        let text = request
            .arguments
            .as_ref()
            .and_then(|args| args.get("text"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[derive(Clone, Default)]
struct NoopClient {
    got_log: Arc<AtomicBool>,
}

impl ClientHandler for NoopClient {
    fn get_info(&self) -> InitializeRequestParam {
        InitializeRequestParam::default()
    }

    async fn on_notification(&self, notification: mcp_runtime::model::ServerNotification) {
        if matches!(
            notification,
            mcp_runtime::model::ServerNotification::LoggingMessageNotification(_)
        ) {
            self.got_log.store(true, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn initialize_then_call_tool_round_trips() {
    let (client_transport, server_transport) = duplex::<
        mcp_runtime::model::ClientJsonRpcMessage,
        mcp_runtime::model::ServerJsonRpcMessage,
    >(32);

    let server = tokio::spawn(serve_server(EchoServer, server_transport));
    let client = tokio::spawn(serve_client(NoopClient::default(), client_transport));

    let running_server = server.await.unwrap().expect("server handshake");
    let running_client = client.await.unwrap().expect("client handshake");

    let peer = running_client.peer().clone();
    let tools = peer.list_tools(None).await.expect("tools/list");
    assert_eq!(tools.tools.len(), 1);
    assert_eq!(tools.tools[0].name, "echo");

    let result = peer
        .call_tool(CallToolRequestParam {
            name: "echo".into(),
            arguments: Some(serde_json::json!({"text": "hi"}).as_object().unwrap().clone()),
            meta: None,
        })
        .await
        .expect("tools/call");
    assert_eq!(result.is_error, Some(false));

    running_client.cancel();
    running_server.cancel();
}

#[tokio::test]
async fn unregistered_tool_returns_method_not_found() {
    let (client_transport, server_transport) = duplex::<
        mcp_runtime::model::ClientJsonRpcMessage,
        mcp_runtime::model::ServerJsonRpcMessage,
    >(32);

    #[derive(Clone, Default)]
    struct BareServer;
    impl ServerHandler for BareServer {}

    let server = tokio::spawn(serve_server(BareServer, server_transport));
    let client = tokio::spawn(serve_client(NoopClient::default(), client_transport));

    let running_server = server.await.unwrap().unwrap();
    let running_client = client.await.unwrap().unwrap();

    let err = running_client
        .peer()
        .call_tool(CallToolRequestParam {
            name: "missing".into(),
            arguments: None,
            meta: None,
        })
        .await
        .expect_err("unregistered tool must error");
    assert!(matches!(err, mcp_runtime::error::ServiceError::PeerError(_)));

    running_client.cancel();
    running_server.cancel();
}

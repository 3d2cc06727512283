//! HTTP-level exercise of the Streamable HTTP transport: a real axum
//! server bound to an ephemeral port, driven with `reqwest`, covering the
//! stateful happy path, content negotiation, and stateless mode.

use std::time::Duration;

use mcp_runtime::handler::ServerHandler;
use mcp_runtime::model::{CallToolRequestParam, CallToolResult, Content, ErrorData, InitializeResult};
use mcp_runtime::service::server::RoleServer;
use mcp_runtime::service::RequestContext;
use mcp_runtime::transport::streamable_http::{LocalSessionManager, StreamableHttpServerConfig};
use mcp_runtime::transport::streamable_http::server::StreamableHttpService;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const ACCEPT_BOTH: &str = "application/json, text/event-stream";

#[derive(Clone, Default)]
struct EchoServer;

impl ServerHandler for EchoServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult::default()
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
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

async fn start_server(config: StreamableHttpServerConfig, ct: CancellationToken) -> String {
    let session_manager = LocalSessionManager::new(EchoServer::default);
    let service = StreamableHttpService::new(session_manager, config);
    let router = service.router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    let url = format!("http://127.0.0.1:{}/", addr.port());

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { ct.cancelled().await })
            .await
            .unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    url
}

fn initialize_body() -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0.0" }
        }
    })
}

#[tokio::test]
async fn stateful_session_lifecycle_round_trips() {
    let ct = CancellationToken::new();
    let url = start_server(StreamableHttpServerConfig::default(), ct.clone()).await;
    let client = reqwest::Client::new();

    let init_resp = client
        .post(&url)
        .header("Accept", ACCEPT_BOTH)
        .header("Content-Type", "application/json")
        .json(&initialize_body())
        .send()
        .await
        .expect("POST initialize");
    assert!(init_resp.status().is_success());
    let session_id = init_resp
        .headers()
        .get("Mcp-Session-Id")
        .expect("session id header")
        .to_str()
        .unwrap()
        .to_string();

    let initialized_resp = client
        .post(&url)
        .header("Accept", ACCEPT_BOTH)
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", &session_id)
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .send()
        .await
        .expect("POST notifications/initialized");
    assert_eq!(initialized_resp.status().as_u16(), 202);

    let call_resp = client
        .post(&url)
        .header("Accept", ACCEPT_BOTH)
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", &session_id)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"text": "hi"}},
        }))
        .send()
        .await
        .expect("POST tools/call");
    assert!(call_resp.status().is_success());
    assert_eq!(
        call_resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    let delete_resp = client
        .delete(&url)
        .header("Mcp-Session-Id", &session_id)
        .send()
        .await
        .expect("DELETE session");
    assert_eq!(delete_resp.status().as_u16(), 204);

    // the session no longer exists: a second DELETE must 404
    let second_delete = client
        .delete(&url)
        .header("Mcp-Session-Id", &session_id)
        .send()
        .await
        .expect("second DELETE");
    assert_eq!(second_delete.status().as_u16(), 404);

    ct.cancel();
}

#[tokio::test]
async fn post_without_initialize_on_a_fresh_connection_is_rejected() {
    let ct = CancellationToken::new();
    let url = start_server(StreamableHttpServerConfig::default(), ct.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(&url)
        .header("Accept", ACCEPT_BOTH)
        .header("Content-Type", "application/json")
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .send()
        .await
        .expect("POST tools/list without initialize");
    assert_eq!(resp.status().as_u16(), 400);

    ct.cancel();
}

#[tokio::test]
async fn unacceptable_accept_header_is_rejected() {
    let ct = CancellationToken::new();
    let url = start_server(StreamableHttpServerConfig::default(), ct.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(&url)
        .header("Accept", "text/plain")
        .header("Content-Type", "application/json")
        .json(&initialize_body())
        .send()
        .await
        .expect("POST with a bad accept header");
    assert_eq!(resp.status().as_u16(), 406);

    ct.cancel();
}

#[tokio::test]
async fn unsupported_content_type_is_rejected() {
    let ct = CancellationToken::new();
    let url = start_server(StreamableHttpServerConfig::default(), ct.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(&url)
        .header("Accept", ACCEPT_BOTH)
        .header("Content-Type", "text/plain")
        .body(initialize_body().to_string())
        .send()
        .await
        .expect("POST with a bad content type");
    assert_eq!(resp.status().as_u16(), 415);

    ct.cancel();
}

#[tokio::test]
async fn get_without_a_known_session_is_rejected() {
    let ct = CancellationToken::new();
    let url = start_server(StreamableHttpServerConfig::default(), ct.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(&url)
        .header("Accept", "text/event-stream")
        .header("Mcp-Session-Id", "nonexistent-session")
        .send()
        .await
        .expect("GET with an unknown session");
    assert_eq!(resp.status().as_u16(), 404);

    ct.cancel();
}

#[tokio::test]
async fn stateless_mode_answers_a_single_request_with_no_session_header() {
    let ct = CancellationToken::new();
    let config = StreamableHttpServerConfig {
        stateful_mode: false,
        ..Default::default()
    };
    let url = start_server(config, ct.clone()).await;
    let client = reqwest::Client::new();

    // Stateless mode: every request pays its own `initialize` handshake.
    let init_resp = client
        .post(&url)
        .header("Accept", ACCEPT_BOTH)
        .header("Content-Type", "application/json")
        .json(&initialize_body())
        .send()
        .await
        .expect("stateless POST initialize");
    assert!(init_resp.status().is_success());
    // no session is tracked across requests in stateless mode
    assert!(init_resp.headers().get("Mcp-Session-Id").is_none());

    let body: serde_json::Value = init_resp.json().await.expect("decode initialize result");
    assert_eq!(body["result"]["protocolVersion"].as_str(), Some("2025-06-18"));

    ct.cancel();
}

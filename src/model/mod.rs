//! Wire types for the Model Context Protocol.
//!
//! A [`JsonRpcMessage`] is a tagged union of the four JSON-RPC 2.0 shapes
//! (request, notification, response, error) plus the two batch shapes the
//! wire format allows but this crate declines to interpret (see
//! [`JsonRpcMessage::BatchRequest`]). Method-specific request/result/
//! notification payloads live in [`client`] and [`server`].

mod capabilities;
mod client;
mod content;
mod prompt;
mod resource;
mod server;
mod tool;

pub use capabilities::*;
pub use client::*;
pub use content::*;
pub use prompt::*;
pub use resource::*;
pub use server::*;
pub use tool::*;

use std::{borrow::Cow, sync::Arc};

use serde::{Deserialize, Serialize};

pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Marker type that serializes/deserializes as the literal string `"2.0"`.
///
/// Encoding the JSON-RPC version as a zero-sized type rather than a string
/// field means a message can never be constructed with the wrong version:
/// the only value this type can hold is the one correct one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JsonRpcVersion2_0;

impl Serialize for JsonRpcVersion2_0 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion2_0 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Cow::<str>::deserialize(deserializer)?;
        if s != "2.0" {
            return Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version: {s}"
            )));
        }
        Ok(JsonRpcVersion2_0)
    }
}

/// A JSON-RPC request/response id. Assigned per-sender and not reused for a
/// new request until the prior one with that id is settled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(u32),
    String(Arc<str>),
}

pub type RequestId = NumberOrString;
pub type ProgressToken = NumberOrString;

impl std::fmt::Display for NumberOrString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberOrString::Number(n) => write!(f, "{n}"),
            NumberOrString::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<u32> for NumberOrString {
    fn from(n: u32) -> Self {
        NumberOrString::Number(n)
    }
}

impl From<String> for NumberOrString {
    fn from(s: String) -> Self {
        NumberOrString::String(s.into())
    }
}

/// Standard JSON-RPC 2.0 error codes, plus the MCP convention of using `0`
/// for handler-raised errors whose type is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const PARSE_ERROR: ErrorCode = ErrorCode(-32700);
    pub const INVALID_REQUEST: ErrorCode = ErrorCode(-32600);
    pub const METHOD_NOT_FOUND: ErrorCode = ErrorCode(-32601);
    pub const INVALID_PARAMS: ErrorCode = ErrorCode(-32602);
    pub const INTERNAL_ERROR: ErrorCode = ErrorCode(-32603);
    /// Handler-raised error of unknown type.
    pub const HANDLER_ERROR: ErrorCode = ErrorCode(0);
}

/// The `error` object of a JSON-RPC error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: ErrorCode,
    pub message: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorData {
    pub fn new(
        code: ErrorCode,
        message: impl Into<Cow<'static, str>>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    pub fn parse_error(message: impl Into<Cow<'static, str>>, data: Option<serde_json::Value>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message, data)
    }

    pub fn invalid_request(message: impl Into<Cow<'static, str>>, data: Option<serde_json::Value>) -> Self {
        Self::new(ErrorCode::INVALID_REQUEST, message, data)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("method not found: {method}"),
            None,
        )
    }

    pub fn invalid_params(message: impl Into<Cow<'static, str>>, data: Option<serde_json::Value>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message, data)
    }

    pub fn internal_error(message: impl Into<Cow<'static, str>>, data: Option<serde_json::Value>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message, data)
    }
}

impl std::fmt::Display for ErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.0, self.message)?;
        if let Some(data) = &self.data {
            write!(f, "({data})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorData {}

/// Opaque, forward-compatible `_meta` bag carried by requests/results.
///
/// MCP messages allow extra fields for forward-compatibility; `Meta` is a
/// typed projection of the well-known `_meta.progressToken` field plus
/// pass-through storage for everything else so round-tripping never loses
/// data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta(pub JsonObject);

impl Meta {
    pub fn progress_token(&self) -> Option<ProgressToken> {
        self.0
            .get("progressToken")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn with_progress_token(mut self, token: ProgressToken) -> Self {
        self.0.insert(
            "progressToken".to_string(),
            serde_json::to_value(token).expect("progress token is always serializable"),
        );
        self
    }
}

/// `_meta` shape specific to requests: currently only the progress token is
/// interpreted by the core; everything else passes through via [`Meta`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMeta {
    #[serde(rename = "progressToken", skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,
}

/// Per-message transport-opaque extension bag (e.g. HTTP request parts).
/// The session forwards this without interpreting it.
pub type Extensions = http::Extensions;

/// A paginated list request's shared params: an opaque cursor from a prior
/// page, or none for the first page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginatedRequestParam {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Shared shape of a paginated list result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Result with no payload, used for `ping`, `subscribe`, `unsubscribe`,
/// `setLevel`, and peer notifications that expect an acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyResult {}

/// JSON-RPC 2.0 request envelope: `{"jsonrpc":"2.0","id":..,"method":..,"params":..}`.
///
/// `Req` is expected to be an adjacently-tagged enum (`#[serde(tag =
/// "method", content = "params")]`) so that flattening it here produces
/// exactly that shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest<Req> {
    pub jsonrpc: JsonRpcVersion2_0,
    pub id: RequestId,
    #[serde(flatten)]
    pub request: Req,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification<Not> {
    pub jsonrpc: JsonRpcVersion2_0,
    #[serde(flatten)]
    pub notification: Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse<Resp> {
    pub jsonrpc: JsonRpcVersion2_0,
    pub id: RequestId,
    pub result: Resp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub jsonrpc: JsonRpcVersion2_0,
    pub id: RequestId,
    pub error: ErrorData,
}

/// Tagged union of the four JSON-RPC message shapes, generic over the
/// method-specific request/result/notification enums of one direction
/// (see [`ClientJsonRpcMessage`] / [`ServerJsonRpcMessage`]).
///
/// Batch bodies are recognized on the wire (a JSON array of messages) but
/// not acted on: this crate, like its upstream, answers them with "batch
/// requests are not supported".
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage<Req, Resp, Not> {
    Request(JsonRpcRequest<Req>),
    Notification(JsonRpcNotification<Not>),
    Response(JsonRpcResponse<Resp>),
    Error(JsonRpcError),
    BatchRequest(Vec<JsonRpcMessage<Req, Resp, Not>>),
    BatchResponse(Vec<JsonRpcMessage<Req, Resp, Not>>),
}

impl<Req, Resp, Not> JsonRpcMessage<Req, Resp, Not> {
    pub fn request(request: Req, id: RequestId) -> Self {
        Self::Request(JsonRpcRequest {
            jsonrpc: JsonRpcVersion2_0,
            id,
            request,
        })
    }

    pub fn notification(notification: Not) -> Self {
        Self::Notification(JsonRpcNotification {
            jsonrpc: JsonRpcVersion2_0,
            notification,
        })
    }

    pub fn response(result: Resp, id: RequestId) -> Self {
        Self::Response(JsonRpcResponse {
            jsonrpc: JsonRpcVersion2_0,
            id,
            result,
        })
    }

    pub fn error(error: ErrorData, id: RequestId) -> Self {
        Self::Error(JsonRpcError {
            jsonrpc: JsonRpcVersion2_0,
            id,
            error,
        })
    }

    pub fn into_request(self) -> Option<(Req, RequestId)> {
        match self {
            Self::Request(JsonRpcRequest { request, id, .. }) => Some((request, id)),
            _ => None,
        }
    }

    pub fn into_notification(self) -> Option<Not> {
        match self {
            Self::Notification(JsonRpcNotification { notification, .. }) => Some(notification),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Response(r) => Some(&r.id),
            Self::Error(r) => Some(&r.id),
            _ => None,
        }
    }
}

impl<Req, Resp, Not> Serialize for JsonRpcMessage<Req, Resp, Not>
where
    Req: Serialize,
    Resp: Serialize,
    Not: Serialize,
{
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Request(r) => r.serialize(serializer),
            Self::Notification(n) => n.serialize(serializer),
            Self::Response(r) => r.serialize(serializer),
            Self::Error(e) => e.serialize(serializer),
            Self::BatchRequest(items) | Self::BatchResponse(items) => items.serialize(serializer),
        }
    }
}

impl<'de, Req, Resp, Not> Deserialize<'de> for JsonRpcMessage<Req, Resp, Not>
where
    Req: Deserialize<'de>,
    Resp: Deserialize<'de>,
    Not: Deserialize<'de>,
{
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let value = serde_json::Value::deserialize(deserializer)?;
        deserialize_from_value(value).map_err(D::Error::custom)
    }
}

fn deserialize_from_value<Req, Resp, Not>(
    value: serde_json::Value,
) -> Result<JsonRpcMessage<Req, Resp, Not>, serde_json::Error>
where
    Req: for<'de> Deserialize<'de>,
    Resp: for<'de> Deserialize<'de>,
    Not: for<'de> Deserialize<'de>,
{
    match value {
        serde_json::Value::Array(items) => {
            let is_response_batch = items
                .first()
                .is_some_and(|item| item.get("result").is_some() || item.get("error").is_some());
            let messages = items
                .into_iter()
                .map(deserialize_from_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if is_response_batch {
                JsonRpcMessage::BatchResponse(messages)
            } else {
                JsonRpcMessage::BatchRequest(messages)
            })
        }
        object @ serde_json::Value::Object(_) => {
            let has_method = object.get("method").is_some();
            let has_id = object.get("id").is_some();
            if has_method && has_id {
                serde_json::from_value(object).map(JsonRpcMessage::Request)
            } else if has_method {
                serde_json::from_value(object).map(JsonRpcMessage::Notification)
            } else if object.get("error").is_some() {
                serde_json::from_value(object).map(JsonRpcMessage::Error)
            } else if object.get("result").is_some() {
                serde_json::from_value(object).map(JsonRpcMessage::Response)
            } else {
                Err(serde::de::Error::custom(
                    "JSON-RPC message missing method/result/error",
                ))
            }
        }
        other => Err(serde::de::Error::custom(format!(
            "expected a JSON-RPC message object or batch array, got {other}"
        ))),
    }
}

pub type ClientJsonRpcMessage = JsonRpcMessage<ClientRequest, ClientResult, ClientNotification>;
pub type ServerJsonRpcMessage = JsonRpcMessage<ServerRequest, ServerResult, ServerNotification>;

/// One of the five JSON-RPC versions, protocol version strings the client
/// supports in decreasing preference. The original `mcp` Python SDK
/// validates the server's echoed version against exactly this list.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05", "2024-10-07"];

pub const LATEST_PROTOCOL_VERSION: &str = SUPPORTED_PROTOCOL_VERSIONS[0];

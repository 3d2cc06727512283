//! Server→client method surface: requests the server may send back up to
//! the client (sampling, roots), and notifications either side may
//! originate but that are routed here because the server is the natural
//! emitter (log messages, list-changed events).

use serde::{Deserialize, Serialize};

use super::{EmptyResult, RequestId, ServerResult};
use crate::model::client::{CancelledNotificationParam, LoggingLevel, ProgressNotificationParam};
use crate::model::content::Content;
use crate::model::prompt::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingMessage {
    pub role: Role,
    pub content: Content,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequestParam {
    pub messages: Vec<SamplingMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    pub role: Role,
    pub content: Content,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListRootsResult {
    pub roots: Vec<Root>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingMessageNotificationParam {
    pub level: LoggingLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUpdatedNotificationParam {
    pub uri: String,
}

/// Requests a server may send to a client: asking it to run a sampling
/// completion, or to report its configured filesystem roots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ServerRequest {
    #[serde(rename = "ping")]
    PingRequest,
    #[serde(rename = "sampling/createMessage")]
    CreateMessageRequest(CreateMessageRequestParam),
    #[serde(rename = "roots/list")]
    ListRootsRequest,
}

impl ServerRequest {
    pub fn method(&self) -> &'static str {
        match self {
            Self::PingRequest => "ping",
            Self::CreateMessageRequest(_) => "sampling/createMessage",
            Self::ListRootsRequest => "roots/list",
        }
    }
}

/// Results the client may answer a server request with. Untagged, in
/// request-determined order, with `EmptyResult` last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientResult {
    CreateMessageResult(CreateMessageResult),
    ListRootsResult(ListRootsResult),
    EmptyResult(EmptyResult),
}

/// Notifications the server may send: cancellation and progress mirror the
/// client-originated variants in [`super::client::ClientNotification`] but
/// travel the other direction, plus the server-only log/list-changed
/// events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ServerNotification {
    #[serde(rename = "notifications/cancelled")]
    CancelledNotification(CancelledNotificationParam),
    #[serde(rename = "notifications/progress")]
    ProgressNotification(ProgressNotificationParam),
    #[serde(rename = "notifications/message")]
    LoggingMessageNotification(LoggingMessageNotificationParam),
    #[serde(rename = "notifications/resources/updated")]
    ResourceUpdatedNotification(ResourceUpdatedNotificationParam),
    #[serde(rename = "notifications/resources/list_changed")]
    ResourceListChangedNotification,
    #[serde(rename = "notifications/tools/list_changed")]
    ToolListChangedNotification,
    #[serde(rename = "notifications/prompts/list_changed")]
    PromptListChangedNotification,
}

impl ServerNotification {
    pub fn method(&self) -> &'static str {
        match self {
            Self::CancelledNotification(_) => "notifications/cancelled",
            Self::ProgressNotification(_) => "notifications/progress",
            Self::LoggingMessageNotification(_) => "notifications/message",
            Self::ResourceUpdatedNotification(_) => "notifications/resources/updated",
            Self::ResourceListChangedNotification => "notifications/resources/list_changed",
            Self::ToolListChangedNotification => "notifications/tools/list_changed",
            Self::PromptListChangedNotification => "notifications/prompts/list_changed",
        }
    }
}

/// A decoded outbound-from-server-perspective message, mirroring
/// [`crate::model::client::ClientMessage`].
#[derive(Debug, Clone)]
pub enum ServerMessage {
    Request(ServerRequest, RequestId),
    Notification(ServerNotification),
    Response(ServerResult, RequestId),
    Error(super::ErrorData, RequestId),
}

impl super::ServerJsonRpcMessage {
    pub fn into_message(self) -> ServerMessage {
        match self {
            Self::Request(r) => ServerMessage::Request(r.request, r.id),
            Self::Notification(n) => ServerMessage::Notification(n.notification),
            Self::Response(r) => ServerMessage::Response(r.result, r.id),
            Self::Error(e) => ServerMessage::Error(e.error, e.id),
            Self::BatchRequest(_) | Self::BatchResponse(_) => {
                unreachable!("batch messages are rejected before reaching into_message")
            }
        }
    }
}

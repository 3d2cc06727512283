//! Client→server method surface: requests the client sends, the results
//! the server answers with, and notifications flowing either way that the
//! client may originate.

use serde::{Deserialize, Serialize};

use super::{
    ClientResult, EmptyResult, InitializeRequestParam, InitializeResult, JsonObject, PaginatedRequestParam,
    ProgressToken, RequestId, RequestMeta,
};
use crate::model::content::Content;
use crate::model::prompt::{Prompt, PromptMessage};
use crate::model::resource::{Resource, ResourceContents, ResourceTemplate};
use crate::model::tool::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolRequestParam {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<JsonObject>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceRequestParam {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequestParam {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeRequestParam {
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetPromptRequestParam {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<JsonObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompleteReference {
    Prompt { name: String },
    Resource { uri: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteArgument {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRequestParam {
    #[serde(rename = "ref")]
    pub reference: CompleteReference,
    pub argument: CompleteArgument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetLevelRequestParam {
    pub level: LoggingLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelledNotificationParam {
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CancelledNotificationParam {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressNotificationParam {
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The requests a client may send to a server, tagged by `method` on the
/// wire (adjacently tagged with `params` as the content field — see
/// [`super::JsonRpcRequest`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ClientRequest {
    #[serde(rename = "initialize")]
    InitializeRequest(InitializeRequestParam),
    #[serde(rename = "ping")]
    PingRequest,
    #[serde(rename = "tools/list")]
    ListToolsRequest(Option<PaginatedRequestParam>),
    #[serde(rename = "tools/call")]
    CallToolRequest(CallToolRequestParam),
    #[serde(rename = "resources/list")]
    ListResourcesRequest(Option<PaginatedRequestParam>),
    #[serde(rename = "resources/templates/list")]
    ListResourceTemplatesRequest(Option<PaginatedRequestParam>),
    #[serde(rename = "resources/read")]
    ReadResourceRequest(ReadResourceRequestParam),
    #[serde(rename = "resources/subscribe")]
    SubscribeRequest(SubscribeRequestParam),
    #[serde(rename = "resources/unsubscribe")]
    UnsubscribeRequest(UnsubscribeRequestParam),
    #[serde(rename = "prompts/list")]
    ListPromptsRequest(Option<PaginatedRequestParam>),
    #[serde(rename = "prompts/get")]
    GetPromptRequest(GetPromptRequestParam),
    #[serde(rename = "completion/complete")]
    CompleteRequest(CompleteRequestParam),
    #[serde(rename = "logging/setLevel")]
    SetLevelRequest(SetLevelRequestParam),
}

impl ClientRequest {
    pub fn method(&self) -> &'static str {
        match self {
            Self::InitializeRequest(_) => "initialize",
            Self::PingRequest => "ping",
            Self::ListToolsRequest(_) => "tools/list",
            Self::CallToolRequest(_) => "tools/call",
            Self::ListResourcesRequest(_) => "resources/list",
            Self::ListResourceTemplatesRequest(_) => "resources/templates/list",
            Self::ReadResourceRequest(_) => "resources/read",
            Self::SubscribeRequest(_) => "resources/subscribe",
            Self::UnsubscribeRequest(_) => "resources/unsubscribe",
            Self::ListPromptsRequest(_) => "prompts/list",
            Self::GetPromptRequest(_) => "prompts/get",
            Self::CompleteRequest(_) => "completion/complete",
            Self::SetLevelRequest(_) => "logging/setLevel",
        }
    }

    /// The progress token carried in this request's `_meta`, if any (only
    /// `tools/call` carries one today).
    pub fn progress_token(&self) -> Option<ProgressToken> {
        match self {
            Self::CallToolRequest(p) => p.meta.as_ref().and_then(|m| m.progress_token.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<JsonObject>,
}

impl CallToolResult {
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: Some(false),
            structured_content: None,
        }
    }

    pub fn error(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: Some(true),
            structured_content: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResourcesResult {
    pub resources: Vec<Resource>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResourceTemplatesResult {
    #[serde(rename = "resourceTemplates")]
    pub resource_templates: Vec<ResourceTemplate>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListPromptsResult {
    pub prompts: Vec<Prompt>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetPromptResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteCompletion {
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteResult {
    pub completion: CompleteCompletion,
}

/// The results a server may answer a client request with. Untagged on the
/// wire: the caller already knows which request this answers, and thus
/// which variant to expect, so no discriminator is serialized. `EmptyResult`
/// must stay last — an empty JSON object would otherwise match it first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerResult {
    InitializeResult(InitializeResult),
    ListToolsResult(ListToolsResult),
    CallToolResult(CallToolResult),
    ListResourcesResult(ListResourcesResult),
    ListResourceTemplatesResult(ListResourceTemplatesResult),
    ReadResourceResult(ReadResourceResult),
    ListPromptsResult(ListPromptsResult),
    GetPromptResult(GetPromptResult),
    CompleteResult(CompleteResult),
    EmptyResult(EmptyResult),
}

/// Notifications the client may send (`notifications/initialized`), or
/// that either peer may send and the client happens to originate here
/// (`cancelled`, `progress`) — see [`super::server::ServerNotification`]
/// for the server-originated counterparts of the latter two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ClientNotification {
    #[serde(rename = "notifications/initialized")]
    InitializedNotification,
    #[serde(rename = "notifications/cancelled")]
    CancelledNotification(CancelledNotificationParam),
    #[serde(rename = "notifications/progress")]
    ProgressNotification(ProgressNotificationParam),
    #[serde(rename = "notifications/roots/list_changed")]
    RootsListChangedNotification,
}

impl ClientNotification {
    pub fn method(&self) -> &'static str {
        match self {
            Self::InitializedNotification => "notifications/initialized",
            Self::CancelledNotification(_) => "notifications/cancelled",
            Self::ProgressNotification(_) => "notifications/progress",
            Self::RootsListChangedNotification => "notifications/roots/list_changed",
        }
    }
}

/// A decoded inbound client message, used by the handshake helpers in
/// [`crate::service::server`] before the session's steady-state loop takes
/// over.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Request(ClientRequest, RequestId),
    Notification(ClientNotification),
    Response(ClientResult, RequestId),
    Error(super::ErrorData, RequestId),
}

impl super::ClientJsonRpcMessage {
    pub fn into_message(self) -> ClientMessage {
        match self {
            Self::Request(r) => ClientMessage::Request(r.request, r.id),
            Self::Notification(n) => ClientMessage::Notification(n.notification),
            Self::Response(r) => ClientMessage::Response(r.result, r.id),
            Self::Error(e) => ClientMessage::Error(e.error, e.id),
            Self::BatchRequest(_) | Self::BatchResponse(_) => {
                unreachable!("batch messages are rejected before reaching into_message")
            }
        }
    }
}

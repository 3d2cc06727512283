//! Ergonomic per-method server handler surface.
//!
//! [`crate::service::Service<RoleServer>`] is the low-level contract the
//! base session drives; most servers would rather implement one method per
//! MCP operation than match on [`ClientRequest`] themselves. [`ServerHandler`]
//! is that surface, with every operation defaulting to "not supported" so a
//! handler only overrides what it actually serves. The blanket [`Service`]
//! impl below is the dispatch table translating one onto the other.

use std::future::Future;

use crate::model::{
    CallToolRequestParam, CallToolResult, ClientNotification, ClientRequest, CompleteRequestParam, CompleteResult,
    ErrorData, GetPromptRequestParam, GetPromptResult, InitializeResult, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, PaginatedRequestParam,
    ReadResourceRequestParam, ReadResourceResult, ServerResult, SetLevelRequestParam, SubscribeRequestParam,
    UnsubscribeRequestParam,
};
use crate::service::server::RoleServer;
use crate::service::{RequestContext, Service};

/// One method per client-facing MCP operation, each defaulting to a
/// `METHOD_NOT_FOUND` error so a handler need only override what it
/// actually implements.
pub trait ServerHandler: Send + Sync + 'static {
    fn get_info(&self) -> InitializeResult {
        InitializeResult::default()
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, ErrorData>> + Send {
        async { Ok(ListToolsResult::default()) }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, ErrorData>> + Send {
        async move { Err(ErrorData::method_not_found(&format!("tools/call:{}", request.name))) }
    }

    fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListResourcesResult, ErrorData>> + Send {
        async { Ok(ListResourcesResult::default()) }
    }

    fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListResourceTemplatesResult, ErrorData>> + Send {
        async { Ok(ListResourceTemplatesResult::default()) }
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ReadResourceResult, ErrorData>> + Send {
        async move { Err(ErrorData::method_not_found(&format!("resources/read:{}", request.uri))) }
    }

    fn subscribe(
        &self,
        _request: SubscribeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<(), ErrorData>> + Send {
        async { Ok(()) }
    }

    fn unsubscribe(
        &self,
        _request: UnsubscribeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<(), ErrorData>> + Send {
        async { Ok(()) }
    }

    fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListPromptsResult, ErrorData>> + Send {
        async { Ok(ListPromptsResult::default()) }
    }

    fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<GetPromptResult, ErrorData>> + Send {
        async move { Err(ErrorData::method_not_found(&format!("prompts/get:{}", request.name))) }
    }

    fn complete(
        &self,
        _request: CompleteRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CompleteResult, ErrorData>> + Send {
        async { Ok(CompleteResult::default()) }
    }

    fn set_level(
        &self,
        _request: SetLevelRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<(), ErrorData>> + Send {
        async { Ok(()) }
    }

    /// Called for every inbound client notification; the default ignores
    /// `notifications/initialized`/`roots/list_changed` and anything else.
    fn on_notification(&self, _notification: ClientNotification) -> impl Future<Output = ()> + Send {
        async {}
    }
}

impl<H: ServerHandler> Service<RoleServer> for H {
    fn get_info(&self) -> InitializeResult {
        ServerHandler::get_info(self)
    }

    async fn handle_request(
        &self,
        request: ClientRequest,
        context: RequestContext<RoleServer>,
    ) -> Result<ServerResult, ErrorData> {
        match request {
            ClientRequest::InitializeRequest(_) => {
                Err(ErrorData::invalid_request("initialize must not be re-sent on an established session", None))
            }
            ClientRequest::PingRequest => Ok(ServerResult::EmptyResult(crate::model::EmptyResult {})),
            ClientRequest::ListToolsRequest(p) => self.list_tools(p, context).await.map(ServerResult::ListToolsResult),
            ClientRequest::CallToolRequest(p) => self.call_tool(p, context).await.map(ServerResult::CallToolResult),
            ClientRequest::ListResourcesRequest(p) => {
                self.list_resources(p, context).await.map(ServerResult::ListResourcesResult)
            }
            ClientRequest::ListResourceTemplatesRequest(p) => self
                .list_resource_templates(p, context)
                .await
                .map(ServerResult::ListResourceTemplatesResult),
            ClientRequest::ReadResourceRequest(p) => {
                self.read_resource(p, context).await.map(ServerResult::ReadResourceResult)
            }
            ClientRequest::SubscribeRequest(p) => self
                .subscribe(p, context)
                .await
                .map(|()| ServerResult::EmptyResult(crate::model::EmptyResult {})),
            ClientRequest::UnsubscribeRequest(p) => self
                .unsubscribe(p, context)
                .await
                .map(|()| ServerResult::EmptyResult(crate::model::EmptyResult {})),
            ClientRequest::ListPromptsRequest(p) => {
                self.list_prompts(p, context).await.map(ServerResult::ListPromptsResult)
            }
            ClientRequest::GetPromptRequest(p) => self.get_prompt(p, context).await.map(ServerResult::GetPromptResult),
            ClientRequest::CompleteRequest(p) => self.complete(p, context).await.map(ServerResult::CompleteResult),
            ClientRequest::SetLevelRequest(p) => self
                .set_level(p, context)
                .await
                .map(|()| ServerResult::EmptyResult(crate::model::EmptyResult {})),
        }
    }

    async fn handle_notification(
        &self,
        notification: ClientNotification,
        _extensions: crate::model::Extensions,
    ) -> Result<(), ErrorData> {
        self.on_notification(notification).await;
        Ok(())
    }
}

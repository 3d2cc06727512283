//! Ergonomic per-method client handler surface, answering the requests a
//! server may send back up (sampling, roots) and reacting to server
//! notifications (log messages, list-changed events).

use std::future::Future;

use crate::model::{
    ClientResult, CreateMessageRequestParam, CreateMessageResult, EmptyResult, ErrorData, InitializeRequestParam,
    ListRootsResult, ServerNotification, ServerRequest,
};
use crate::service::client::RoleClient;
use crate::service::{RequestContext, Service};

/// One method per server-facing MCP operation a client may be asked to
/// answer. Both default to `METHOD_NOT_FOUND`: a client that declared
/// neither `sampling` nor `roots` in its [`crate::model::ClientCapabilities`]
/// need not override either.
pub trait ClientHandler: Send + Sync + 'static {
    fn get_info(&self) -> InitializeRequestParam {
        InitializeRequestParam::default()
    }

    fn create_message(
        &self,
        _request: CreateMessageRequestParam,
        _context: RequestContext<RoleClient>,
    ) -> impl Future<Output = Result<CreateMessageResult, ErrorData>> + Send {
        async { Err(ErrorData::method_not_found("sampling/createMessage")) }
    }

    fn list_roots(
        &self,
        _context: RequestContext<RoleClient>,
    ) -> impl Future<Output = Result<ListRootsResult, ErrorData>> + Send {
        async { Err(ErrorData::method_not_found("roots/list")) }
    }

    fn on_notification(&self, _notification: ServerNotification) -> impl Future<Output = ()> + Send {
        async {}
    }
}

impl<H: ClientHandler> Service<RoleClient> for H {
    fn get_info(&self) -> InitializeRequestParam {
        ClientHandler::get_info(self)
    }

    async fn handle_request(
        &self,
        request: ServerRequest,
        context: RequestContext<RoleClient>,
    ) -> Result<ClientResult, ErrorData> {
        match request {
            ServerRequest::PingRequest => Ok(ClientResult::EmptyResult(EmptyResult {})),
            ServerRequest::CreateMessageRequest(p) => {
                self.create_message(p, context).await.map(ClientResult::CreateMessageResult)
            }
            ServerRequest::ListRootsRequest => self.list_roots(context).await.map(ClientResult::ListRootsResult),
        }
    }

    async fn handle_notification(
        &self,
        notification: ServerNotification,
        _extensions: crate::model::Extensions,
    ) -> Result<(), ErrorData> {
        self.on_notification(notification).await;
        Ok(())
    }
}

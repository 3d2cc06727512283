//! axum binding for the Streamable HTTP transport: one route accepting
//! `GET`/`POST`/`DELETE`, delegating session bookkeeping to a
//! [`SessionManager`].

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{Stream, StreamExt};
use tracing::{error, warn};

use super::session_manager::{ServerSseMessage, SessionManager};
use super::{SessionId, StreamableHttpServerConfig};
use crate::model::{ClientJsonRpcMessage, JsonRpcMessage, ServerJsonRpcMessage};
use crate::transport::common::http_header::{
    accepts, HEADER_LAST_EVENT_ID, HEADER_SESSION_ID, MIME_TYPE_EVENT_STREAM, MIME_TYPE_JSON,
};

/// Binds a [`SessionManager`] to the four HTTP behaviors the transport
/// spec defines, as an axum [`Router`].
pub struct StreamableHttpService<M> {
    session_manager: M,
    config: StreamableHttpServerConfig,
}

impl<M> StreamableHttpService<M>
where
    M: SessionManager,
{
    pub fn new(session_manager: M, config: StreamableHttpServerConfig) -> Self {
        Self { session_manager, config }
    }

    pub fn router(self) -> Router {
        let state = Arc::new(self);
        Router::new()
            .route(
                "/",
                get(handle_get::<M>).post(handle_post::<M>).delete(handle_delete::<M>),
            )
            .with_state(state)
    }
}

fn session_id_header(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get(&HEADER_SESSION_ID)
        .and_then(|v| v.to_str().ok())
        .map(|s| SessionId::from(s.to_string()))
}

fn sse_response(
    stream: impl Stream<Item = ServerSseMessage> + Send + 'static,
    keep_alive: Option<Duration>,
    session_id: Option<&SessionId>,
) -> Response {
    let events = stream.map(|item| {
        let data = serde_json::to_string(&item.message).unwrap_or_else(|_| "{}".to_string());
        let mut event = Event::default().data(data);
        if let Some(id) = item.event_id {
            event = event.id(id);
        }
        Ok::<_, std::convert::Infallible>(event)
    });
    let mut sse = Sse::new(events);
    if let Some(duration) = keep_alive {
        sse = sse.keep_alive(KeepAlive::new().interval(duration).text("keep-alive"));
    }
    let mut response = sse.into_response();
    if let Some(id) = session_id {
        if let Ok(value) = HeaderValue::from_str(id) {
            response.headers_mut().insert(HEADER_SESSION_ID.clone(), value);
        }
    }
    response
}

fn json_response(message: &ServerJsonRpcMessage, session_id: Option<&SessionId>) -> Response {
    let body = match serde_json::to_vec(message) {
        Ok(body) => body,
        Err(error) => {
            error!(%error, "failed to serialize response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let mut response = (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, MIME_TYPE_JSON)],
        body,
    )
        .into_response();
    if let Some(id) = session_id {
        if let Ok(value) = HeaderValue::from_str(id) {
            response.headers_mut().insert(HEADER_SESSION_ID.clone(), value);
        }
    }
    response
}

async fn handle_get<M: SessionManager>(State(service): State<Arc<StreamableHttpService<M>>>, headers: HeaderMap) -> Response {
    let accept = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !accepts(accept, MIME_TYPE_EVENT_STREAM) {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }

    let Some(session_id) = session_id_header(&headers) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if !service.session_manager.has_session(&session_id).await {
        return StatusCode::NOT_FOUND.into_response();
    }

    let last_event_id = headers
        .get(&HEADER_LAST_EVENT_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let stream = match last_event_id {
        Some(last_event_id) => service.session_manager.resume(&session_id, last_event_id).await,
        None => service.session_manager.create_standalone_stream(&session_id).await,
    };

    match stream {
        Ok(stream) => sse_response(stream, service.config.sse_keep_alive, None),
        Err(error) => {
            warn!(%error, "failed to open standalone stream");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn handle_post<M: SessionManager>(
    State(service): State<Arc<StreamableHttpService<M>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let accept = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !accepts(accept, MIME_TYPE_JSON) || !accepts(accept, MIME_TYPE_EVENT_STREAM) {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with(MIME_TYPE_JSON) {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    let message: ClientJsonRpcMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(error) => {
            warn!(%error, "failed to decode request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    if matches!(message, JsonRpcMessage::BatchRequest(_) | JsonRpcMessage::BatchResponse(_)) {
        return StatusCode::NOT_IMPLEMENTED.into_response();
    }

    if !service.config.stateful_mode {
        return handle_post_stateless(&service, message).await;
    }

    match session_id_header(&headers) {
        Some(session_id) => handle_post_existing_session(&service, &session_id, message).await,
        None => handle_post_new_session(&service, message).await,
    }
}

async fn handle_post_new_session<M: SessionManager>(
    service: &StreamableHttpService<M>,
    message: ClientJsonRpcMessage,
) -> Response {
    if !matches!(&message, JsonRpcMessage::Request(r) if matches!(r.request, crate::model::ClientRequest::InitializeRequest(_)))
    {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let (session_id, _handle) = match service.session_manager.create_session().await {
        Ok(created) => created,
        Err(error) => {
            error!(%error, "failed to create session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match service.session_manager.initialize_session(&session_id, message).await {
        Ok(response) => json_response(&response, Some(&session_id)),
        Err(error) => {
            error!(%error, "initialize handshake failed");
            let _ = service.session_manager.close_session(&session_id).await;
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_post_existing_session<M: SessionManager>(
    service: &StreamableHttpService<M>,
    session_id: &SessionId,
    message: ClientJsonRpcMessage,
) -> Response {
    if !service.session_manager.has_session(session_id).await {
        return StatusCode::NOT_FOUND.into_response();
    }

    match &message {
        JsonRpcMessage::Request(_) => match service.session_manager.create_stream(session_id, message).await {
            Ok(stream) => sse_response(stream, service.config.sse_keep_alive, None),
            Err(error) => {
                warn!(%error, "failed to create per-request stream");
                StatusCode::NOT_FOUND.into_response()
            }
        },
        JsonRpcMessage::Notification(_) | JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => {
            match service.session_manager.accept_message(session_id, message).await {
                Ok(()) => StatusCode::ACCEPTED.into_response(),
                Err(error) => {
                    warn!(%error, "failed to accept message");
                    StatusCode::NOT_FOUND.into_response()
                }
            }
        }
        JsonRpcMessage::BatchRequest(_) | JsonRpcMessage::BatchResponse(_) => {
            StatusCode::NOT_IMPLEMENTED.into_response()
        }
    }
}

/// Stateless mode: an ephemeral session exists only long enough to answer
/// this one `POST`. Every request pays the `initialize` handshake cost
/// again; there is no session to resume or to receive server-initiated
/// traffic outside this one exchange.
async fn handle_post_stateless<M: SessionManager>(
    service: &StreamableHttpService<M>,
    message: ClientJsonRpcMessage,
) -> Response {
    let (session_id, _handle) = match service.session_manager.create_session().await {
        Ok(created) => created,
        Err(error) => {
            error!(%error, "failed to create ephemeral session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let is_initialize = matches!(
        &message,
        JsonRpcMessage::Request(r) if matches!(r.request, crate::model::ClientRequest::InitializeRequest(_))
    );
    let is_request = matches!(&message, JsonRpcMessage::Request(_));

    let response = if is_initialize {
        service.session_manager.initialize_session(&session_id, message).await.map(Some)
    } else if is_request {
        match service.session_manager.create_stream(&session_id, message).await {
            Ok(mut stream) => Ok(stream.next().await.map(|item| item.message)),
            Err(error) => Err(error),
        }
    } else {
        service
            .session_manager
            .accept_message(&session_id, message)
            .await
            .map(|()| None)
    };

    let _ = service.session_manager.close_session(&session_id).await;

    match response {
        Ok(Some(response)) => json_response(&response, None),
        Ok(None) => StatusCode::ACCEPTED.into_response(),
        Err(error) => {
            warn!(%error, "stateless request failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_delete<M: SessionManager>(State(service): State<Arc<StreamableHttpService<M>>>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_id_header(&headers) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match service.session_manager.close_session(&session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => {
            warn!(%error, "failed to close session");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

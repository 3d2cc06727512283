//! Crate-level error types, distinct from [`crate::model::ErrorData`] (the
//! wire shape of a JSON-RPC error): these are local failures that never
//! reach the peer as such, only ever surfaced to the embedding application.

use thiserror::Error;

use crate::model::ErrorData;

/// Failure establishing a session, either as the client driving the
/// `initialize` handshake or the server answering it.
#[derive(Debug, Error)]
pub enum InitializeError {
    #[error("expected an initialize request, got a different message")]
    ExpectedInitRequest,
    #[error("expected an initialized notification, got a different message")]
    ExpectedInitNotification,
    #[error("expected an initialize response, got a different message")]
    ExpectedInitResponse,
    #[error("server rejected protocol version {0}")]
    UnsupportedProtocolVersion(String),
    #[error("response id {got} does not match request id {expected}")]
    ConflictInitResponseId { expected: String, got: String },
    #[error("connection closed during initialization")]
    ConnectionClosed,
    #[error("transport error during initialization: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("initialization cancelled")]
    Cancelled,
}

/// Errors surfaced by a running [`crate::service::Service`] once the
/// initialization handshake has completed.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("initialization failed: {0}")]
    Initialize(#[from] InitializeError),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("request timed out")]
    Timeout,
    #[error("peer returned an error: {0}")]
    PeerError(ErrorData),
    #[error("request was cancelled")]
    Cancelled,
    #[error("transport failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("background task join failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ServiceError {
    pub fn transport<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Transport(Box::new(error))
    }
}

/// Top-level error type for the crate's transport and session-manager
/// surfaces (event store, `SessionManager`, HTTP binding).
#[derive(Debug, Error)]
pub enum RmcpError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Initialize(#[from] InitializeError),
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("session {0} already exists")]
    SessionExists(String),
    #[error("stream {0} not found for resumption")]
    StreamNotFound(String),
    #[error("unsupported content type")]
    UnsupportedContentType,
    #[error("unacceptable Accept header")]
    NotAcceptable,
    #[error("batch requests are not supported")]
    BatchNotSupported,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_data_display_matches_wire_shape() {
        let err = ErrorData::method_not_found("tools/call");
        assert_eq!(err.to_string(), "-32601: method not found: tools/call");
    }

    #[test]
    fn rmcp_error_wraps_service_error() {
        let err: RmcpError = ServiceError::ConnectionClosed.into();
        assert_eq!(err.to_string(), "connection closed");
    }
}

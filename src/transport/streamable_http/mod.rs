//! Streamable HTTP transport: a single endpoint accepting `POST`/`GET`/
//! `DELETE`, session identity carried in the `Mcp-Session-Id` header, and
//! resumable server-to-client streams backed by an [`EventStore`].
//!
//! [`EventStore`]: crate::transport::event_store::EventStore

pub mod server;
pub mod session;
pub mod session_manager;

pub use session::{SessionHandle, SessionId};
pub use session_manager::{LocalSessionManager, NeverSessionManager, ServerSseMessage, SessionManager};

/// Behavior knobs for a [`server::StreamableHttpService`], mirroring the
/// transport spec's stateful-vs-stateless distinction and the standalone
/// stream's keep-alive cadence.
#[derive(Debug, Clone)]
pub struct StreamableHttpServerConfig {
    /// How often to send an SSE comment on idle streams to defeat
    /// intermediary timeouts. `None` disables keep-alives.
    pub sse_keep_alive: Option<std::time::Duration>,
    /// Stateful mode (the default): sessions are created, tracked by id,
    /// and may be resumed. Stateless mode never creates a session; each
    /// `POST` gets a fresh one-shot [`session::Session`] that is torn down
    /// as soon as its response is produced.
    pub stateful_mode: bool,
}

impl Default for StreamableHttpServerConfig {
    fn default() -> Self {
        Self {
            sse_keep_alive: Some(std::time::Duration::from_secs(15)),
            stateful_mode: true,
        }
    }
}

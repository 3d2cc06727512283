//! HTTP header names and MIME types used by the Streamable HTTP transport.

use http::HeaderName;

/// `Mcp-Session-Id`: carries the session id assigned at session creation
/// on every subsequent request, and is echoed back by the server.
pub static HEADER_SESSION_ID: HeaderName = HeaderName::from_static("mcp-session-id");

/// `Last-Event-Id`: sent by a reconnecting client on `GET` to resume a
/// dropped SSE stream from the event after this one.
pub static HEADER_LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");

pub const MIME_TYPE_JSON: &str = "application/json";
pub const MIME_TYPE_EVENT_STREAM: &str = "text/event-stream";

/// Does an `Accept` header value admit the given MIME type, accounting for
/// `*/*` and a bare `type/*` wildcard (but not full parameter matching,
/// which this transport does not need).
pub fn accepts(accept_header: &str, mime_type: &str) -> bool {
    accept_header.split(',').any(|part| {
        let candidate = part.split(';').next().unwrap_or("").trim();
        candidate == "*/*" || candidate == mime_type || {
            let (want_type, _) = mime_type.split_once('/').unwrap_or((mime_type, ""));
            candidate == format!("{want_type}/*")
        }
    })
}

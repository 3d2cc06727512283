//! Constants and small helpers shared by the Streamable HTTP transport.

pub mod http_header;

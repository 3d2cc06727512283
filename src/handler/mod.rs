//! Dispatch from the wire-level [`crate::service::Service`] contract onto a
//! per-method handler trait, so an application implements `call_tool` or
//! `create_message` directly instead of matching on [`crate::model::ClientRequest`]/
//! [`crate::model::ServerRequest`] itself.

pub mod client;
pub mod server;

pub use client::ClientHandler;
pub use server::ServerHandler;

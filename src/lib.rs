#![doc = include_str!("../README.md")]

pub mod error;
pub mod handler;
pub mod model;
pub mod service;
pub mod transport;

pub use error::{InitializeError, RmcpError, ServiceError};
pub use handler::{ClientHandler, ServerHandler};
pub use service::{Peer, RequestContext, RunningService, Service, ServiceRole};

//! Gateway Module
//!
//! Accepts WebSocket upgrade requests naming a backend, dials the backend and
//! hands the connected pair to the relay engine.

pub mod client;
pub mod dial;
pub mod error;
pub mod handler;
pub mod server;

pub use client::WebSocketClient;
pub use dial::{BackendDialer, BackendTarget};
pub use error::GatewayError;
pub use handler::GatewayState;
pub use server::GatewayServer;

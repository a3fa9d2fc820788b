//! wsrelay Library
//!
//! WebSocket to TCP tunnel gateway. A client opens a WebSocket naming a
//! backend `host` and `port`; every inbound message is written to the backend
//! as raw bytes and every backend read is sent back as one message.

pub mod config;
pub mod gateway;
pub mod metrics;
pub mod relay;
pub mod shutdown;

pub use config::Config;
pub use gateway::GatewayServer;
pub use relay::RelayEngine;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the gateway
pub type Result<T> = anyhow::Result<T>;

//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub relay: RelayConfig,
    pub monitoring: MonitoringConfig,
}

/// Process-level settings, consumed at startup only
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Identifier of this gateway instance, attached to logs and health output
    pub module_id: i64,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Acceptor settings: upgrade, validation, dialing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Route serving the WebSocket upgrade
    pub path: String,
    pub max_sessions: usize,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    pub tcp_nodelay: bool,
    /// Accepted `Origin` header values; empty accepts any origin
    pub allowed_origins: Vec<String>,
    /// Frame type used for backend -> client messages
    pub message_kind: MessageKind,
    /// Largest inbound WebSocket message accepted, in bytes
    pub max_message_size: usize,
}

/// Frame type for outbound WebSocket messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Text frames, falling back to binary for payloads that are not UTF-8
    #[default]
    Text,
    Binary,
}

/// Per-session relay tunables
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Capacity, in payloads, of each direction's queue
    pub queue_capacity: usize,
    /// Upper bound of a single backend read, and so of one outbound message
    pub read_buffer_size: usize,
    #[serde(with = "humantime_serde")]
    pub close_timeout: Duration,
    /// Log every relayed payload at trace level
    pub trace_payloads: bool,
}

/// Logging and management endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
    pub sessions_endpoint_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            module_id: 0,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            max_sessions: 1000,
            connect_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            allowed_origins: vec![],
            message_kind: MessageKind::Text,
            max_message_size: 64 << 20,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            read_buffer_size: 8192,
            close_timeout: Duration::from_secs(5),
            trace_payloads: false,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            sessions_endpoint_enabled: true,
        }
    }
}

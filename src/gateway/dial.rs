//! Backend dialing

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::GatewayError;
use crate::config::GatewayConfig;

/// Backend address as requested by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub host: String,
    pub port: u16,
}

impl BackendTarget {
    /// Build a target from the raw `host` and `port` request parameters
    pub fn from_params(host: Option<&str>, port: Option<&str>) -> Result<Self, GatewayError> {
        let host = host
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(GatewayError::MissingParameter("host"))?;
        let port = port
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(GatewayError::MissingParameter("port"))?;

        let port = match port.parse::<u16>() {
            Ok(p) if p != 0 => p,
            _ => return Err(GatewayError::InvalidPort(port.to_string())),
        };

        // Accept bracketed IPv6 literals as well as bare ones.
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Opens TCP connections to backends
#[derive(Debug, Clone)]
pub struct BackendDialer {
    connect_timeout: Duration,
    tcp_nodelay: bool,
}

impl BackendDialer {
    pub fn new(connect_timeout: Duration, tcp_nodelay: bool) -> Self {
        Self {
            connect_timeout,
            tcp_nodelay,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.connect_timeout, config.tcp_nodelay)
    }

    /// Resolve `target` and connect to the first address that accepts
    pub async fn connect(&self, target: &BackendTarget) -> Result<(TcpStream, SocketAddr), GatewayError> {
        debug!("Attempting to connect to backend {}", target);

        let addrs = self.resolve(target).await?;

        let mut last_error = None;
        for addr in addrs {
            match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(self.tcp_nodelay) {
                        warn!("Failed to set TCP_NODELAY on {}: {}", addr, e);
                    }
                    info!("Connected to backend {} ({})", target, addr);
                    return Ok((stream, addr));
                }
                Ok(Err(e)) => {
                    warn!("Failed to connect to {}: {}", addr, e);
                    last_error = Some(GatewayError::Connect {
                        target: target.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!("Connecting to {} timed out after {:?}", addr, self.connect_timeout);
                    last_error = Some(GatewayError::ConnectTimeout {
                        target: target.to_string(),
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| GatewayError::Resolve {
            target: target.to_string(),
            reason: "no addresses resolved".to_string(),
        }))
    }

    async fn resolve(&self, target: &BackendTarget) -> Result<Vec<SocketAddr>, GatewayError> {
        let lookup = lookup_host((target.host.as_str(), target.port));
        match timeout(self.connect_timeout, lookup).await {
            Ok(Ok(addrs)) => {
                let addrs: Vec<SocketAddr> = addrs.collect();
                debug!("Resolved {} to {} addresses", target, addrs.len());
                Ok(addrs)
            }
            Ok(Err(e)) => Err(GatewayError::Resolve {
                target: target.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(GatewayError::ConnectTimeout {
                target: target.to_string(),
            }),
        }
    }
}

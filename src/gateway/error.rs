//! Acceptor errors
//!
//! Every variant rejects the request before a relay session exists.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("origin '{0}' is not allowed")]
    OriginRejected(String),

    #[error("session limit reached")]
    AtCapacity,

    #[error("failed to resolve backend {target}: {reason}")]
    Resolve { target: String, reason: String },

    #[error("failed to connect to backend {target}: {reason}")]
    Connect { target: String, reason: String },

    #[error("connecting to backend {target} timed out")]
    ConnectTimeout { target: String },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingParameter(_) | GatewayError::InvalidPort(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::OriginRejected(_) => StatusCode::FORBIDDEN,
            GatewayError::AtCapacity => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Resolve { .. } | GatewayError::Connect { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::ConnectTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Short label used for the rejection metric
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::MissingParameter(_) => "missing_parameter",
            GatewayError::InvalidPort(_) => "invalid_port",
            GatewayError::OriginRejected(_) => "origin",
            GatewayError::AtCapacity => "capacity",
            GatewayError::Resolve { .. } => "resolve",
            GatewayError::Connect { .. } | GatewayError::ConnectTimeout { .. } => "connect",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        warn!("Rejecting tunnel request: {}", self);
        (self.status(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::MissingParameter("host").status(), StatusCode::BAD_REQUEST);
        assert_eq!(GatewayError::InvalidPort("0".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(GatewayError::OriginRejected("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(GatewayError::AtCapacity.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            GatewayError::ConnectTimeout { target: "a:1".into() }.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::Connect { target: "a:1".into(), reason: "refused".into() }.status(),
            StatusCode::BAD_GATEWAY
        );
    }
}

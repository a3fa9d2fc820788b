//! Tunnel request handlers

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

use super::client::WebSocketClient;
use super::dial::{BackendDialer, BackendTarget};
use super::GatewayError;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::relay::{ConnectionStats, RelayEngine, RelaySession};

/// Shared state for handlers
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub engine: Arc<RelayEngine>,
    pub dialer: Arc<BackendDialer>,
    pub metrics: Arc<Metrics>,
    pub slots: Arc<Semaphore>,
    pub start_time: SystemTime,
}

/// Query parameters of a tunnel request
#[derive(Debug, Default, Deserialize)]
pub struct TunnelQuery {
    pub host: Option<String>,
    pub port: Option<String>,
}

/// `GET /ws?host=..&port=..`: validate, dial the backend, then upgrade and relay.
pub async fn tunnel_handler(
    State(state): State<GatewayState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<TunnelQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match accept(&state, &headers, &query).await {
        Ok((target, backend, slot)) => {
            let peer = peer.map(|ConnectInfo(addr)| addr);
            ws.max_message_size(state.config.gateway.max_message_size)
                .on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {}", e))
                .on_upgrade(move |socket| run_tunnel(state, socket, backend, target, peer, slot))
        }
        Err(e) => {
            state.metrics.request_rejected(e.reason());
            e.into_response()
        }
    }
}

/// Everything that has to succeed before a session may exist
async fn accept(
    state: &GatewayState,
    headers: &HeaderMap,
    query: &TunnelQuery,
) -> Result<(BackendTarget, TcpStream, OwnedSemaphorePermit), GatewayError> {
    let target = BackendTarget::from_params(query.host.as_deref(), query.port.as_deref())?;
    check_origin(&state.config.gateway.allowed_origins, headers)?;

    let slot = Arc::clone(&state.slots)
        .try_acquire_owned()
        .map_err(|_| GatewayError::AtCapacity)?;

    info!("request with backend host: {} port: {}", target.host, target.port);
    let (backend, _) = state.dialer.connect(&target).await?;

    Ok((target, backend, slot))
}

/// Accept any origin when `allowed` is empty, otherwise require an exact
/// (case-insensitive) match of the `Origin` header.
pub fn check_origin(allowed: &[String], headers: &HeaderMap) -> Result<(), GatewayError> {
    if allowed.is_empty() {
        return Ok(());
    }

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if allowed.iter().any(|a| a.eq_ignore_ascii_case(origin)) {
        Ok(())
    } else {
        Err(GatewayError::OriginRejected(origin.to_string()))
    }
}

async fn run_tunnel(
    state: GatewayState,
    socket: WebSocket,
    backend: TcpStream,
    target: BackendTarget,
    peer: Option<SocketAddr>,
    _slot: OwnedSemaphorePermit,
) {
    let session = Arc::new(RelaySession::new(peer, target.to_string()));
    let client = WebSocketClient::new(socket, state.config.gateway.message_kind);

    state.metrics.session_started();
    let stats = state.engine.process(session, client, backend).await;
    state.metrics.session_finished(&stats);

    info!("end with backend host: {} port: {}", target.host, target.port);
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub module_id: i64,
    pub active_sessions: usize,
    pub available_slots: usize,
    pub uptime_secs: u64,
}

/// `GET /healthz`
pub async fn health_check(State(state): State<GatewayState>) -> Json<HealthStatus> {
    let uptime_secs = SystemTime::now()
        .duration_since(state.start_time)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    Json(HealthStatus {
        status: "healthy".to_string(),
        module_id: state.config.server.module_id,
        active_sessions: state.engine.active_session_count(),
        available_slots: state.slots.available_permits(),
        uptime_secs,
    })
}

/// `GET /sessions`
pub async fn list_sessions(State(state): State<GatewayState>) -> Json<Vec<ConnectionStats>> {
    Json(state.engine.get_active_session_stats())
}

/// `GET /metrics`
pub async fn prometheus_metrics(State(state): State<GatewayState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}

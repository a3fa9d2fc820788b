//! Gateway HTTP Server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::dial::BackendDialer;
use super::handler::{self, GatewayState};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::relay::RelayEngine;
use crate::shutdown::ShutdownCoordinator;
use crate::Result;

/// HTTP listener accepting tunnel requests
pub struct GatewayServer {
    state: GatewayState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl GatewayServer {
    pub fn new(config: Config, shutdown: Arc<ShutdownCoordinator>) -> Result<Self> {
        let config = Arc::new(config);
        let engine = RelayEngine::from_config(&config).with_server_shutdown(shutdown.token());
        let metrics = Metrics::new().context("Failed to create metrics registry")?;

        let state = GatewayState {
            engine: Arc::new(engine),
            dialer: Arc::new(BackendDialer::from_config(&config.gateway)),
            metrics: Arc::new(metrics),
            slots: Arc::new(Semaphore::new(config.gateway.max_sessions)),
            start_time: SystemTime::now(),
            config,
        };

        Ok(Self { state, shutdown })
    }

    pub fn engine(&self) -> &Arc<RelayEngine> {
        &self.state.engine
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.state.metrics
    }

    /// Build the router: tunnel route plus management endpoints
    pub fn router(&self) -> Router {
        let monitoring = &self.state.config.monitoring;
        let mut router = Router::new()
            .route(&self.state.config.gateway.path, get(handler::tunnel_handler))
            .route("/healthz", get(handler::health_check));

        if monitoring.sessions_endpoint_enabled {
            router = router.route("/sessions", get(handler::list_sessions));
        }
        if monitoring.metrics_enabled {
            router = router.route("/metrics", get(handler::prometheus_metrics));
        }

        router
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.state.config.server.listen_addr;
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind gateway listener to {}", addr))
    }

    /// Serve until shutdown, then wait for running sessions to wind down
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr().context("Failed to read listener address")?;
        info!(
            "Gateway listening on {} (path {}, module_id {})",
            local_addr, self.state.config.gateway.path, self.state.config.server.module_id
        );

        let app = self.router();
        let token = self.shutdown.token();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .context("Gateway server error")?;

        info!("Gateway listener stopped");
        self.shutdown.wait_for_sessions(&self.state.engine).await;
        Ok(())
    }

    pub async fn run(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}

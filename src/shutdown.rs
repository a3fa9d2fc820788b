//! Graceful Shutdown Handling
//!
//! Listens for SIGTERM and SIGINT, stops the listener and winds down every
//! running relay session through its own single-fire teardown path.

use std::time::{Duration, Instant};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::relay::RelayEngine;
use crate::Result;

/// Process-wide shutdown coordinator
pub struct ShutdownCoordinator {
    token: CancellationToken,
    /// How long running sessions get to close their endpoints
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            timeout,
        }
    }

    /// Token cancelled when shutdown begins
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            info!("Shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for SIGTERM or SIGINT (Ctrl+C elsewhere), or for a programmatic
    /// trigger, then begin shutdown.
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = self.token.cancelled() => {}
            }
        }

        #[cfg(windows)]
        {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
                _ = self.token.cancelled() => {}
            }
        }

        self.trigger();
        Ok(())
    }

    /// Wait for the engine's sessions to finish, up to the shutdown timeout.
    /// Returns the number of sessions still active when waiting stopped.
    pub async fn wait_for_sessions(&self, engine: &RelayEngine) -> usize {
        let start_time = Instant::now();

        let mut last_count = engine.active_session_count();
        info!("Waiting for {} active sessions to close (timeout: {:?})", last_count, self.timeout);

        while last_count > 0 && start_time.elapsed() < self.timeout {
            tokio::time::sleep(Duration::from_millis(50)).await;

            let current_count = engine.active_session_count();
            if current_count != last_count {
                debug!("Active sessions: {} -> {}", last_count, current_count);
                last_count = current_count;
            }
        }

        let elapsed = start_time.elapsed();
        if last_count == 0 {
            info!("All sessions closed gracefully in {:?}", elapsed);
        } else {
            warn!("Shutdown timeout reached after {:?} with {} sessions still active",
                  elapsed, last_count);
        }

        last_count
    }
}

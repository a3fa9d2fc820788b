//! Relay Engine

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use super::signal::{ShutdownSignal, TerminationCause, Worker};
use super::workers::{self, WorkerContext};
use super::{ConnectionStats, RelaySession};

/// Runs relay sessions and keeps track of the ones in flight
pub struct RelayEngine {
    config: RelayConfig,
    active_sessions: Mutex<HashMap<String, Arc<RelaySession>>>,
    server_shutdown: Option<CancellationToken>,
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayEngine {
    /// Create a relay engine with default tunables
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    pub fn with_config(config: RelayConfig) -> Self {
        Self {
            config,
            active_sessions: Mutex::new(HashMap::new()),
            server_shutdown: None,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::with_config(config.relay.clone())
    }

    /// Terminate every running session when `token` is cancelled
    pub fn with_server_shutdown(mut self, token: CancellationToken) -> Self {
        self.server_shutdown = Some(token);
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Relay between `client` and `backend` until either side closes or fails.
    ///
    /// Returns once all four workers have exited and both endpoints have been
    /// closed. Failures end the session; they are logged and summarised in the
    /// returned statistics, never returned as errors.
    pub async fn process<C, B>(&self, session: Arc<RelaySession>, client: C, backend: B) -> ConnectionStats
    where
        C: Stream<Item = io::Result<Bytes>> + Sink<Bytes, Error = io::Error> + Send + Unpin + 'static,
        B: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.register(&session);
        info!(
            session_id = %session.session_id,
            backend = %session.backend,
            "Relay session started"
        );

        let signal = Arc::new(ShutdownSignal::new());
        let abort = CancellationToken::new();
        let ctx = WorkerContext {
            signal: Arc::clone(&signal),
            session: Arc::clone(&session),
            abort: abort.clone(),
            trace_payloads: self.config.trace_payloads,
        };

        let (client_sink, client_stream) = client.split::<Bytes>();
        let (backend_read, backend_write) = tokio::io::split(backend);
        let (forward_tx, forward_rx) = mpsc::channel::<Bytes>(self.config.queue_capacity);
        let (backward_tx, backward_rx) = mpsc::channel::<Bytes>(self.config.queue_capacity);

        let client_pump = tokio::spawn(workers::supervise(
            Worker::ClientPump,
            Arc::clone(&signal),
            workers::client_pump(client_stream, forward_tx, ctx.clone()),
        ));
        let backend_writer = tokio::spawn(workers::supervise(
            Worker::BackendWriter,
            Arc::clone(&signal),
            workers::backend_writer(backend_write, forward_rx, ctx.clone()),
        ));
        let backend_pump = tokio::spawn(workers::supervise(
            Worker::BackendPump,
            Arc::clone(&signal),
            workers::backend_pump(backend_read, backward_tx, ctx.clone(), self.config.read_buffer_size),
        ));
        let client_writer = tokio::spawn(workers::supervise(
            Worker::ClientWriter,
            Arc::clone(&signal),
            workers::client_writer(client_sink, backward_rx, ctx),
        ));

        match &self.server_shutdown {
            Some(server_shutdown) => {
                tokio::select! {
                    _ = signal.fired() => {}
                    _ = server_shutdown.cancelled() => {
                        signal.trigger(TerminationCause::ServerShutdown);
                    }
                }
            }
            None => signal.fired().await,
        }

        let cause = signal.cause();
        let termination = cause.map(|cause| cause.to_string());
        info!(
            session_id = %session.session_id,
            cause = termination.as_deref().unwrap_or("unknown"),
            "Relay session terminating"
        );

        // Pumps stop on the signal and close their queues. After an orderly
        // close the writers get up to `close_timeout` to flush what was
        // already read; after a failure they are stopped right away.
        if !cause.is_some_and(TerminationCause::is_orderly) {
            abort.cancel();
        }
        let barrier = async { tokio::join!(client_pump, backend_writer, backend_pump, client_writer) };
        tokio::pin!(barrier);
        let (client_stream, backend_write, backend_read, client_sink) =
            match timeout(self.config.close_timeout, &mut barrier).await {
                Ok(halves) => halves,
                Err(_) => {
                    warn!(
                        session_id = %session.session_id,
                        "Writers did not drain within {:?}, discarding queued payloads",
                        self.config.close_timeout
                    );
                    abort.cancel();
                    barrier.await
                }
            };
        debug!(session_id = %session.session_id, "All relay workers exited");

        let client = match (client_stream, client_sink) {
            (Ok(Some(stream)), Ok(Some(sink))) => stream.reunite(sink).ok(),
            _ => None,
        };
        let backend = match (backend_read, backend_write) {
            (Ok(Some(read)), Ok(Some(write))) => Some(read.unsplit(write)),
            _ => None,
        };
        if client.is_none() || backend.is_none() {
            error!(
                session_id = %session.session_id,
                "Relay worker did not return its endpoint, dropping without close"
            );
        }

        tokio::join!(
            self.close_client(&session, client),
            self.close_backend(&session, backend),
        );

        self.remove_session(&session.session_id);
        session.log_stats(termination.as_deref());
        session.to_stats(termination)
    }

    async fn close_client<C>(&self, session: &RelaySession, client: Option<C>)
    where
        C: Sink<Bytes, Error = io::Error> + Unpin,
    {
        let Some(mut client) = client else { return };
        match timeout(self.config.close_timeout, client.close()).await {
            Ok(Ok(())) => debug!(session_id = %session.session_id, "Client endpoint closed"),
            Ok(Err(e)) => debug!(session_id = %session.session_id, "Client close reported: {}", e),
            Err(_) => warn!(
                session_id = %session.session_id,
                "Client close timed out after {:?}", self.config.close_timeout
            ),
        }
    }

    async fn close_backend<B>(&self, session: &RelaySession, backend: Option<B>)
    where
        B: AsyncWrite + Unpin,
    {
        let Some(mut backend) = backend else { return };
        match timeout(self.config.close_timeout, backend.shutdown()).await {
            Ok(Ok(())) => debug!(session_id = %session.session_id, "Backend endpoint closed"),
            Ok(Err(e)) => debug!(session_id = %session.session_id, "Backend close reported: {}", e),
            Err(_) => warn!(
                session_id = %session.session_id,
                "Backend close timed out after {:?}", self.config.close_timeout
            ),
        }
    }

    fn register(&self, session: &Arc<RelaySession>) {
        let mut sessions = self.active_sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session.session_id.clone(), Arc::clone(session));
    }

    /// Remove a session from active tracking
    pub fn remove_session(&self, session_id: &str) {
        let mut sessions = self.active_sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.remove(session_id).is_some() {
            debug!("Removed session {} from active tracking", session_id);
        }
    }

    pub fn get_active_sessions(&self) -> Vec<Arc<RelaySession>> {
        let sessions = self.active_sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.values().cloned().collect()
    }

    pub fn active_session_count(&self) -> usize {
        let sessions = self.active_sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.len()
    }

    pub fn get_session(&self, session_id: &str) -> Option<Arc<RelaySession>> {
        let sessions = self.active_sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.get(session_id).cloned()
    }

    /// Statistics for all active sessions
    pub fn get_active_session_stats(&self) -> Vec<ConnectionStats> {
        let sessions = self.active_sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.values().map(|session| session.to_stats(None)).collect()
    }
}

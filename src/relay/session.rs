//! Relay Session

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Identity and traffic counters of one WebSocket-to-backend pairing
#[derive(Debug)]
pub struct RelaySession {
    pub session_id: String,
    pub client_addr: Option<SocketAddr>,
    /// Backend as requested by the client (`host:port`)
    pub backend: String,
    pub start_time: Instant,
    started_at: SystemTime,
    bytes_up: AtomicU64,
    bytes_down: AtomicU64,
    messages_up: AtomicU64,
    messages_down: AtomicU64,
}

/// Summary of a session, live or completed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub session_id: String,
    pub client_addr: Option<SocketAddr>,
    pub backend: String,
    pub start_time: SystemTime,
    pub duration_ms: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub total_bytes: u64,
    pub messages_up: u64,
    pub messages_down: u64,
    pub termination: Option<String>,
}

impl RelaySession {
    /// Create a new relay session with a generated id
    pub fn new(client_addr: Option<SocketAddr>, backend: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), client_addr, backend)
    }

    pub fn with_id(
        session_id: impl Into<String>,
        client_addr: Option<SocketAddr>,
        backend: impl Into<String>,
    ) -> Self {
        let session_id = session_id.into();
        let backend = backend.into();
        debug!("Creating relay session {} ({:?} -> {})", session_id, client_addr, backend);

        Self {
            session_id,
            client_addr,
            backend,
            start_time: Instant::now(),
            started_at: SystemTime::now(),
            bytes_up: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
            messages_up: AtomicU64::new(0),
            messages_down: AtomicU64::new(0),
        }
    }

    /// Bytes written to the backend (client to backend)
    pub fn bytes_up(&self) -> u64 {
        self.bytes_up.load(Ordering::Relaxed)
    }

    /// Bytes written to the client (backend to client)
    pub fn bytes_down(&self) -> u64 {
        self.bytes_down.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_up() + self.bytes_down()
    }

    pub fn messages_up(&self) -> u64 {
        self.messages_up.load(Ordering::Relaxed)
    }

    pub fn messages_down(&self) -> u64 {
        self.messages_down.load(Ordering::Relaxed)
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Record one payload delivered to the backend
    pub fn record_up(&self, bytes: usize) {
        self.bytes_up.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_up.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one payload delivered to the client
    pub fn record_down(&self, bytes: usize) {
        self.bytes_down.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_down.fetch_add(1, Ordering::Relaxed);
    }

    pub fn to_stats(&self, termination: Option<String>) -> ConnectionStats {
        ConnectionStats {
            session_id: self.session_id.clone(),
            client_addr: self.client_addr,
            backend: self.backend.clone(),
            start_time: self.started_at,
            duration_ms: self.duration().as_millis() as u64,
            bytes_up: self.bytes_up(),
            bytes_down: self.bytes_down(),
            total_bytes: self.total_bytes(),
            messages_up: self.messages_up(),
            messages_down: self.messages_down(),
            termination,
        }
    }

    pub fn log_stats(&self, termination: Option<&str>) {
        info!(
            session_id = %self.session_id,
            backend = %self.backend,
            duration_ms = self.duration().as_millis() as u64,
            bytes_up = self.bytes_up(),
            bytes_down = self.bytes_down(),
            messages_up = self.messages_up(),
            messages_down = self.messages_down(),
            termination = termination.unwrap_or("none"),
            "Relay session completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_stats() {
        let client: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let session = RelaySession::with_id("s1", Some(client), "db.internal:5432");

        session.record_up(5);
        session.record_up(7);
        session.record_down(100);

        assert_eq!(session.bytes_up(), 12);
        assert_eq!(session.messages_up(), 2);
        assert_eq!(session.bytes_down(), 100);
        assert_eq!(session.messages_down(), 1);
        assert_eq!(session.total_bytes(), 112);

        let stats = session.to_stats(Some("backend_pump observed close".to_string()));
        assert_eq!(stats.session_id, "s1");
        assert_eq!(stats.client_addr, Some(client));
        assert_eq!(stats.backend, "db.internal:5432");
        assert_eq!(stats.total_bytes, 112);
        assert_eq!(stats.termination.as_deref(), Some("backend_pump observed close"));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RelaySession::new(None, "a:1");
        let b = RelaySession::new(None, "a:1");
        assert_ne!(a.session_id, b.session_id);
    }
}

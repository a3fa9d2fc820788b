//! Data Relay Module
//!
//! Moves payloads between a WebSocket client endpoint and a raw TCP backend
//! endpoint, in both directions, and tears the pair down exactly once.

pub mod engine;
pub mod session;
pub mod signal;
pub mod workers;

pub use engine::RelayEngine;
pub use session::{ConnectionStats, RelaySession};
pub use signal::{CoordinatorState, ShutdownSignal, TerminationCause, Worker};

//! Session Shutdown Coordinator
//!
//! A single-fire termination signal shared by the four relay workers of one
//! session. The first worker to detect a failure or an orderly close wins the
//! compare-and-swap, records the cause and cancels the session token; every
//! later detection is a no-op.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// The four workers of a relay session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Worker {
    /// Reads WebSocket messages from the client, feeds the forward queue
    ClientPump,
    /// Reads byte chunks from the backend, feeds the backward queue
    BackendPump,
    /// Drains the backward queue into the client
    ClientWriter,
    /// Drains the forward queue into the backend
    BackendWriter,
}

impl Worker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Worker::ClientPump => "client_pump",
            Worker::BackendPump => "backend_pump",
            Worker::ClientWriter => "client_writer",
            Worker::BackendWriter => "backend_writer",
        }
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session left the running state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationCause {
    /// The worker's source endpoint closed in an orderly way
    Closed { by: Worker },
    /// A read on the worker's source endpoint failed
    ReadFailed { by: Worker, error: String },
    /// A write on the worker's destination endpoint failed
    WriteFailed { by: Worker, error: String },
    /// The worker panicked and lost its endpoint half
    WorkerPanicked { by: Worker },
    /// The hosting server is shutting down
    ServerShutdown,
}

impl TerminationCause {
    /// Worker that detected the condition, if any
    pub fn worker(&self) -> Option<Worker> {
        match self {
            TerminationCause::Closed { by }
            | TerminationCause::ReadFailed { by, .. }
            | TerminationCause::WriteFailed { by, .. }
            | TerminationCause::WorkerPanicked { by } => Some(*by),
            TerminationCause::ServerShutdown => None,
        }
    }

    /// True for a close rather than an I/O failure
    pub fn is_orderly(&self) -> bool {
        matches!(
            self,
            TerminationCause::Closed { .. } | TerminationCause::ServerShutdown
        )
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::Closed { by } => write!(f, "{} observed close", by),
            TerminationCause::ReadFailed { by, error } => write!(f, "{} read failed: {}", by, error),
            TerminationCause::WriteFailed { by, error } => {
                write!(f, "{} write failed: {}", by, error)
            }
            TerminationCause::WorkerPanicked { by } => write!(f, "{} panicked", by),
            TerminationCause::ServerShutdown => f.write_str("server shutdown"),
        }
    }
}

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Running,
    Terminating,
}

/// Single-fire shutdown signal for one relay session
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
    cause: OnceLock<TerminationCause>,
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the session to `Terminating`.
    ///
    /// Returns `true` only for the call that performed the transition; that
    /// call records `cause` and delivers the cancellation. Concurrent and later
    /// callers get `false` and change nothing.
    pub fn trigger(&self, cause: TerminationCause) -> bool {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Only the CAS winner reaches this point, so the cell is always empty.
        let _ = self.cause.set(cause);
        self.token.cancel();
        true
    }

    pub fn state(&self) -> CoordinatorState {
        if self.triggered.load(Ordering::Acquire) {
            CoordinatorState::Terminating
        } else {
            CoordinatorState::Running
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.state() == CoordinatorState::Terminating
    }

    /// Cause recorded by the first trigger
    pub fn cause(&self) -> Option<&TerminationCause> {
        self.cause.get()
    }

    /// Resolves once the signal has fired. Safe to await from any number of
    /// tasks, before or after the trigger.
    pub fn fired(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_first_trigger_wins() {
        let signal = ShutdownSignal::new();
        assert_eq!(signal.state(), CoordinatorState::Running);
        assert!(signal.cause().is_none());

        assert!(signal.trigger(TerminationCause::Closed { by: Worker::BackendPump }));
        assert!(!signal.trigger(TerminationCause::WriteFailed {
            by: Worker::ClientWriter,
            error: "broken pipe".to_string(),
        }));

        assert_eq!(signal.state(), CoordinatorState::Terminating);
        assert_eq!(
            signal.cause(),
            Some(&TerminationCause::Closed { by: Worker::BackendPump })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_transition_once() {
        for _ in 0..50 {
            let signal = Arc::new(ShutdownSignal::new());
            let workers = [
                Worker::ClientPump,
                Worker::BackendPump,
                Worker::ClientWriter,
                Worker::BackendWriter,
            ];

            let handles: Vec<_> = workers
                .into_iter()
                .map(|by| {
                    let signal = Arc::clone(&signal);
                    tokio::spawn(async move {
                        signal.trigger(TerminationCause::ReadFailed {
                            by,
                            error: "reset".to_string(),
                        })
                    })
                })
                .collect();

            let mut winners = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1);
            assert!(signal.cause().is_some());
        }
    }

    #[tokio::test]
    async fn test_fired_wakes_waiters_registered_before_and_after() {
        let signal = Arc::new(ShutdownSignal::new());

        let early = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.fired().await })
        };
        tokio::task::yield_now().await;

        signal.trigger(TerminationCause::ServerShutdown);

        tokio::time::timeout(Duration::from_secs(1), early)
            .await
            .expect("early waiter should wake")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), signal.fired())
            .await
            .expect("late waiter should resolve immediately");
    }

    #[test]
    fn test_cause_accessors() {
        let cause = TerminationCause::WriteFailed {
            by: Worker::BackendWriter,
            error: "connection reset".to_string(),
        };
        assert_eq!(cause.worker(), Some(Worker::BackendWriter));
        assert!(!cause.is_orderly());
        assert_eq!(cause.to_string(), "backend_writer write failed: connection reset");

        assert_eq!(TerminationCause::ServerShutdown.worker(), None);
        assert!(TerminationCause::ServerShutdown.is_orderly());
    }
}

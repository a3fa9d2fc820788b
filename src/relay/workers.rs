//! Relay Workers
//!
//! Two pumps (endpoint -> queue) and two writers (queue -> endpoint). Each
//! worker owns exactly one endpoint half and one queue end, and hands its
//! endpoint half back when it exits so the engine can close the endpoint.
//!
//! Pumps stop reading as soon as the session signal fires. Writers keep
//! draining their queue until the paired pump closes it, and stop early
//! only when the engine aborts the drain.

use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::signal::{ShutdownSignal, TerminationCause, Worker};
use super::RelaySession;

/// Shared handles every worker of a session gets
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub signal: Arc<ShutdownSignal>,
    pub session: Arc<RelaySession>,
    /// Cancelled by the engine to cut a writer's drain short
    pub abort: CancellationToken,
    pub trace_payloads: bool,
}

impl WorkerContext {
    fn trace_payload(&self, worker: Worker, payload: &[u8]) {
        if self.trace_payloads {
            trace!(
                session_id = %self.session.session_id,
                worker = %worker,
                len = payload.len(),
                payload = %String::from_utf8_lossy(payload),
                "Relaying payload"
            );
        }
    }

    fn closed(&self, by: Worker) {
        debug!(session_id = %self.session.session_id, worker = %by, "Source endpoint closed");
        self.signal.trigger(TerminationCause::Closed { by });
    }

    fn read_failed(&self, by: Worker, error: &io::Error) {
        warn!(session_id = %self.session.session_id, worker = %by, "Read failed: {}", error);
        self.signal.trigger(TerminationCause::ReadFailed {
            by,
            error: error.to_string(),
        });
    }

    fn write_failed(&self, by: Worker, error: &io::Error) {
        warn!(session_id = %self.session.session_id, worker = %by, "Write failed: {}", error);
        self.signal.trigger(TerminationCause::WriteFailed {
            by,
            error: error.to_string(),
        });
    }
}

/// Run one worker, turning a panic into a session trigger.
///
/// Yields the worker's endpoint half, or `None` when the worker panicked and
/// the half was lost with it.
pub async fn supervise<F>(worker: Worker, signal: Arc<ShutdownSignal>, run: F) -> Option<F::Output>
where
    F: Future,
{
    match AssertUnwindSafe(run).catch_unwind().await {
        Ok(half) => Some(half),
        Err(_) => {
            error!(worker = %worker, "Relay worker panicked");
            signal.trigger(TerminationCause::WorkerPanicked { by: worker });
            None
        }
    }
}

/// Push onto a bounded queue, waiting for space. Returns `false` when the
/// session is terminating or the consumer is gone.
async fn enqueue(queue: &mpsc::Sender<Bytes>, payload: Bytes, signal: &ShutdownSignal) -> bool {
    tokio::select! {
        _ = signal.fired() => false,
        sent = queue.send(payload) => sent.is_ok(),
    }
}

/// Client -> forward queue. One inbound WebSocket message is one payload.
pub async fn client_pump<R>(mut source: R, queue: mpsc::Sender<Bytes>, ctx: WorkerContext) -> R
where
    R: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let worker = Worker::ClientPump;
    loop {
        let next = tokio::select! {
            _ = ctx.signal.fired() => break,
            next = source.next() => next,
        };

        match next {
            Some(Ok(payload)) => {
                ctx.trace_payload(worker, &payload);
                if !enqueue(&queue, payload, &ctx.signal).await {
                    break;
                }
            }
            Some(Err(e)) => {
                ctx.read_failed(worker, &e);
                break;
            }
            None => {
                ctx.closed(worker);
                break;
            }
        }
    }

    // Closing the queue lets the backend writer drain what is left and stop.
    drop(queue);
    source
}

/// Backend -> backward queue. One read is one payload of at most
/// `buffer_size` bytes; reads are never coalesced.
pub async fn backend_pump<R>(
    mut source: R,
    queue: mpsc::Sender<Bytes>,
    ctx: WorkerContext,
    buffer_size: usize,
) -> R
where
    R: AsyncRead + Unpin,
{
    let worker = Worker::BackendPump;
    let mut buf = vec![0u8; buffer_size];
    loop {
        let read = tokio::select! {
            _ = ctx.signal.fired() => break,
            read = source.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                ctx.closed(worker);
                break;
            }
            Ok(n) => {
                let payload = Bytes::copy_from_slice(&buf[..n]);
                ctx.trace_payload(worker, &payload);
                if !enqueue(&queue, payload, &ctx.signal).await {
                    break;
                }
            }
            Err(e) => {
                ctx.read_failed(worker, &e);
                break;
            }
        }
    }

    drop(queue);
    source
}

/// Backward queue -> client, one payload per outbound WebSocket message.
pub async fn client_writer<W>(mut sink: W, mut queue: mpsc::Receiver<Bytes>, ctx: WorkerContext) -> W
where
    W: Sink<Bytes, Error = io::Error> + Unpin,
{
    let worker = Worker::ClientWriter;
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.abort.cancelled() => break,
            next = queue.recv() => next,
        };
        let Some(payload) = next else {
            debug!(session_id = %ctx.session.session_id, worker = %worker, "Queue closed and drained");
            break;
        };

        let len = payload.len();
        let written = tokio::select! {
            biased;
            written = sink.send(payload) => written,
            _ = ctx.abort.cancelled() => break,
        };
        match written {
            Ok(()) => ctx.session.record_down(len),
            Err(e) => {
                ctx.write_failed(worker, &e);
                break;
            }
        }
    }

    sink
}

/// Forward queue -> backend, payloads written back to back with no delimiter.
pub async fn backend_writer<W>(mut sink: W, mut queue: mpsc::Receiver<Bytes>, ctx: WorkerContext) -> W
where
    W: AsyncWrite + Unpin,
{
    let worker = Worker::BackendWriter;
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.abort.cancelled() => break,
            next = queue.recv() => next,
        };
        let Some(payload) = next else {
            debug!(session_id = %ctx.session.session_id, worker = %worker, "Queue closed and drained");
            break;
        };

        let written = tokio::select! {
            biased;
            written = write_payload(&mut sink, &payload) => written,
            _ = ctx.abort.cancelled() => break,
        };
        match written {
            Ok(()) => ctx.session.record_up(payload.len()),
            Err(e) => {
                ctx.write_failed(worker, &e);
                break;
            }
        }
    }

    sink
}

async fn write_payload<W: AsyncWrite + Unpin>(sink: &mut W, payload: &[u8]) -> io::Result<()> {
    sink.write_all(payload).await?;
    sink.flush().await
}

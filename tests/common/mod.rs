//! In-memory endpoints for driving the relay engine in tests

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, oneshot};

/// How the mock client's sink behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Deliver,
    Fail,
    /// `poll_ready` never completes
    Stall,
}

/// Message-framed client endpoint backed by channels
pub struct MockClient {
    inbound: mpsc::UnboundedReceiver<io::Result<Bytes>>,
    outbound: mpsc::UnboundedSender<Bytes>,
    closes: Arc<AtomicUsize>,
    write_mode: WriteMode,
}

/// Test-side handle of a [`MockClient`]
pub struct ClientHandle {
    /// Messages the client "sends"; dropping it is an orderly close
    pub to_relay: Option<mpsc::UnboundedSender<io::Result<Bytes>>>,
    /// Messages the relay delivered to the client
    pub from_relay: mpsc::UnboundedReceiver<Bytes>,
    pub closes: Arc<AtomicUsize>,
}

impl ClientHandle {
    pub fn send(&self, payload: &'static [u8]) {
        self.to_relay
            .as_ref()
            .expect("client already closed")
            .send(Ok(Bytes::from_static(payload)))
            .expect("relay dropped the client stream");
    }

    pub fn fail(&self, kind: io::ErrorKind) {
        if let Some(tx) = &self.to_relay {
            let _ = tx.send(Err(io::Error::new(kind, "injected client failure")));
        }
    }

    pub fn close(&mut self) {
        self.to_relay.take();
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub fn mock_client(write_mode: WriteMode) -> (MockClient, ClientHandle) {
    let (to_relay, inbound) = mpsc::unbounded_channel();
    let (outbound, from_relay) = mpsc::unbounded_channel();
    let closes = Arc::new(AtomicUsize::new(0));

    let client = MockClient {
        inbound,
        outbound,
        closes: Arc::clone(&closes),
        write_mode,
    };
    let handle = ClientHandle {
        to_relay: Some(to_relay),
        from_relay,
        closes,
    };
    (client, handle)
}

impl Stream for MockClient {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbound.poll_recv(cx)
    }
}

impl Sink<Bytes> for MockClient {
    type Error = io::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.write_mode {
            WriteMode::Stall => Poll::Pending,
            _ => Poll::Ready(Ok(())),
        }
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> io::Result<()> {
        match self.write_mode {
            WriteMode::Fail => Err(io::Error::new(io::ErrorKind::BrokenPipe, "client gone")),
            _ => self
                .outbound
                .send(item)
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "receiver dropped")),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// Byte-stream backend endpoint that counts shutdowns and can be made to
/// fail its next read
pub struct MockBackend {
    inner: DuplexStream,
    shutdowns: Arc<AtomicUsize>,
    read_error: Option<oneshot::Receiver<io::ErrorKind>>,
}

/// Test-side handle of a [`MockBackend`]
pub struct BackendHandle {
    /// The far end of the backend connection
    pub remote: DuplexStream,
    pub shutdowns: Arc<AtomicUsize>,
    fail_read: Option<oneshot::Sender<io::ErrorKind>>,
}

impl BackendHandle {
    pub fn fail_read(&mut self, kind: io::ErrorKind) {
        if let Some(tx) = self.fail_read.take() {
            let _ = tx.send(kind);
        }
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

pub fn mock_backend(max_buf_size: usize) -> (MockBackend, BackendHandle) {
    let (local, remote) = tokio::io::duplex(max_buf_size);
    let (fail_read, read_error) = oneshot::channel();
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let backend = MockBackend {
        inner: local,
        shutdowns: Arc::clone(&shutdowns),
        read_error: Some(read_error),
    };
    let handle = BackendHandle {
        remote,
        shutdowns,
        fail_read: Some(fail_read),
    };
    (backend, handle)
}

impl AsyncRead for MockBackend {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(rx) = self.read_error.as_mut() {
            match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(kind)) => {
                    self.read_error = None;
                    return Poll::Ready(Err(io::Error::new(kind, "injected backend failure")));
                }
                Poll::Ready(Err(_)) => self.read_error = None,
                Poll::Pending => {}
            }
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockBackend {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Client whose stream half panics on first poll
pub struct PanickingClient;

impl Stream for PanickingClient {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        panic!("client stream exploded");
    }
}

impl Sink<Bytes> for PanickingClient {
    type Error = io::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, _item: Bytes) -> io::Result<()> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

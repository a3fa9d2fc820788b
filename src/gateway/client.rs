//! WebSocket client endpoint
//!
//! Presents an upgraded axum `WebSocket` as a stream and sink of opaque
//! payloads: one message in or out is one `Bytes`. Ping and pong frames are
//! answered by the WebSocket layer and never surface; a close frame ends the
//! stream.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tracing::trace;

use crate::config::MessageKind;

pub struct WebSocketClient {
    inner: WebSocket,
    message_kind: MessageKind,
}

impl WebSocketClient {
    pub fn new(inner: WebSocket, message_kind: MessageKind) -> Self {
        Self { inner, message_kind }
    }
}

/// Frame an outbound payload
pub fn to_message(kind: MessageKind, payload: Bytes) -> Message {
    match kind {
        MessageKind::Binary => Message::Binary(Vec::from(payload)),
        MessageKind::Text => match String::from_utf8(Vec::from(payload)) {
            Ok(text) => Message::Text(text),
            Err(e) => Message::Binary(e.into_bytes()),
        },
    }
}

impl Stream for WebSocketClient {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let payload = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(Message::Binary(data))) => Bytes::from(data),
                Some(Ok(Message::Text(text))) => Bytes::from(text),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    trace!("Client sent close frame: {:?}", frame);
                    return Poll::Ready(None);
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(io::Error::other(e)))),
                None => return Poll::Ready(None),
            };
            return Poll::Ready(Some(Ok(payload)));
        }
    }
}

impl Sink<Bytes> for WebSocketClient {
    type Error = io::Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.poll_ready_unpin(cx).map_err(io::Error::other)
    }

    fn start_send(mut self: Pin<&mut Self>, payload: Bytes) -> io::Result<()> {
        let message = to_message(self.message_kind, payload);
        self.inner.start_send_unpin(message).map_err(io::Error::other)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.poll_flush_unpin(cx).map_err(io::Error::other)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.poll_close_unpin(cx).map_err(io::Error::other)
    }
}

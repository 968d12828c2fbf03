//! WebSocket transport: byte-stream adapter and server-side accept
//!
//! MQTT-over-WebSocket carries control packets in binary frames. [`WsStream`]
//! flattens those frames back into a byte stream so the codec and the proxy
//! core stay transport-agnostic. Ping frames are answered by the underlying
//! stream while reads are polled.

use crate::error::{ProxyError, Result};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// WebSocket server configuration
#[derive(Debug, Clone)]
pub struct WebSocketServerConfig {
    /// Path clients must request (e.g. "/mqtt")
    pub path: String,
    /// Subprotocol to negotiate (e.g. "mqtt")
    pub subprotocol: String,
}

impl Default for WebSocketServerConfig {
    fn default() -> Self {
        Self {
            path: "/mqtt".to_string(),
            subprotocol: "mqtt".to_string(),
        }
    }
}

impl WebSocketServerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket path
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the subprotocol
    #[must_use]
    pub fn with_subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = subprotocol.into();
        self
    }
}

/// WebSocket stream adapted to `AsyncRead`/`AsyncWrite`
pub struct WsStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    read_buffer: Vec<u8>,
    read_pos: usize,
}

impl WsStream {
    #[must_use]
    pub fn new(inner: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            inner,
            read_buffer: Vec::new(),
            read_pos: 0,
        }
    }

    /// Peer address of the underlying socket.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self.inner.get_ref() {
            MaybeTlsStream::Plain(stream) => stream.peer_addr().ok(),
            MaybeTlsStream::Rustls(stream) => stream.get_ref().0.peer_addr().ok(),
            _ => None,
        }
    }
}

/// Accepts an MQTT WebSocket upgrade on a fresh TCP stream.
///
/// The handshake callback verifies the request path, echoes the MQTT
/// subprotocol, and captures the request query string so the service can
/// forward it to the broker URL.
///
/// # Errors
///
/// Returns an error if the handshake fails or the path does not match.
pub async fn accept_websocket(
    stream: TcpStream,
    config: &WebSocketServerConfig,
) -> Result<(WsStream, Option<String>)> {
    let path = config.path.clone();
    let subprotocol = config.subprotocol.clone();
    let query = std::sync::Arc::new(std::sync::Mutex::new(None::<String>));
    let seen_query = query.clone();

    let callback = move |req: &Request, mut response: Response| {
        if req.uri().path() != path {
            debug!(requested = %req.uri().path(), expected = %path, "WebSocket path mismatch");
            return Err(Response::builder()
                .status(404)
                .body(Some("not found".to_string()))
                .expect("static response"));
        }

        *seen_query.lock().expect("query mutex") = req.uri().query().map(str::to_string);

        let offers_subprotocol = req
            .headers()
            .get("Sec-WebSocket-Protocol")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|protocols| protocols.split(',').any(|p| p.trim() == subprotocol));

        if offers_subprotocol {
            if let Ok(value) = subprotocol.parse() {
                response
                    .headers_mut()
                    .insert("Sec-WebSocket-Protocol", value);
            }
        }

        Ok(response)
    };

    let ws = accept_hdr_async(MaybeTlsStream::Plain(stream), callback)
        .await
        .map_err(|err| ProxyError::Connection(format!("WebSocket handshake failed: {err}")))?;

    let query = query.lock().expect("query mutex").take();
    Ok((WsStream::new(ws), query))
}

impl AsyncRead for WsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        // Drain buffered frame bytes first.
        if self.read_pos < self.read_buffer.len() {
            let remaining = &self.read_buffer[self.read_pos..];
            let to_copy = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..to_copy]);
            self.read_pos += to_copy;

            if self.read_pos >= self.read_buffer.len() {
                self.read_buffer.clear();
                self.read_pos = 0;
            }

            return Poll::Ready(Ok(()));
        }

        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(Message::Binary(data)))) => {
                self.read_buffer = data.to_vec();
                self.read_pos = 0;

                let to_copy = self.read_buffer.len().min(buf.remaining());
                buf.put_slice(&self.read_buffer[..to_copy]);
                self.read_pos = to_copy;

                Poll::Ready(Ok(()))
            }
            Poll::Ready(Some(Ok(Message::Close(_)))) | Poll::Ready(None) => {
                Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "WebSocket closed",
                )))
            }
            Poll::Ready(Some(Ok(_))) => {
                // Text, ping and pong frames carry no MQTT bytes.
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Poll::Ready(Some(Err(err))) => Poll::Ready(Err(std::io::Error::other(err.to_string()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl AsyncWrite for WsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.inner.poll_ready_unpin(cx) {
            Poll::Ready(Ok(())) => {
                let message = Message::Binary(buf.to_vec().into());
                match self.inner.start_send_unpin(message) {
                    Ok(()) => Poll::Ready(Ok(buf.len())),
                    Err(err) => Poll::Ready(Err(std::io::Error::other(err.to_string()))),
                }
            }
            Poll::Ready(Err(err)) => Poll::Ready(Err(std::io::Error::other(err.to_string()))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner
            .poll_flush_unpin(cx)
            .map_err(|err| std::io::Error::other(err.to_string()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner
            .poll_close_unpin(cx)
            .map_err(|err| std::io::Error::other(err.to_string()))
    }
}

//! Byte-stream transports carried by the proxy
//!
//! A [`Connection`] is a full-duplex byte stream from any of the accepted
//! or dialed transports. The proxy core only ever sees the two halves of
//! [`Connection::split`]: the read half feeds a pipe, the write half takes
//! serialized sends. Deadlines are applied per operation by the callers.

pub mod broker;
pub mod websocket;

pub use broker::connect_broker;
pub use websocket::{accept_websocket, WebSocketServerConfig, WsStream};

use std::fmt::Debug;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Boxed read half of a split [`Connection`]
pub type ConnectionReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed write half of a split [`Connection`]
pub type ConnectionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Unified full-duplex byte stream
pub enum Connection {
    /// Plain TCP, accepted or dialed
    Tcp(TcpStream),
    /// TLS-encrypted broker egress
    Tls(Box<TlsStream<TcpStream>>),
    /// WebSocket carrying MQTT binary frames
    WebSocket(Box<WsStream>),
    /// In-memory stream, used by the test harnesses
    Duplex(tokio::io::DuplexStream),
}

impl Connection {
    #[must_use]
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(stream)
    }

    #[must_use]
    pub fn tls(stream: TlsStream<TcpStream>) -> Self {
        Self::Tls(Box::new(stream))
    }

    #[must_use]
    pub fn websocket(stream: WsStream) -> Self {
        Self::WebSocket(Box::new(stream))
    }

    #[must_use]
    pub fn duplex(stream: tokio::io::DuplexStream) -> Self {
        Self::Duplex(stream)
    }

    /// Peer address, where the transport has one.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(stream) => stream.peer_addr().ok(),
            Self::Tls(stream) => stream.get_ref().0.peer_addr().ok(),
            Self::WebSocket(stream) => stream.peer_addr(),
            Self::Duplex(_) => None,
        }
    }

    /// Transport kind for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Tls(_) => "tls",
            Self::WebSocket(_) => "websocket",
            Self::Duplex(_) => "duplex",
        }
    }

    /// Splits into independently owned read and write halves.
    ///
    /// Dropping or shutting down a half terminates the peer's pending
    /// operations promptly.
    #[must_use]
    pub fn split(self) -> (ConnectionReader, ConnectionWriter) {
        let (reader, writer) = tokio::io::split(self);
        (Box::new(reader), Box::new(writer))
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection::{}", self.kind())
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::WebSocket(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Duplex(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::WebSocket(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Duplex(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
            Self::WebSocket(stream) => Pin::new(stream).poll_flush(cx),
            Self::Duplex(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::WebSocket(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Duplex(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

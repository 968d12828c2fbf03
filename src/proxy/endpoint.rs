//! One side of a client-broker pairing

use crate::error::{ProxyError, Result};
use crate::packet::ControlPacket;
use crate::proxy::pipe::{Nozzle, Pipe, TimeoutConfig};
use crate::proxy::processor::Processor;
use crate::transport::{Connection, ConnectionWriter};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

/// Endpoint configuration: a connection, deadlines, and a processor
#[derive(Default)]
pub struct EndpointConfig {
    pub conn: Option<Connection>,
    pub timeouts: Option<TimeoutConfig>,
    pub processor: Option<Arc<dyn Processor>>,
}

impl EndpointConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_conn(mut self, conn: Connection) -> Self {
        self.conn = Some(conn);
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    #[must_use]
    pub fn with_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }
}

/// One side of a pairing: the connection's read half feeds the owned pipe,
/// the write half takes serialized sends
pub struct Endpoint {
    pipe: Mutex<Option<Pipe>>,
    nozzle: Mutex<Option<Nozzle>>,
    writer: tokio::sync::Mutex<ConnectionWriter>,
    processor: Option<Arc<dyn Processor>>,
    timeouts: TimeoutConfig,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").finish_non_exhaustive()
    }
}

impl Endpoint {
    /// Builds an endpoint, splitting the connection between pipe and writer.
    ///
    /// # Errors
    ///
    /// Fails with `EndpointConnNotSet` when the config carries no connection.
    pub fn new(config: EndpointConfig) -> Result<Self> {
        let conn = config.conn.ok_or(ProxyError::EndpointConnNotSet)?;
        let timeouts = config.timeouts.unwrap_or_default().normalized();

        let (reader, writer) = conn.split();
        let (pipe, nozzle) = Pipe::new(reader, timeouts);

        Ok(Self {
            pipe: Mutex::new(Some(pipe)),
            nozzle: Mutex::new(Some(nozzle)),
            writer: tokio::sync::Mutex::new(writer),
            processor: config.processor,
            timeouts,
        })
    }

    #[must_use]
    pub fn processor(&self) -> Option<Arc<dyn Processor>> {
        self.processor.clone()
    }

    #[must_use]
    pub fn timeouts(&self) -> TimeoutConfig {
        self.timeouts
    }

    /// Hands the pipe to the pairing that will run it.
    ///
    /// # Errors
    ///
    /// Fails with `PipeNotSet` once the pipe has been taken.
    pub fn take_pipe(&self) -> Result<Pipe> {
        self.pipe
            .lock()
            .expect("pipe mutex")
            .take()
            .ok_or(ProxyError::PipeNotSet)
    }

    /// Hands the nozzle to the consumer loop that will drain it.
    ///
    /// # Errors
    ///
    /// Fails with `PipeChannelNotSet` once the nozzle has been taken.
    pub fn take_nozzle(&self) -> Result<Nozzle> {
        self.nozzle
            .lock()
            .expect("nozzle mutex")
            .take()
            .ok_or(ProxyError::PipeChannelNotSet)
    }

    /// Writes one framed control packet under the write deadline.
    ///
    /// Callers serialize sends per direction; the internal mutex only
    /// guards against misuse.
    ///
    /// # Errors
    ///
    /// Fails with `WriteTimeout` when the deadline elapses, or with the
    /// codec error the write produced.
    pub async fn send(&self, packet: &ControlPacket) -> Result<()> {
        let mut writer = self.writer.lock().await;
        match timeout(self.timeouts.write_timeout, packet.write(&mut *writer)).await {
            Err(_elapsed) => Err(ProxyError::WriteTimeout),
            Ok(Err(err)) => Err(err.into()),
            Ok(Ok(())) => Ok(()),
        }
    }

    /// Shuts the write half down, releasing the peer's pending reads.
    pub async fn close(&self) {
        let _ = self.writer.lock().await.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ConnectPacket;
    use tokio::io::AsyncReadExt;

    fn endpoint_over_duplex() -> (Endpoint, tokio::io::DuplexStream) {
        let (near, far) = tokio::io::duplex(1024);
        let endpoint = Endpoint::new(
            EndpointConfig::new().with_conn(Connection::duplex(near)),
        )
        .unwrap();
        (endpoint, far)
    }

    #[test]
    fn test_missing_conn_rejected() {
        let err = Endpoint::new(EndpointConfig::new()).unwrap_err();
        assert!(matches!(err, ProxyError::EndpointConnNotSet));
    }

    #[test]
    fn test_pipe_taken_once() {
        let (endpoint, _far) = endpoint_over_duplex();
        assert!(endpoint.take_pipe().is_ok());
        assert!(matches!(
            endpoint.take_pipe().unwrap_err(),
            ProxyError::PipeNotSet
        ));
    }

    #[test]
    fn test_nozzle_taken_once() {
        let (endpoint, _far) = endpoint_over_duplex();
        assert!(endpoint.take_nozzle().is_ok());
        assert!(matches!(
            endpoint.take_nozzle().unwrap_err(),
            ProxyError::PipeChannelNotSet
        ));
    }

    #[tokio::test]
    async fn test_send_writes_framed_packet() {
        let (endpoint, mut far) = endpoint_over_duplex();
        let connect = ControlPacket::Connect(ConnectPacket::new("c1").with_username("test"));

        endpoint.send(&connect).await.unwrap();

        let received = ControlPacket::read(&mut far).await.unwrap();
        assert_eq!(received, connect);
    }

    #[tokio::test]
    async fn test_send_times_out_when_peer_stalls() {
        // A one-byte duplex buffer cannot absorb a whole frame, so the
        // write blocks until the deadline.
        let (near, _far) = tokio::io::duplex(1);
        let endpoint = Endpoint::new(
            EndpointConfig::new()
                .with_conn(Connection::duplex(near))
                .with_timeouts(TimeoutConfig::default().with_write_timeout(
                    std::time::Duration::from_millis(100),
                )),
        )
        .unwrap();

        let publish = ControlPacket::Publish(crate::packet::PublishPacket::new(
            "topic",
            vec![0u8; 64],
        ));
        let err = endpoint.send(&publish).await.unwrap_err();
        assert!(matches!(err, ProxyError::WriteTimeout));
    }

    #[tokio::test]
    async fn test_close_releases_peer_reads() {
        let (endpoint, mut far) = endpoint_over_duplex();
        endpoint.close().await;

        let mut buf = [0u8; 1];
        let n = far.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}

//! One-direction packet reader
//!
//! A [`Pipe`] owns the read half of a connection and publishes framed
//! packets, one at a time, through its nozzle. The loop is
//! publish-then-read: every consumer first sees a single `Ready` marker,
//! then the packets in wire order, then the closed nozzle.

use crate::packet::{CodecError, ControlPacket};
use crate::proxy::packet::{Packet, PacketBody};
use crate::transport::ConnectionReader;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default read timeout for [`TimeoutConfig`]
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Default write timeout for [`TimeoutConfig`]
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-packet deadlines for reads and writes
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    /// Deadline for reading one framed packet
    pub read_timeout: Duration,
    /// Deadline for one nozzle publish or one connection write
    pub write_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl TimeoutConfig {
    /// Creates a config; a zero duration means "use the default".
    #[must_use]
    pub fn new(read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            read_timeout,
            write_timeout,
        }
        .normalized()
    }

    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.normalized()
    }

    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self.normalized()
    }

    pub(crate) fn normalized(mut self) -> Self {
        if self.read_timeout.is_zero() {
            self.read_timeout = DEFAULT_READ_TIMEOUT;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = DEFAULT_WRITE_TIMEOUT;
        }
        self
    }
}

/// Terminal status of a pipe run
///
/// A pipe never terminates successfully; the status says why it stopped.
#[derive(Debug, Error)]
pub enum PipeStatus {
    /// Peer closed the stream
    #[error("closed")]
    Closed,

    /// Cancellation observed, or the nozzle consumer went away during teardown
    #[error("canceled")]
    Canceled,

    /// No packet arrived within the read timeout
    #[error("read timeout")]
    ReadTimeout,

    /// The nozzle consumer did not take the packet within the write timeout
    #[error("write timeout")]
    WriteTimeout,

    /// The stream delivered bytes the codec rejected
    #[error(transparent)]
    Codec(CodecError),
}

/// Consumer side of a pipe's output channel
pub type Nozzle = mpsc::Receiver<Packet>;

/// One-direction packet reader: connection read half in, nozzle out
pub struct Pipe {
    reader: ConnectionReader,
    out: mpsc::Sender<Packet>,
    timeouts: TimeoutConfig,
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe").finish_non_exhaustive()
    }
}

impl Pipe {
    /// Creates a pipe over a read half and hands back its nozzle.
    ///
    /// The channel holds a single in-flight packet: backpressure is
    /// immediate, and a stalled consumer trips [`PipeStatus::WriteTimeout`].
    #[must_use]
    pub fn new(reader: ConnectionReader, timeouts: TimeoutConfig) -> (Self, Nozzle) {
        let (out, nozzle) = mpsc::channel(1);
        (
            Self {
                reader,
                out,
                timeouts: timeouts.normalized(),
            },
            nozzle,
        )
    }

    /// Runs the read loop until terminal.
    ///
    /// Publishes a synthetic `Ready` marker, then alternates reading one
    /// framed packet and publishing it. Consuming `self` makes the terminal
    /// state irreversible, and dropping the sender on return closes the
    /// nozzle exactly once.
    pub async fn run(mut self, cancel: CancellationToken) -> PipeStatus {
        let mut body = PacketBody::Ready;

        let status = loop {
            let packet = Packet::published(body, None);

            tokio::select! {
                () = cancel.cancelled() => break PipeStatus::Canceled,
                sent = tokio::time::timeout(self.timeouts.write_timeout, self.out.send(packet)) => {
                    match sent {
                        Err(_elapsed) => break PipeStatus::WriteTimeout,
                        // Receiver dropped: the pairing is tearing down.
                        Ok(Err(_)) => break PipeStatus::Canceled,
                        Ok(Ok(())) => {}
                    }
                }
            }

            match tokio::time::timeout(
                self.timeouts.read_timeout,
                ControlPacket::read(&mut self.reader),
            )
            .await
            {
                Err(_elapsed) => break PipeStatus::ReadTimeout,
                Ok(Err(err)) if err.is_eof() => break PipeStatus::Closed,
                Ok(Err(err)) => break PipeStatus::Codec(err),
                Ok(Ok(packet)) => body = PacketBody::Control(packet),
            }
        };

        tracing::debug!(status = %status, "pipe terminated");
        status
    }
}

//! Packet processors: user-supplied packet interpretation
//!
//! A processor sees every packet its endpoint reads and answers with the
//! packets the core should write, each tagged `Forward` (to the peer) or
//! `Loopback` (back to the sender). The first packet a processor ever sees
//! is the synthetic `Ready` marker, its chance to emit a priming batch.

use crate::error::Result;
use crate::proxy::packet::{Packet, PacketBody, Packets};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Per-packet interpreter for one direction of a pairing
#[async_trait]
pub trait Processor: Send + Sync {
    /// Processes one received packet and returns the packets to emit, in
    /// order. An empty `Packets` emits nothing. Any error terminates this
    /// direction's loop.
    async fn process(&self, cancel: &CancellationToken, packet: Packet) -> Result<Packets>;
}

/// Pass-through processor: logs every packet and forwards it unchanged
///
/// The default interception behavior; custom processors replace this to
/// transform, inject or drop packets.
pub struct ForwardProcessor {
    direction: &'static str,
}

impl ForwardProcessor {
    /// Processor for packets the client sent.
    #[must_use]
    pub fn client() -> Self {
        Self {
            direction: "client",
        }
    }

    /// Processor for packets the broker sent.
    #[must_use]
    pub fn broker() -> Self {
        Self {
            direction: "broker",
        }
    }
}

#[async_trait]
impl Processor for ForwardProcessor {
    async fn process(&self, _cancel: &CancellationToken, packet: Packet) -> Result<Packets> {
        let (body, status, _route) = packet.into_parts();

        if let Some(status) = status {
            debug!(direction = self.direction, error = %status, "read error reported by pipe");
            return Err(status.into());
        }

        match body {
            PacketBody::Ready => {
                debug!(direction = self.direction, "connection ready");
                Ok(Packets::new())
            }
            PacketBody::Control(control) => {
                trace!(direction = self.direction, packet = ?control, "intercepted packet");
                debug!(
                    direction = self.direction,
                    packet_type = ?control.packet_type(),
                    "forwarding packet"
                );

                let mut packets = Packets::new();
                packets.push(Packet::forward(control));
                Ok(packets)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{ConnectPacket, ControlPacket};
    use crate::proxy::packet::Route;

    #[tokio::test]
    async fn test_ready_emits_nothing() {
        let processor = ForwardProcessor::client();
        let ready = Packet::published(PacketBody::Ready, None);
        let emitted = processor
            .process(&CancellationToken::new(), ready)
            .await
            .unwrap();
        assert!(emitted.is_empty());
    }

    #[tokio::test]
    async fn test_control_packet_forwarded() {
        let processor = ForwardProcessor::broker();
        let connect = ControlPacket::Connect(ConnectPacket::new("c1"));
        let inbound = Packet::published(PacketBody::Control(connect.clone()), None);

        let emitted = processor
            .process(&CancellationToken::new(), inbound)
            .await
            .unwrap();

        assert_eq!(emitted.len(), 1);
        let packet = emitted.iter().next().unwrap();
        assert_eq!(packet.route(), Route::Forward);
        assert_eq!(packet.control_packet(), Some(&connect));
    }

    #[tokio::test]
    async fn test_carried_read_error_is_terminal() {
        let processor = ForwardProcessor::client();
        let poisoned = Packet::published(
            PacketBody::Ready,
            Some(crate::proxy::pipe::PipeStatus::Closed),
        );

        let err = processor
            .process(&CancellationToken::new(), poisoned)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ProxyError::Pipe(crate::proxy::pipe::PipeStatus::Closed)
        ));
    }
}

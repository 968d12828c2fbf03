//! QoS acknowledgment packets (PUBACK, PUBREC, PUBREL, PUBCOMP)
//!
//! All four share the same two-byte body: the packet identifier.

use crate::encoding;
use crate::packet::CodecError;
use bytes::{BufMut, Bytes, BytesMut};

macro_rules! ack_packet {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub packet_id: u16,
        }

        impl $name {
            #[must_use]
            pub fn new(packet_id: u16) -> Self {
                Self { packet_id }
            }

            pub(crate) fn decode_body(body: &mut Bytes) -> Result<Self, CodecError> {
                Ok(Self {
                    packet_id: encoding::read_u16(body)?,
                })
            }

            pub(crate) fn encode_body(&self, buf: &mut BytesMut) {
                buf.put_u16(self.packet_id);
            }
        }
    };
}

ack_packet!(
    /// MQTT PUBACK packet (QoS 1 acknowledgment)
    PubAckPacket
);
ack_packet!(
    /// MQTT PUBREC packet (QoS 2, part 1)
    PubRecPacket
);
ack_packet!(
    /// MQTT PUBREL packet (QoS 2, part 2)
    PubRelPacket
);
ack_packet!(
    /// MQTT PUBCOMP packet (QoS 2, part 3)
    PubCompPacket
);

use crate::encoding;
use crate::packet::CodecError;
use bytes::{BufMut, Bytes, BytesMut};

/// MQTT CONNACK packet
///
/// The return code is kept as the raw byte; the proxy never interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub return_code: u8,
}

impl ConnAckPacket {
    #[must_use]
    pub fn accepted(session_present: bool) -> Self {
        Self {
            session_present,
            return_code: 0,
        }
    }

    pub(crate) fn decode_body(body: &mut Bytes) -> Result<Self, CodecError> {
        let ack_flags = encoding::read_u8(body)?;
        let return_code = encoding::read_u8(body)?;
        Ok(Self {
            session_present: ack_flags & 0x01 != 0,
            return_code,
        })
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self.session_present));
        buf.put_u8(self.return_code);
    }
}

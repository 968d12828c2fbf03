use crate::encoding;
use crate::packet::CodecError;
use bytes::{BufMut, Bytes, BytesMut};

/// MQTT UNSUBSCRIBE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<String>,
}

impl UnsubscribePacket {
    pub(crate) fn decode_body(body: &mut Bytes) -> Result<Self, CodecError> {
        let packet_id = encoding::read_u16(body)?;
        let mut filters = Vec::new();
        while !body.is_empty() {
            filters.push(encoding::read_string(body)?);
        }
        if filters.is_empty() {
            return Err(CodecError::MalformedPacket("unsubscribe without filters"));
        }
        Ok(Self { packet_id, filters })
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u16(self.packet_id);
        for filter in &self.filters {
            encoding::write_string(buf, filter);
        }
    }
}

/// MQTT UNSUBACK packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubAckPacket {
    pub packet_id: u16,
}

impl UnsubAckPacket {
    pub(crate) fn decode_body(body: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self {
            packet_id: encoding::read_u16(body)?,
        })
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u16(self.packet_id);
    }
}

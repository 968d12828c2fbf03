use crate::encoding;
use crate::packet::{CodecError, QoS};
use bytes::{BufMut, Bytes, BytesMut};

/// One SUBSCRIBE entry: topic filter plus requested QoS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    pub filter: String,
    pub qos: QoS,
}

/// MQTT SUBSCRIBE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<TopicFilter>,
}

impl SubscribePacket {
    pub(crate) fn decode_body(body: &mut Bytes) -> Result<Self, CodecError> {
        let packet_id = encoding::read_u16(body)?;
        let mut filters = Vec::new();
        while !body.is_empty() {
            filters.push(TopicFilter {
                filter: encoding::read_string(body)?,
                qos: QoS::try_from(encoding::read_u8(body)?)?,
            });
        }
        if filters.is_empty() {
            return Err(CodecError::MalformedPacket("subscribe without filters"));
        }
        Ok(Self { packet_id, filters })
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u16(self.packet_id);
        for entry in &self.filters {
            encoding::write_string(buf, &entry.filter);
            buf.put_u8(entry.qos as u8);
        }
    }
}

/// MQTT SUBACK packet
///
/// Return codes are raw bytes: granted QoS 0-2 or 0x80 for failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<u8>,
}

impl SubAckPacket {
    pub(crate) fn decode_body(body: &mut Bytes) -> Result<Self, CodecError> {
        let packet_id = encoding::read_u16(body)?;
        let return_codes = body.split_to(body.len()).to_vec();
        if return_codes.is_empty() {
            return Err(CodecError::MalformedPacket("suback without return codes"));
        }
        Ok(Self {
            packet_id,
            return_codes,
        })
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u16(self.packet_id);
        buf.extend_from_slice(&self.return_codes);
    }
}

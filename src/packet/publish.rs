use crate::encoding;
use crate::packet::{CodecError, QoS};
use bytes::{BufMut, Bytes, BytesMut};

/// MQTT PUBLISH packet
///
/// DUP, QoS and RETAIN live in the fixed-header flags and are reassembled
/// verbatim on encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    /// Present exactly when `qos > 0`
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: topic.into(),
            packet_id: None,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS, packet_id: u16) -> Self {
        self.qos = qos;
        self.packet_id = (qos != QoS::AtMostOnce).then_some(packet_id);
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }

    pub(crate) fn header_flags(&self) -> u8 {
        let mut flags = (self.qos as u8) << 1;
        if self.dup {
            flags |= 0x08;
        }
        if self.retain {
            flags |= 0x01;
        }
        flags
    }

    pub(crate) fn decode_body(flags: u8, body: &mut Bytes) -> Result<Self, CodecError> {
        let qos = QoS::try_from((flags >> 1) & 0x03)?;
        let topic = encoding::read_string(body)?;
        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            Some(encoding::read_u16(body)?)
        };
        // The rest of the frame is the application payload.
        let payload = body.split_to(body.len());

        Ok(Self {
            dup: flags & 0x08 != 0,
            qos,
            retain: flags & 0x01 != 0,
            topic,
            packet_id,
            payload,
        })
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) {
        encoding::write_string(buf, &self.topic);
        if let Some(packet_id) = self.packet_id {
            buf.put_u16(packet_id);
        }
        buf.extend_from_slice(&self.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos0_has_no_packet_id() {
        let publish = PublishPacket::new("a/b", b"x".as_ref());
        let mut buf = BytesMut::new();
        publish.encode_body(&mut buf);
        let decoded = PublishPacket::decode_body(publish.header_flags(), &mut buf.freeze()).unwrap();
        assert_eq!(decoded.packet_id, None);
        assert_eq!(decoded.payload, Bytes::from_static(b"x"));
    }

    #[test]
    fn test_invalid_qos_rejected() {
        let mut body = Bytes::from_static(&[0x00, 0x01, b'a']);
        // Flags with QoS bits 0b11.
        let err = PublishPacket::decode_body(0x06, &mut body).unwrap_err();
        assert!(matches!(err, CodecError::InvalidQoS(3)));
    }

    #[test]
    fn test_empty_payload_allowed() {
        let publish = PublishPacket::new("retained/clear", Bytes::new()).with_retain(true);
        let mut buf = BytesMut::new();
        publish.encode_body(&mut buf);
        let decoded = PublishPacket::decode_body(publish.header_flags(), &mut buf.freeze()).unwrap();
        assert!(decoded.payload.is_empty());
        assert!(decoded.retain);
    }
}

//! MQTT 3.1.1 Control Packet codec
//!
//! Framing only: the proxy treats packet semantics as opaque and must be
//! bit-transparent, so every decoded packet re-encodes to the bytes it was
//! parsed from. [`ControlPacket::read`] pulls exactly one framed packet off
//! an async byte stream (fixed header byte, variable-length remaining
//! length, body); [`ControlPacket::write`] frames and flushes one packet.

pub mod ack;
pub mod connack;
pub mod connect;
pub mod publish;
pub mod subscribe;
pub mod unsubscribe;

pub use ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket};
pub use connack::ConnAckPacket;
pub use connect::{ConnectPacket, LastWill};
pub use publish::PublishPacket;
pub use subscribe::{SubAckPacket, SubscribePacket, TopicFilter};
pub use unsubscribe::{UnsubAckPacket, UnsubscribePacket};

use crate::encoding;
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("malformed remaining length")]
    MalformedRemainingLength,

    #[error("malformed UTF-8 string")]
    MalformedString,

    #[error("invalid QoS: {0}")]
    InvalidQoS(u8),

    #[error("payload too large: {0}")]
    PayloadTooLarge(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True when the error means the peer closed the stream rather than
    /// sending malformed input.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

/// Quality of service level
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            qos => Err(CodecError::InvalidQoS(qos)),
        }
    }
}

/// MQTT control packet type (high nibble of the fixed header)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Connect),
            2 => Some(Self::ConnAck),
            3 => Some(Self::Publish),
            4 => Some(Self::PubAck),
            5 => Some(Self::PubRec),
            6 => Some(Self::PubRel),
            7 => Some(Self::PubComp),
            8 => Some(Self::Subscribe),
            9 => Some(Self::SubAck),
            10 => Some(Self::Unsubscribe),
            11 => Some(Self::UnsubAck),
            12 => Some(Self::PingReq),
            13 => Some(Self::PingResp),
            14 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// One framed MQTT 3.1.1 control packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPacket {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect,
}

impl ControlPacket {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnAck(_) => PacketType::ConnAck,
            Self::Publish(_) => PacketType::Publish,
            Self::PubAck(_) => PacketType::PubAck,
            Self::PubRec(_) => PacketType::PubRec,
            Self::PubRel(_) => PacketType::PubRel,
            Self::PubComp(_) => PacketType::PubComp,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubAck(_) => PacketType::SubAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubAck(_) => PacketType::UnsubAck,
            Self::PingReq => PacketType::PingReq,
            Self::PingResp => PacketType::PingResp,
            Self::Disconnect => PacketType::Disconnect,
        }
    }

    /// Reads exactly one framed control packet from the stream.
    ///
    /// # Errors
    ///
    /// Returns an error on end of stream ([`CodecError::is_eof`]), malformed
    /// framing, or an unparseable body.
    pub async fn read<R>(reader: &mut R) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin,
    {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).await?;
        let packet_type = PacketType::from_u8(byte[0] >> 4)
            .ok_or(CodecError::InvalidPacketType(byte[0] >> 4))?;
        let flags = byte[0] & 0x0F;

        // Remaining length: 1-4 bytes, 7 value bits each.
        let mut remaining: usize = 0;
        let mut shift = 0;
        loop {
            reader.read_exact(&mut byte).await?;
            remaining |= usize::from(byte[0] & 0x7F) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 21 {
                return Err(CodecError::MalformedRemainingLength);
            }
        }

        let mut body = vec![0u8; remaining];
        reader.read_exact(&mut body).await?;

        Self::decode(packet_type, flags, Bytes::from(body))
    }

    /// Frames and writes one control packet, flushing the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the underlying write fails.
    pub async fn write<W>(&self, writer: &mut W) -> Result<(), CodecError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Encodes the full frame (fixed header + body) into `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the body exceeds the MQTT remaining-length limit.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let mut body = BytesMut::new();
        match self {
            Self::Connect(p) => p.encode_body(&mut body),
            Self::ConnAck(p) => p.encode_body(&mut body),
            Self::Publish(p) => p.encode_body(&mut body),
            Self::PubAck(p) => p.encode_body(&mut body),
            Self::PubRec(p) => p.encode_body(&mut body),
            Self::PubRel(p) => p.encode_body(&mut body),
            Self::PubComp(p) => p.encode_body(&mut body),
            Self::Subscribe(p) => p.encode_body(&mut body),
            Self::SubAck(p) => p.encode_body(&mut body),
            Self::Unsubscribe(p) => p.encode_body(&mut body),
            Self::UnsubAck(p) => p.encode_body(&mut body),
            Self::PingReq | Self::PingResp | Self::Disconnect => {}
        }

        buf.put_u8(self.type_and_flags());
        encoding::write_remaining_length(buf, body.len())?;
        buf.extend_from_slice(&body);
        Ok(())
    }

    fn type_and_flags(&self) -> u8 {
        let flags = match self {
            Self::Publish(p) => p.header_flags(),
            // PUBREL, SUBSCRIBE and UNSUBSCRIBE carry fixed flags 0b0010.
            Self::PubRel(_) | Self::Subscribe(_) | Self::Unsubscribe(_) => 0x02,
            _ => 0x00,
        };
        ((self.packet_type() as u8) << 4) | flags
    }

    fn decode(packet_type: PacketType, flags: u8, mut body: Bytes) -> Result<Self, CodecError> {
        let packet = match packet_type {
            PacketType::Connect => Self::Connect(ConnectPacket::decode_body(&mut body)?),
            PacketType::ConnAck => Self::ConnAck(ConnAckPacket::decode_body(&mut body)?),
            PacketType::Publish => Self::Publish(PublishPacket::decode_body(flags, &mut body)?),
            PacketType::PubAck => Self::PubAck(PubAckPacket::decode_body(&mut body)?),
            PacketType::PubRec => Self::PubRec(PubRecPacket::decode_body(&mut body)?),
            PacketType::PubRel => Self::PubRel(PubRelPacket::decode_body(&mut body)?),
            PacketType::PubComp => Self::PubComp(PubCompPacket::decode_body(&mut body)?),
            PacketType::Subscribe => Self::Subscribe(SubscribePacket::decode_body(&mut body)?),
            PacketType::SubAck => Self::SubAck(SubAckPacket::decode_body(&mut body)?),
            PacketType::Unsubscribe => {
                Self::Unsubscribe(UnsubscribePacket::decode_body(&mut body)?)
            }
            PacketType::UnsubAck => Self::UnsubAck(UnsubAckPacket::decode_body(&mut body)?),
            PacketType::PingReq => Self::PingReq,
            PacketType::PingResp => Self::PingResp,
            PacketType::Disconnect => Self::Disconnect,
        };

        if !body.is_empty() {
            return Err(CodecError::MalformedPacket("trailing bytes after body"));
        }

        Ok(packet)
    }
}

use crate::encoding;
use crate::packet::{CodecError, QoS};
use bytes::{BufMut, Bytes, BytesMut};

/// MQTT CONNECT packet
///
/// Protocol name and level are carried as parsed so that 3.1 (`MQIsdp`,
/// level 3) sessions pass through the proxy untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub protocol_name: String,
    pub protocol_level: u8,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<LastWill>,
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

/// Will message advertised in CONNECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            protocol_name: "MQTT".to_string(),
            protocol_level: 4,
            clean_session: true,
            keep_alive: 60,
            client_id: client_id.into(),
            will: None,
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<Bytes>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: u16) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: LastWill) -> Self {
        self.will = Some(will);
        self
    }

    pub(crate) fn decode_body(body: &mut Bytes) -> Result<Self, CodecError> {
        let protocol_name = encoding::read_string(body)?;
        let protocol_level = encoding::read_u8(body)?;
        let flags = encoding::read_u8(body)?;
        let keep_alive = encoding::read_u16(body)?;
        let client_id = encoding::read_string(body)?;

        let will = if flags & 0x04 != 0 {
            Some(LastWill {
                topic: encoding::read_string(body)?,
                message: encoding::read_bytes(body)?,
                qos: QoS::try_from((flags >> 3) & 0x03)?,
                retain: flags & 0x20 != 0,
            })
        } else if flags & 0x38 != 0 {
            return Err(CodecError::MalformedPacket("will flags without will"));
        } else {
            None
        };

        let username = if flags & 0x80 != 0 {
            Some(encoding::read_string(body)?)
        } else {
            None
        };
        let password = if flags & 0x40 != 0 {
            Some(encoding::read_bytes(body)?)
        } else {
            None
        };

        Ok(Self {
            protocol_name,
            protocol_level,
            clean_session: flags & 0x02 != 0,
            keep_alive,
            client_id,
            will,
            username,
            password,
        })
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) {
        encoding::write_string(buf, &self.protocol_name);
        buf.put_u8(self.protocol_level);

        let mut flags = 0u8;
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04 | ((will.qos as u8) << 3);
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        buf.put_u8(flags);
        buf.put_u16(self.keep_alive);

        encoding::write_string(buf, &self.client_id);
        if let Some(will) = &self.will {
            encoding::write_string(buf, &will.topic);
            encoding::write_bytes(buf, &will.message);
        }
        if let Some(username) = &self.username {
            encoding::write_string(buf, username);
        }
        if let Some(password) = &self.password {
            encoding::write_bytes(buf, password);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_will_flags_without_will_rejected() {
        let mut body = BytesMut::new();
        encoding::write_string(&mut body, "MQTT");
        body.put_u8(4);
        // Will QoS bits set, will flag clear.
        body.put_u8(0x18);
        body.put_u16(60);
        encoding::write_string(&mut body, "c1");

        let err = ConnectPacket::decode_body(&mut body.freeze()).unwrap_err();
        assert!(matches!(err, CodecError::MalformedPacket(_)));
    }

    #[test]
    fn test_will_round_trip() {
        let connect = ConnectPacket::new("c1").with_will(LastWill {
            topic: "status/c1".to_string(),
            message: Bytes::from_static(b"offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        });

        let mut buf = BytesMut::new();
        connect.encode_body(&mut buf);
        let decoded = ConnectPacket::decode_body(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, connect);
    }
}

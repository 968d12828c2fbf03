//! Wire-level primitives shared by the packet codec
//!
//! MQTT 3.1.1 encodes strings and binary blobs with a big-endian u16 length
//! prefix, and the fixed-header remaining length as a 1-4 byte variable
//! integer (7 value bits per byte, high bit as continuation).

use crate::packet::CodecError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maximum value encodable as a remaining-length variable integer (268,435,455)
pub const REMAINING_LENGTH_MAX: usize = 268_435_455;

pub(crate) fn read_u8(buf: &mut Bytes) -> Result<u8, CodecError> {
    if buf.is_empty() {
        return Err(CodecError::MalformedPacket("unexpected end of body"));
    }
    Ok(buf.get_u8())
}

pub(crate) fn read_u16(buf: &mut Bytes) -> Result<u16, CodecError> {
    if buf.len() < 2 {
        return Err(CodecError::MalformedPacket("unexpected end of body"));
    }
    Ok(buf.get_u16())
}

/// Reads a u16-length-prefixed byte blob.
pub(crate) fn read_bytes(buf: &mut Bytes) -> Result<Bytes, CodecError> {
    let len = read_u16(buf)? as usize;
    if len > buf.len() {
        return Err(CodecError::MalformedPacket("length prefix exceeds body"));
    }
    Ok(buf.split_to(len))
}

/// Reads a u16-length-prefixed UTF-8 string.
pub(crate) fn read_string(buf: &mut Bytes) -> Result<String, CodecError> {
    let raw = read_bytes(buf)?;
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::MalformedString)
}

pub(crate) fn write_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u16(bytes.len() as u16);
    buf.extend_from_slice(bytes);
}

pub(crate) fn write_string(buf: &mut BytesMut, string: &str) {
    write_bytes(buf, string.as_bytes());
}

/// Encodes a remaining-length variable integer.
pub(crate) fn write_remaining_length(buf: &mut BytesMut, len: usize) -> Result<(), CodecError> {
    if len > REMAINING_LENGTH_MAX {
        return Err(CodecError::PayloadTooLarge(len));
    }

    let mut x = len;
    loop {
        let mut byte = (x % 128) as u8;
        x /= 128;
        if x > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if x == 0 {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_length_boundaries() {
        let cases: &[(usize, &[u8])] = &[
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (16_383, &[0xFF, 0x7F]),
            (16_384, &[0x80, 0x80, 0x01]),
            (2_097_151, &[0xFF, 0xFF, 0x7F]),
            (2_097_152, &[0x80, 0x80, 0x80, 0x01]),
            (REMAINING_LENGTH_MAX, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];

        for (value, expected) in cases {
            let mut buf = BytesMut::new();
            write_remaining_length(&mut buf, *value).unwrap();
            assert_eq!(&buf[..], *expected, "encoding of {value}");
        }
    }

    #[test]
    fn test_remaining_length_too_large() {
        let mut buf = BytesMut::new();
        let err = write_remaining_length(&mut buf, REMAINING_LENGTH_MAX + 1).unwrap_err();
        assert!(matches!(err, CodecError::PayloadTooLarge(_)));
    }

    #[test]
    fn test_string_round_trip() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "sensors/temp");
        let mut bytes = buf.freeze();
        assert_eq!(read_string(&mut bytes).unwrap(), "sensors/temp");
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_truncated_string_rejected() {
        let mut bytes = Bytes::from_static(&[0x00, 0x05, b'a', b'b']);
        assert!(read_string(&mut bytes).is_err());
    }
}

//! Cast v2 message framing.
//!
//! Every message is a 4 byte big-endian length followed by a `CastMessage`
//! protobuf. Only the string payload form is produced or understood.

use thiserror::Error;

/// Protocol version field value for CASTV2_1_0
const PROTOCOL_VERSION: u64 = 0;
/// Payload type field value for STRING
const PAYLOAD_TYPE_STRING: u64 = 0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too large: {0} bytes")]
    TooLarge(usize),

    #[error("Truncated varint at byte {0}")]
    BadVarint(usize),

    #[error("Field {field} runs past the end of the frame")]
    OutOfBounds { field: u32 },

    #[error("Field {field} is not valid UTF-8")]
    InvalidUtf8 { field: u32 },

    #[error("Unsupported wire type {0}")]
    UnsupportedWireType(u8),
}

/// One decoded message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CastFrame {
    pub source_id: String,
    pub destination_id: String,
    pub namespace: String,
    pub payload: String,
}

impl CastFrame {
    #[must_use]
    pub fn new(source_id: &str, destination_id: &str, namespace: &str, payload: String) -> Self {
        Self {
            source_id: source_id.to_string(),
            destination_id: destination_id.to_string(),
            namespace: namespace.to_string(),
            payload,
        }
    }

    /// Serialize with the length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] if the body does not fit a u32 length.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut body = Vec::with_capacity(self.payload.len() + 96);
        write_varint_field(&mut body, 1, PROTOCOL_VERSION);
        write_string_field(&mut body, 2, &self.source_id);
        write_string_field(&mut body, 3, &self.destination_id);
        write_string_field(&mut body, 4, &self.namespace);
        write_varint_field(&mut body, 5, PAYLOAD_TYPE_STRING);
        write_string_field(&mut body, 6, &self.payload);

        let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge(body.len()))?;
        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Parse a frame body, without the length prefix. Unknown fields are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed varints, out of range lengths, invalid
    /// UTF-8 in a known string field, and wire types other than varint and
    /// length-delimited.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut frame = Self::default();
        let mut cursor = 0usize;

        while cursor < bytes.len() {
            let key = read_varint(bytes, &mut cursor)?;
            let field = u32::try_from(key >> 3).unwrap_or(u32::MAX);
            match key & 0x07 {
                0 => {
                    read_varint(bytes, &mut cursor)?;
                }
                2 => {
                    let len = usize::try_from(read_varint(bytes, &mut cursor)?)
                        .map_err(|_| FrameError::OutOfBounds { field })?;
                    let end = cursor
                        .checked_add(len)
                        .filter(|end| *end <= bytes.len())
                        .ok_or(FrameError::OutOfBounds { field })?;
                    let raw = &bytes[cursor..end];
                    cursor = end;
                    let slot = match field {
                        2 => &mut frame.source_id,
                        3 => &mut frame.destination_id,
                        4 => &mut frame.namespace,
                        6 => &mut frame.payload,
                        _ => continue,
                    };
                    *slot = String::from_utf8(raw.to_vec())
                        .map_err(|_| FrameError::InvalidUtf8 { field })?;
                }
                other => {
                    return Err(FrameError::UnsupportedWireType(
                        u8::try_from(other).unwrap_or(u8::MAX),
                    ));
                }
            }
        }
        Ok(frame)
    }
}

fn write_varint_field(out: &mut Vec<u8>, field: u32, value: u64) {
    write_varint(out, u64::from(field) << 3);
    write_varint(out, value);
}

fn write_string_field(out: &mut Vec<u8>, field: u32, value: &str) {
    write_varint(out, (u64::from(field) << 3) | 2);
    write_varint(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        #[allow(clippy::cast_possible_truncation)] // masked to 7 bits
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(bytes: &[u8], cursor: &mut usize) -> Result<u64, FrameError> {
    let start = *cursor;
    let mut value = 0u64;
    let mut shift = 0u32;
    while let Some(&byte) = bytes.get(*cursor) {
        *cursor += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            break;
        }
    }
    Err(FrameError::BadVarint(start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = CastFrame::new("sender-0", "receiver-0", "urn:x-cast:test", "{}".into());
        let bytes = frame.encode().unwrap();
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(len, u32::try_from(bytes.len() - 4).unwrap());
        // protocol_version = 0
        assert_eq!(&bytes[4..6], &[0x08, 0x00]);
        // source_id, length delimited
        assert_eq!(bytes[6], 0x12);
        assert_eq!(usize::from(bytes[7]), "sender-0".len());
        assert_eq!(CastFrame::decode(&bytes[4..]).unwrap(), frame);
    }

    #[test]
    fn test_long_payload_uses_multibyte_length() {
        let payload = "x".repeat(300);
        let frame = CastFrame::new("a", "b", "c", payload.clone());
        let bytes = frame.encode().unwrap();
        assert_eq!(CastFrame::decode(&bytes[4..]).unwrap().payload, payload);
    }

    #[test]
    fn test_unknown_fields_skipped() {
        let mut body = Vec::new();
        write_varint_field(&mut body, 9, 42);
        write_string_field(&mut body, 12, "ignored");
        write_string_field(&mut body, 4, "urn:x-cast:ns");
        let frame = CastFrame::decode(&body).unwrap();
        assert_eq!(frame.namespace, "urn:x-cast:ns");
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert_eq!(CastFrame::decode(&[0x80]), Err(FrameError::BadVarint(0)));
        assert_eq!(
            CastFrame::decode(&[0x32, 0x05, b'a']),
            Err(FrameError::OutOfBounds { field: 6 })
        );
        assert_eq!(
            CastFrame::decode(&[0x0d, 0, 0, 0, 0]),
            Err(FrameError::UnsupportedWireType(5))
        );
        assert_eq!(
            CastFrame::decode(&[0x22, 0x01, 0xff]),
            Err(FrameError::InvalidUtf8 { field: 4 })
        );
    }
}

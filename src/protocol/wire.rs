//! Wire format for the frame prefix.
//!
//! Every message travels in exactly one frame:
//! ```text
//! ┌──────────────────┬──────────────────┬────────┬────────────────┐
//! │ FRAME LENGTH (4) │ MAGIC NUMBER (4) │ ID (1) │ MESSAGE BODY   │
//! │ uint32 BE        │ 0xBADC0FFE       │ uint8  │                │
//! └──────────────────┴──────────────────┴────────┴────────────────┘
//! ```
//!
//! The frame length counts all four fields, including itself.
//! All multi-byte integers are Big Endian.

use bytes::{Buf, BufMut};

use crate::error::{Result, ShuffleError};

/// Frame prefix size in bytes: length (4) + magic (4) + message id (1).
pub const FRAME_PREFIX_LENGTH: usize = 9;

/// Magic number marking the start of every frame.
pub const MAGIC_NUMBER: u32 = 0xBADC_0FFE;

/// Maximum frame length (max i32); the length field is never negative
/// when read as a signed 32-bit integer.
pub const MAX_FRAME_LENGTH: u32 = i32::MAX as u32;

/// Decoded frame prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePrefix {
    /// Total frame length, including the length field itself.
    pub frame_length: u32,
    /// Message id selecting the catalog decoder.
    pub msg_id: u8,
}

impl FramePrefix {
    /// Create a prefix for a frame whose body is `body_length` bytes.
    pub fn for_body(msg_id: u8, body_length: usize) -> Self {
        Self {
            frame_length: (FRAME_PREFIX_LENGTH + body_length) as u32,
            msg_id,
        }
    }

    /// Length of the message body following the prefix.
    #[inline]
    pub fn body_length(&self) -> usize {
        self.frame_length as usize - FRAME_PREFIX_LENGTH
    }

    /// Write the prefix (length, magic, id) to a buffer.
    pub fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.frame_length);
        buf.put_u32(MAGIC_NUMBER);
        buf.put_u8(self.msg_id);
    }

    /// Read and validate the magic number and message id, the frame
    /// length having already been consumed by the length-field reader.
    ///
    /// # Errors
    ///
    /// Returns [`ShuffleError::StreamCorrupted`] when the magic number
    /// does not match.
    pub fn read_after_length(frame_length: u32, buf: &mut impl Buf) -> Result<Self> {
        let magic = buf.get_u32();
        if magic != MAGIC_NUMBER {
            return Err(ShuffleError::StreamCorrupted(format!(
                "received incorrect magic number: 0x{magic:08X}"
            )));
        }
        let msg_id = buf.get_u8();
        Ok(Self {
            frame_length,
            msg_id,
        })
    }
}

/// Validate a frame length read off the wire.
///
/// A frame can never be shorter than its own prefix, and the length field
/// is a non-negative signed 32-bit integer on the wire.
pub fn validate_frame_length(frame_length: u32) -> Result<()> {
    if frame_length < FRAME_PREFIX_LENGTH as u32 {
        return Err(ShuffleError::StreamCorrupted(format!(
            "frame length {frame_length} is shorter than the frame prefix"
        )));
    }
    if frame_length > MAX_FRAME_LENGTH {
        return Err(ShuffleError::StreamCorrupted(format!(
            "frame length {frame_length} exceeds maximum {MAX_FRAME_LENGTH}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_prefix_byte_layout() {
        let prefix = FramePrefix::for_body(5, 0);
        let mut buf = BytesMut::new();
        prefix.write_to(&mut buf);

        // 9-byte frame: length, magic, id
        assert_eq!(
            &buf[..],
            &[0x00, 0x00, 0x00, 0x09, 0xBA, 0xDC, 0x0F, 0xFE, 0x05]
        );
    }

    #[test]
    fn test_prefix_roundtrip() {
        let prefix = FramePrefix::for_body(11, 100);
        let mut buf = BytesMut::new();
        prefix.write_to(&mut buf);

        let mut read = buf.freeze();
        let frame_length = read.get_u32();
        let decoded = FramePrefix::read_after_length(frame_length, &mut read).unwrap();

        assert_eq!(decoded, prefix);
        assert_eq!(decoded.body_length(), 100);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(0xDEAD_BEEF);
        buf.put_u8(5);

        let result = FramePrefix::read_after_length(9, &mut buf);
        assert!(matches!(result, Err(ShuffleError::StreamCorrupted(_))));
    }

    #[test]
    fn test_frame_length_bounds() {
        assert!(validate_frame_length(FRAME_PREFIX_LENGTH as u32).is_ok());
        assert!(validate_frame_length(MAX_FRAME_LENGTH).is_ok());

        assert!(validate_frame_length(8).is_err());
        assert!(validate_frame_length(0).is_err());
        assert!(validate_frame_length(MAX_FRAME_LENGTH + 1).is_err());
    }

    #[test]
    fn test_magic_number_value() {
        assert_eq!(MAGIC_NUMBER, 0xBADC0FFE);
        assert_eq!(FRAME_PREFIX_LENGTH, 9);
    }
}

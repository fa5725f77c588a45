//! Raw event codec - pass-through for pre-serialized events.
//!
//! Used when the event bytes come from an external serializer and only
//! need to be carried. Zero-copy where possible.

use bytes::Bytes;

/// Pass-through codec: the serialized form is the event itself.
pub struct RawEventCodec;

impl RawEventCodec {
    /// Serialize raw event bytes (copies into `Bytes`).
    ///
    /// For zero-copy, use [`RawEventCodec::to_serialized_bytes`] with an
    /// existing `Bytes` value.
    #[inline]
    pub fn to_serialized(event: &[u8]) -> Bytes {
        Bytes::copy_from_slice(event)
    }

    /// Serialize `Bytes` (zero-copy; returns the input).
    #[inline]
    pub fn to_serialized_bytes(event: Bytes) -> Bytes {
        event
    }

    /// Deserialize - the bytes are the event (zero-copy).
    #[inline]
    pub fn from_serialized(bytes: &Bytes) -> &[u8] {
        bytes
    }
}

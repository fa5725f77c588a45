//! MsgPack event codec using `rmp-serde`.
//!
//! Serializes typed task events into the opaque blob carried by
//! `TaskEventRequest`. Uses `to_vec_named` so structs travel as maps
//! with field names, which keeps the blob readable by peers that look
//! events up by field rather than by position.

use bytes::Bytes;

use crate::error::Result;

/// MessagePack codec for typed task events.
pub struct MsgPackEventCodec;

impl MsgPackEventCodec {
    /// Serialize an event into the on-wire blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    #[inline]
    pub fn to_serialized<T: serde::Serialize>(event: &T) -> Result<Bytes> {
        Ok(Bytes::from(rmp_serde::to_vec_named(event)?))
    }

    /// Deserialize an event from the on-wire blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be deserialized to `T`;
    /// callers report this as a channel-level failure, not a connection
    /// error.
    #[inline]
    pub fn from_serialized<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

//! Event codecs - serialization for opaque task event blobs.
//!
//! The wire carries task events as raw bytes inside `TaskEventRequest`;
//! the protocol never inspects them. These codecs sit at the edge where
//! an application turns its typed events into those bytes and back:
//!
//! - [`RawEventCodec`] - pass-through for pre-serialized events
//! - [`MsgPackEventCodec`] - MessagePack via `rmp-serde` for typed events
//!
//! Codecs are marker structs with static methods rather than trait
//! objects, so codec choice is made at compile time and the raw path
//! stays zero-copy.

mod msgpack;
mod raw;

pub use msgpack::MsgPackEventCodec;
pub use raw::RawEventCodec;

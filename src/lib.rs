//! # shufflewire
//!
//! Credit-based shuffle wire protocol for the data plane between
//! producing and consuming workers of a distributed stream/batch
//! processing engine.
//!
//! One long-lived connection multiplexes many logical channels. Frames
//! are length-delimited with a magic number and a message id byte;
//! payload buffers travel zero-copy next to their headers; and a strict
//! credit contract governs when data may flow: the consumer grants
//! credits (pre-allocated buffers), each `BufferResponse` consumes one,
//! and a producer with no credit pauses until more arrive.
//!
//! ## Architecture
//!
//! - **Decode**: feed raw socket bytes to [`protocol::MessageDecoder`];
//!   it yields whole [`protocol::Message`]s, binding payload buffers
//!   through the external [`buffer::BufferAllocator`].
//! - **Dispatch**: a [`handler::ChannelRegistry`] routes each message by
//!   its receiver id to the channel's [`handler::ChannelHandler`].
//! - **Encode**: [`protocol::MessageEncoder`] turns messages into
//!   [`protocol::OutboundFrame`]s; the [`writer`] task flushes them with
//!   vectored writes and returns every payload to its pool exactly once.
//! - **Flow**: [`credit::ConnectionFlow`] enforces the credit contract
//!   per channel; violations are fatal to the connection.
//!
//! The outer I/O loop, connection establishment and reconnect policy
//! live outside this crate; so does the buffer pool, consumed through
//! the allocator seam.
//!
//! ## Example
//!
//! ```
//! use shufflewire::protocol::{
//!     AddCredit, ChannelId, Message, MessageDecoder, MessageEncoder,
//! };
//! use shufflewire::buffer::UnpooledAllocator;
//! use std::sync::Arc;
//!
//! let mut encoder = MessageEncoder::new();
//! let frame = encoder
//!     .encode(Message::AddCredit(AddCredit {
//!         credit: 4,
//!         receiver_id: ChannelId::from(7u128),
//!     }))
//!     .unwrap();
//!
//! let mut decoder = MessageDecoder::new(Arc::new(UnpooledAllocator::default()));
//! let messages = decoder.push(&frame.header).unwrap();
//! assert!(matches!(messages[0], Message::AddCredit(_)));
//! ```

pub mod buffer;
pub mod codec;
pub mod credit;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod writer;

pub use error::{Result, ShuffleError};

//! Handler module - routing decoded messages to channel owners.
//!
//! After decode, a [`ChannelRegistry`] routes each message by its
//! `receiver_id` to the [`ChannelHandler`] registered for that channel.
//! Connection-scoped messages (`CloseRequest`, fatal `ErrorResponse`s)
//! are handed back to the connection owner.

mod registry;

pub use registry::{ChannelHandler, ChannelRegistry, Dispatch};

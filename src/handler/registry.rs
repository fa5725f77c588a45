//! Channel registry: per-channel dispatch by receiver id.
//!
//! Error scoping rules:
//!
//! - a fatal `ErrorResponse` (no receiver id) is delivered to every
//!   registered channel, then reported so the owner tears the
//!   connection down;
//! - a per-channel `ErrorResponse` reaches only the named channel;
//! - a handler failing with a recoverable error poisons its own channel
//!   only - the failure is delivered back to that channel and the
//!   connection keeps running;
//! - messages for unknown (released) channels are dropped; an attached
//!   payload buffer goes straight back to its pool.

use std::collections::HashMap;

use crate::error::Result;
use crate::protocol::{ChannelId, ErrorCause, Message};

/// Receives the messages routed to one channel.
///
/// A handler owns every `Buffer` inside the messages it accepts and
/// must eventually recycle them.
pub trait ChannelHandler: Send {
    /// A message addressed to this channel.
    fn on_message(&mut self, message: Message) -> Result<()>;

    /// A failure scoped to this channel (remote error or local decode
    /// failure).
    fn on_failure(&mut self, cause: &ErrorCause);
}

/// Outcome of dispatching one decoded message.
#[derive(Debug)]
pub enum Dispatch {
    /// Delivered to its channel handler.
    Delivered,
    /// Connection-scoped message handed back to the connection owner.
    Connection(Message),
    /// Fatal remote error: every channel was notified, the connection
    /// must be torn down.
    FatalError(ErrorCause),
    /// The target channel is gone; the message was dropped and any
    /// payload recycled.
    DroppedUnknownChannel(ChannelId),
}

/// Routes decoded messages to channel-level handlers.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<ChannelId, Box<dyn ChannelHandler>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a channel.
    pub fn register(&mut self, channel: ChannelId, handler: Box<dyn ChannelHandler>) {
        self.channels.insert(channel, handler);
    }

    /// Release a channel; later messages for it are dropped.
    pub fn release(&mut self, channel: ChannelId) -> Option<Box<dyn ChannelHandler>> {
        self.channels.remove(&channel)
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        self.channels.contains_key(&channel)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Deliver a failure to every registered channel (stream corruption,
    /// transport loss): each channel learns before the connection dies.
    pub fn broadcast_failure(&mut self, cause: &ErrorCause) {
        for handler in self.channels.values_mut() {
            handler.on_failure(cause);
        }
    }

    /// Route one decoded message.
    ///
    /// # Errors
    ///
    /// Only fatal handler errors propagate; recoverable ones are
    /// delivered to the owning channel as failures and dispatch reports
    /// `Delivered`.
    pub fn dispatch(&mut self, message: Message) -> Result<Dispatch> {
        let message = match message {
            Message::ErrorResponse(response) => {
                return Ok(match response.receiver_id {
                    None => {
                        self.broadcast_failure(&response.cause);
                        Dispatch::FatalError(response.cause)
                    }
                    Some(receiver_id) => match self.channels.get_mut(&receiver_id) {
                        Some(handler) => {
                            handler.on_failure(&response.cause);
                            Dispatch::Delivered
                        }
                        None => Dispatch::DroppedUnknownChannel(receiver_id),
                    },
                });
            }
            other => other,
        };

        let Some(receiver_id) = message.receiver_id() else {
            return Ok(Dispatch::Connection(message));
        };

        let Some(handler) = self.channels.get_mut(&receiver_id) else {
            tracing::warn!(
                channel = %receiver_id,
                msg_id = message.msg_id(),
                "dropping message for released channel"
            );
            // Dropping the message recycles any attached buffer.
            return Ok(Dispatch::DroppedUnknownChannel(receiver_id));
        };

        match handler.on_message(message) {
            Ok(()) => Ok(Dispatch::Delivered),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                // Channel-level failure: contain it to this channel.
                let cause = ErrorCause::new("DecodeFailure", err.to_string(), "");
                handler.on_failure(&cause);
                Ok(Dispatch::Delivered)
            }
        }
    }
}

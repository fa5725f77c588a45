//! Credit-based flow control for data channels.
//!
//! Credit is the number of buffers the consumer has pre-allocated for a
//! channel. Every `BufferResponse` - including a size-0 one - consumes
//! exactly one credit; `AddCredit` replenishes it. A producer with zero
//! remaining credit must pause the channel, and emitting anyway is a
//! contract violation that kills the connection.
//!
//! [`ChannelFlow`] is the per-channel producer-side state machine;
//! [`ConnectionFlow`] tracks every channel multiplexed on one
//! connection. Both are plain single-owner state: all flow accounting
//! for a connection happens on its own executor, so there are no locks
//! or atomics on this path. Credit exhaustion pauses the producer's
//! business logic upstream of the codec, never the event loop itself.

use std::collections::HashMap;

use crate::buffer::DataType;
use crate::error::{Result, ShuffleError};
use crate::protocol::{ChannelId, Message, PartitionRequest};

/// Why a channel is currently not allowed to emit data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// No credit remains; waiting for `AddCredit`.
    AwaitingCredit,
    /// An unaligned checkpoint barrier went out; waiting for
    /// `ResumeConsumption`.
    AwaitingResume,
}

/// End-of-stream progression of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    /// The end-of-data marker went out; waiting for the consumer's ack.
    EndOfDataSent,
    /// Consumer acked all user records; the channel may close.
    AllRecordsAcked,
}

/// Producer-side flow state for one channel.
#[derive(Debug)]
pub struct ChannelFlow {
    credit: u32,
    next_sequence: u32,
    buffer_size: u32,
    awaiting_resume: bool,
    phase: Phase,
}

impl ChannelFlow {
    /// Default production buffer size until the consumer requests
    /// another via `NewBufferSize`.
    pub const DEFAULT_BUFFER_SIZE: u32 = 32 * 1024;

    /// Open a channel with the initial credit from a `PartitionRequest`.
    pub fn open(initial_credit: u32) -> Self {
        Self {
            credit: initial_credit,
            next_sequence: 0,
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            awaiting_resume: false,
            phase: Phase::Streaming,
        }
    }

    /// Remaining credit.
    #[inline]
    pub fn credit(&self) -> u32 {
        self.credit
    }

    /// Sequence number the next emitted `BufferResponse` will carry.
    #[inline]
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Buffer size the producer should use for the next pooled buffer it
    /// allocates for this channel.
    #[inline]
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Why the channel cannot emit right now, if anything.
    pub fn pause_reason(&self) -> Option<PauseReason> {
        if self.awaiting_resume {
            Some(PauseReason::AwaitingResume)
        } else if self.credit == 0 {
            Some(PauseReason::AwaitingCredit)
        } else {
            None
        }
    }

    /// Whether a `BufferResponse` may be emitted right now.
    pub fn can_emit(&self) -> bool {
        self.pause_reason().is_none()
    }

    /// Grant credit from an `AddCredit` message.
    pub fn add_credit(&mut self, credit: u32) -> Result<()> {
        if credit == 0 {
            return Err(ShuffleError::ContractViolation(
                "credit grant must be positive".into(),
            ));
        }
        self.credit += credit;
        Ok(())
    }

    /// Account for emitting one `BufferResponse` of the given kind and
    /// return the sequence number it must carry.
    ///
    /// # Errors
    ///
    /// [`ShuffleError::ContractViolation`] when no credit remains or the
    /// channel is paused behind an unacknowledged barrier.
    pub fn try_emit(&mut self, data_type: DataType) -> Result<u32> {
        if self.awaiting_resume {
            return Err(ShuffleError::ContractViolation(
                "channel is paused until the consumer resumes consumption".into(),
            ));
        }
        if self.credit == 0 {
            return Err(ShuffleError::ContractViolation(
                "must not emit a buffer with zero remaining credit".into(),
            ));
        }

        self.credit -= 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if data_type.pauses_channel() {
            self.awaiting_resume = true;
        }
        if data_type.is_end_of_data() {
            self.phase = Phase::EndOfDataSent;
        }
        Ok(sequence)
    }

    /// Consumer resumed after an unaligned barrier.
    pub fn resume(&mut self) {
        self.awaiting_resume = false;
    }

    /// Consumer confirmed it processed every preceding user record.
    pub fn ack_all_records(&mut self) {
        if self.phase == Phase::EndOfDataSent {
            self.phase = Phase::AllRecordsAcked;
        }
    }

    /// Whether the end-of-stream protocol completed and the channel may
    /// be closed by the producer.
    pub fn can_close(&self) -> bool {
        self.phase == Phase::AllRecordsAcked
    }

    /// Consumer requested a new production buffer size.
    pub fn update_buffer_size(&mut self, buffer_size: u32) -> Result<()> {
        if buffer_size == 0 {
            return Err(ShuffleError::ContractViolation(
                "new buffer size must be positive".into(),
            ));
        }
        self.buffer_size = buffer_size;
        Ok(())
    }
}

/// Flow state for every channel multiplexed on one connection,
/// producer side.
#[derive(Debug, Default)]
pub struct ConnectionFlow {
    channels: HashMap<ChannelId, ChannelFlow>,
}

impl ConnectionFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel from a `PartitionRequest`. No data may flow for a
    /// channel before this.
    pub fn on_partition_request(&mut self, request: &PartitionRequest) -> Result<()> {
        if self.channels.contains_key(&request.receiver_id) {
            return Err(ShuffleError::ContractViolation(format!(
                "duplicate partition request for channel {}",
                request.receiver_id
            )));
        }
        self.channels
            .insert(request.receiver_id, ChannelFlow::open(request.credit));
        Ok(())
    }

    /// Account for emitting one `BufferResponse` on the given channel
    /// and return its sequence number.
    pub fn try_emit(&mut self, channel: ChannelId, data_type: DataType) -> Result<u32> {
        match self.channels.get_mut(&channel) {
            Some(flow) => flow.try_emit(data_type),
            None => Err(ShuffleError::ContractViolation(format!(
                "no partition request received for channel {channel}"
            ))),
        }
    }

    /// Apply a consumer-to-producer control message to the flow state.
    ///
    /// Messages for unknown (released) channels are ignored, matching
    /// the cancellation rule: once a channel is cancelled, anything else
    /// the consumer still had in flight for it is dropped.
    pub fn apply(&mut self, message: &Message) -> Result<()> {
        match message {
            Message::PartitionRequest(request) => self.on_partition_request(request),
            Message::AddCredit(grant) => match self.channels.get_mut(&grant.receiver_id) {
                Some(flow) => flow.add_credit(grant.credit),
                None => Ok(()),
            },
            Message::ResumeConsumption(resume) => {
                if let Some(flow) = self.channels.get_mut(&resume.receiver_id) {
                    flow.resume();
                }
                Ok(())
            }
            Message::AckAllUserRecordsProcessed(ack) => {
                if let Some(flow) = self.channels.get_mut(&ack.receiver_id) {
                    flow.ack_all_records();
                }
                Ok(())
            }
            Message::NewBufferSize(resize) => match self.channels.get_mut(&resize.receiver_id) {
                Some(flow) => flow.update_buffer_size(resize.buffer_size),
                None => Ok(()),
            },
            Message::CancelPartitionRequest(cancel) => {
                self.release(cancel.receiver_id);
                Ok(())
            }
            Message::CloseRequest(_) => {
                self.channels.clear();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Release a channel unilaterally (cancellation), dropping its flow
    /// state.
    pub fn release(&mut self, channel: ChannelId) {
        self.channels.remove(&channel);
    }

    pub fn channel(&self, channel: ChannelId) -> Option<&ChannelFlow> {
        self.channels.get(&channel)
    }

    pub fn channel_mut(&mut self, channel: ChannelId) -> Option<&mut ChannelFlow> {
        self.channels.get_mut(&channel)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }
}

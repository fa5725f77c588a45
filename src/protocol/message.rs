//! The message catalog: typed bodies for every message id.
//!
//! Twelve message kinds share one frame format. Each body type documents
//! its wire layout, writes its fields in declaration order, and validates
//! the catalog invariants (strictly positive credit, buffer size, backlog
//! and segment id; matching partial-buffer sizes) on both the encode and
//! the decode path.
//!
//! The catalog is a tagged sum type: [`Message`] has one variant per id
//! and decode dispatches on the id byte. There is no reflective
//! construction; a frame either maps onto a variant or the connection
//! dies with [`ShuffleError::UnknownMessage`].

use std::fmt;

use bytes::{Buf, BufMut, Bytes};

use crate::buffer::{Buffer, BufferAllocator, DataType};
use crate::error::{Result, ShuffleError};
use crate::protocol::ids::{ChannelId, PartitionId, SubpartitionIndexSet};

fn ensure_remaining(buf: &mut impl Buf, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(ShuffleError::StreamCorrupted(format!(
            "truncated frame: {} more bytes needed for {what}",
            needed - buf.remaining()
        )));
    }
    Ok(())
}

fn write_string(buf: &mut impl BufMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

fn read_string(buf: &mut impl Buf, what: &str) -> Result<String> {
    ensure_remaining(buf, 4, what)?;
    let len = buf.get_u32() as usize;
    ensure_remaining(buf, len, what)?;
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ShuffleError::Decode(format!("{what} is not valid UTF-8")))
}

/// One payload buffer travelling producer → consumer.
///
/// Message header layout (after the frame prefix):
///
/// | field                 | width              |
/// |-----------------------|--------------------|
/// | receiver channel id   | 16                 |
/// | subpartition id       | 4                  |
/// | num partial buffers   | 4                  |
/// | sequence number       | 4                  |
/// | backlog               | 4                  |
/// | data type ordinal     | 1                  |
/// | is compressed         | 1                  |
/// | payload readable size | 4                  |
/// | partial sizes         | 4 · num partial    |
/// | payload               | readable size      |
#[derive(Debug)]
pub struct BufferResponse {
    /// The payload. `None` after decoding a size-0 response, or when the
    /// target channel was released while the frame was in flight.
    pub buffer: Option<Buffer>,
    pub receiver_id: ChannelId,
    pub subpartition_id: u32,
    pub sequence_number: u32,
    pub backlog: u32,
    pub data_type: DataType,
    pub is_compressed: bool,
    /// Payload size as carried on the wire; kept even when `buffer` is
    /// `None` so credit accounting stays correct.
    pub buffer_size: u32,
    /// Sizes of the composite parts; empty for plain payloads.
    pub partial_sizes: Vec<u32>,
}

impl BufferResponse {
    pub const ID: u8 = 0;

    /// Fixed part of the message header, excluding partial sizes.
    pub const MESSAGE_HEADER_LENGTH: usize = ChannelId::WIRE_LENGTH + 4 + 4 + 4 + 4 + 1 + 1 + 4;

    /// Wrap an outgoing payload, deriving the wire attributes from the
    /// buffer itself.
    pub fn new(
        buffer: Buffer,
        sequence_number: u32,
        receiver_id: ChannelId,
        subpartition_id: u32,
        backlog: u32,
    ) -> Self {
        let partial_sizes = buffer.partial_sizes().unwrap_or_default();
        Self {
            data_type: buffer.data_type(),
            is_compressed: buffer.is_compressed(),
            buffer_size: buffer.readable_bytes() as u32,
            partial_sizes,
            buffer: Some(buffer),
            receiver_id,
            subpartition_id,
            sequence_number,
            backlog,
        }
    }

    /// Header length for this message, partial sizes included.
    pub fn header_length(&self) -> usize {
        Self::MESSAGE_HEADER_LENGTH + 4 * self.partial_sizes.len()
    }

    /// Whether the payload is user data (as opposed to an event).
    pub fn is_buffer(&self) -> bool {
        self.data_type.is_buffer()
    }

    /// Release the attached payload, if any.
    pub fn release_buffer(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.recycle();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.partial_sizes.is_empty() {
            let num_parts = self.buffer.as_ref().map(Buffer::num_parts).unwrap_or(0);
            if num_parts != self.partial_sizes.len() {
                return Err(ShuffleError::ContractViolation(format!(
                    "mismatched number of partial buffers: header says {}, payload has {num_parts}",
                    self.partial_sizes.len()
                )));
            }
            let sum: u64 = self.partial_sizes.iter().map(|&s| s as u64).sum();
            if sum != self.buffer_size as u64 {
                return Err(ShuffleError::ContractViolation(format!(
                    "partial buffer sizes sum to {sum}, payload size is {}",
                    self.buffer_size
                )));
            }
        }
        match &self.buffer {
            Some(buffer) => {
                if buffer.readable_bytes() as u32 != self.buffer_size {
                    return Err(ShuffleError::ContractViolation(format!(
                        "payload has {} readable bytes, header says {}",
                        buffer.readable_bytes(),
                        self.buffer_size
                    )));
                }
            }
            None if self.buffer_size != 0 => {
                return Err(ShuffleError::ContractViolation(format!(
                    "no payload attached but header says {} bytes",
                    self.buffer_size
                )));
            }
            None => {}
        }
        Ok(())
    }

    /// Write the message header (everything up to the payload).
    pub fn write_header_to(&self, buf: &mut impl BufMut) {
        self.receiver_id.write_to(buf);
        buf.put_u32(self.subpartition_id);
        buf.put_u32(self.partial_sizes.len() as u32);
        buf.put_u32(self.sequence_number);
        buf.put_u32(self.backlog);
        buf.put_u8(self.data_type.ordinal());
        buf.put_u8(self.is_compressed as u8);
        buf.put_u32(self.buffer_size);
        for &size in &self.partial_sizes {
            buf.put_u32(size);
        }
    }

    /// Parse the header and bind a payload buffer from the allocator.
    ///
    /// Data payloads land in a pooled buffer; event payloads in an
    /// unpooled buffer of exactly `size` bytes. A pooled allocation of
    /// `None` means the target channel is gone: the payload bytes are
    /// skipped, and the message still carries its size so a credit is
    /// accounted for. Size-0 responses recycle any allocation
    /// immediately and decode with no payload.
    pub fn read_from(buf: &mut impl Buf, allocator: &dyn BufferAllocator) -> Result<Self> {
        ensure_remaining(buf, Self::MESSAGE_HEADER_LENGTH, "BufferResponse header")?;
        let receiver_id = ChannelId::read_from(buf)?;
        let subpartition_id = buf.get_u32();
        let num_partial_buffers = buf.get_u32() as usize;
        let sequence_number = buf.get_u32();
        let backlog = buf.get_u32();
        let data_type = DataType::from_ordinal(buf.get_u8())?;
        let is_compressed = buf.get_u8() != 0;
        let size = buf.get_u32();

        ensure_remaining(buf, num_partial_buffers.saturating_mul(4), "partial buffer sizes")?;
        let mut partial_sizes = Vec::with_capacity(num_partial_buffers);
        for _ in 0..num_partial_buffers {
            partial_sizes.push(buf.get_u32());
        }
        if num_partial_buffers > 0 {
            let sum: u64 = partial_sizes.iter().map(|&s| s as u64).sum();
            if sum != size as u64 {
                return Err(ShuffleError::ContractViolation(format!(
                    "partial buffer sizes sum to {sum}, payload size is {size}"
                )));
            }
        }

        ensure_remaining(buf, size as usize, "BufferResponse payload")?;

        let mut buffer = if data_type.is_buffer() {
            let allocated = allocator.allocate_pooled(receiver_id);
            if let Some(mut pooled) = allocated {
                pooled.set_data_type(data_type);
                Some(pooled)
            } else {
                None
            }
        } else {
            Some(allocator.allocate_unpooled(size as usize, data_type))
        };

        if size == 0 {
            // A size-0 response still consumed one credit on the wire;
            // the fresh allocation goes straight back to the pool.
            if let Some(empty) = buffer.take() {
                empty.recycle();
            }
        }

        match &mut buffer {
            Some(target) if size > 0 => {
                let payload = buf.copy_to_bytes(size as usize);
                target.append(&payload)?;
                target.set_compressed(is_compressed);
            }
            _ => {
                // Channel released or empty payload: advance past the
                // body so the next frame parses cleanly.
                buf.advance(size as usize);
            }
        }

        Ok(Self {
            buffer,
            receiver_id,
            subpartition_id,
            sequence_number,
            backlog,
            data_type,
            is_compressed,
            buffer_size: size,
            partial_sizes,
        })
    }
}

/// Cross-language representation of a remote failure.
///
/// Wire form: three length-prefixed UTF-8 strings (class, message,
/// stack trace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCause {
    pub class_name: String,
    pub message: String,
    pub stack_trace: String,
}

impl ErrorCause {
    pub fn new(
        class_name: impl Into<String>,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
            stack_trace: stack_trace.into(),
        }
    }

    fn write_to(&self, buf: &mut impl BufMut) {
        write_string(buf, &self.class_name);
        write_string(buf, &self.message);
        write_string(buf, &self.stack_trace);
    }

    fn read_from(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            class_name: read_string(buf, "error class")?,
            message: read_string(buf, "error message")?,
            stack_trace: read_string(buf, "error stack trace")?,
        })
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class_name, self.message)
    }
}

/// A failure report travelling producer → consumer.
///
/// Wire: `⟨has_receiver:u8, [receiver_id:16], cause⟩`. Without a
/// receiver id the error is fatal to the whole connection; with one it
/// is delivered to the named channel only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub cause: ErrorCause,
    pub receiver_id: Option<ChannelId>,
}

impl ErrorResponse {
    pub const ID: u8 = 1;

    /// A connection-wide fatal error.
    pub fn fatal(cause: ErrorCause) -> Self {
        Self {
            cause,
            receiver_id: None,
        }
    }

    /// A failure scoped to one channel.
    pub fn for_channel(cause: ErrorCause, receiver_id: ChannelId) -> Self {
        Self {
            cause,
            receiver_id: Some(receiver_id),
        }
    }

    pub fn is_fatal_error(&self) -> bool {
        self.receiver_id.is_none()
    }

    pub fn write_body_to(&self, buf: &mut impl BufMut) {
        match &self.receiver_id {
            Some(receiver_id) => {
                buf.put_u8(1);
                receiver_id.write_to(buf);
            }
            None => buf.put_u8(0),
        }
        self.cause.write_to(buf);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(buf, 1, "ErrorResponse flag")?;
        let receiver_id = if buf.get_u8() != 0 {
            Some(ChannelId::read_from(buf)?)
        } else {
            None
        };
        let cause = ErrorCause::read_from(buf)?;
        Ok(Self { cause, receiver_id })
    }
}

/// Opens a channel: consumer asks the producer to stream the given
/// subpartitions with an initial credit budget.
///
/// Wire: `⟨partition_id:32, subpartition_index_set, receiver_id:16,
/// credit:4⟩`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRequest {
    pub partition_id: PartitionId,
    pub subpartition_indexes: SubpartitionIndexSet,
    pub receiver_id: ChannelId,
    pub credit: u32,
}

impl PartitionRequest {
    pub const ID: u8 = 2;

    pub fn body_length(&self) -> usize {
        PartitionId::WIRE_LENGTH + self.subpartition_indexes.wire_length() + ChannelId::WIRE_LENGTH + 4
    }

    pub fn write_body_to(&self, buf: &mut impl BufMut) {
        self.partition_id.write_to(buf);
        self.subpartition_indexes.write_to(buf);
        self.receiver_id.write_to(buf);
        buf.put_u32(self.credit);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        let partition_id = PartitionId::read_from(buf)?;
        let subpartition_indexes = SubpartitionIndexSet::read_from(buf)?;
        let receiver_id = ChannelId::read_from(buf)?;
        ensure_remaining(buf, 4, "PartitionRequest credit")?;
        let credit = buf.get_u32();
        Ok(Self {
            partition_id,
            subpartition_indexes,
            receiver_id,
            credit,
        })
    }
}

impl fmt::Display for PartitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PartitionRequest({}:{}:{})",
            self.partition_id, self.subpartition_indexes, self.credit
        )
    }
}

/// Carries an opaque serialized task event in either direction.
///
/// Wire: `⟨length:4, event_bytes:length, partition_id:32,
/// receiver_id:16⟩`. The event bytes come from an external serializer;
/// the catalog never inspects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEventRequest {
    pub event: Bytes,
    pub partition_id: PartitionId,
    pub receiver_id: ChannelId,
}

impl TaskEventRequest {
    pub const ID: u8 = 3;

    pub fn body_length(&self) -> usize {
        4 + self.event.len() + PartitionId::WIRE_LENGTH + ChannelId::WIRE_LENGTH
    }

    pub fn write_body_to(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.event.len() as u32);
        buf.put_slice(&self.event);
        self.partition_id.write_to(buf);
        self.receiver_id.write_to(buf);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(buf, 4, "event length")?;
        let length = buf.get_u32() as usize;
        ensure_remaining(buf, length, "event bytes")?;
        let event = buf.copy_to_bytes(length);
        let partition_id = PartitionId::read_from(buf)?;
        let receiver_id = ChannelId::read_from(buf)?;
        Ok(Self {
            event,
            partition_id,
            receiver_id,
        })
    }
}

/// Consumer tells the producer to stop streaming a channel and drop the
/// state tied to it. Wire: `⟨receiver_id:16⟩`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelPartitionRequest {
    pub receiver_id: ChannelId,
}

impl CancelPartitionRequest {
    pub const ID: u8 = 4;

    pub fn body_length(&self) -> usize {
        ChannelId::WIRE_LENGTH
    }

    pub fn write_body_to(&self, buf: &mut impl BufMut) {
        self.receiver_id.write_to(buf);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            receiver_id: ChannelId::read_from(buf)?,
        })
    }
}

/// Consumer asks the producer to drain and close every channel on the
/// connection. Empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CloseRequest;

impl CloseRequest {
    pub const ID: u8 = 5;

    pub fn body_length(&self) -> usize {
        0
    }

    pub fn write_body_to(&self, _buf: &mut impl BufMut) {}

    pub fn read_from(_buf: &mut impl Buf) -> Result<Self> {
        Ok(Self)
    }
}

/// Incremental credit grant, consumer → producer.
/// Wire: `⟨credit:4, receiver_id:16⟩`, `credit > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCredit {
    pub credit: u32,
    pub receiver_id: ChannelId,
}

impl AddCredit {
    pub const ID: u8 = 6;

    pub fn validate(&self) -> Result<()> {
        if self.credit == 0 {
            return Err(ShuffleError::ContractViolation(
                "announced credit must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn body_length(&self) -> usize {
        4 + ChannelId::WIRE_LENGTH
    }

    pub fn write_body_to(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.credit);
        self.receiver_id.write_to(buf);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(buf, 4, "credit")?;
        let credit = buf.get_u32();
        let receiver_id = ChannelId::read_from(buf)?;
        let message = Self {
            credit,
            receiver_id,
        };
        message.validate()?;
        Ok(message)
    }
}

impl fmt::Display for AddCredit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddCredit({} : {})", self.receiver_id, self.credit)
    }
}

/// Consumer is ready again after an unaligned checkpoint barrier.
/// Wire: `⟨receiver_id:16⟩`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeConsumption {
    pub receiver_id: ChannelId,
}

impl ResumeConsumption {
    pub const ID: u8 = 7;

    pub fn body_length(&self) -> usize {
        ChannelId::WIRE_LENGTH
    }

    pub fn write_body_to(&self, buf: &mut impl BufMut) {
        self.receiver_id.write_to(buf);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            receiver_id: ChannelId::read_from(buf)?,
        })
    }
}

impl fmt::Display for ResumeConsumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResumeConsumption({})", self.receiver_id)
    }
}

/// Consumer has processed every preceding user record for the channel.
/// Wire: `⟨receiver_id:16⟩`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckAllUserRecordsProcessed {
    pub receiver_id: ChannelId,
}

impl AckAllUserRecordsProcessed {
    pub const ID: u8 = 8;

    pub fn body_length(&self) -> usize {
        ChannelId::WIRE_LENGTH
    }

    pub fn write_body_to(&self, buf: &mut impl BufMut) {
        self.receiver_id.write_to(buf);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            receiver_id: ChannelId::read_from(buf)?,
        })
    }
}

impl fmt::Display for AckAllUserRecordsProcessed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AckAllUserRecordsProcessed({})", self.receiver_id)
    }
}

/// Advisory backlog depth, producer → consumer, for credit sizing.
/// Wire: `⟨backlog:4, receiver_id:16⟩`, `backlog > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogAnnouncement {
    pub backlog: u32,
    pub receiver_id: ChannelId,
}

impl BacklogAnnouncement {
    pub const ID: u8 = 9;

    pub fn validate(&self) -> Result<()> {
        if self.backlog == 0 {
            return Err(ShuffleError::ContractViolation(
                "announced backlog must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn body_length(&self) -> usize {
        4 + ChannelId::WIRE_LENGTH
    }

    pub fn write_body_to(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.backlog);
        self.receiver_id.write_to(buf);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(buf, 4, "backlog")?;
        let backlog = buf.get_u32();
        let receiver_id = ChannelId::read_from(buf)?;
        let message = Self {
            backlog,
            receiver_id,
        };
        message.validate()?;
        Ok(message)
    }
}

impl fmt::Display for BacklogAnnouncement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BacklogAnnouncement({} : {})", self.backlog, self.receiver_id)
    }
}

/// Consumer requests a new production buffer size for the channel.
/// Wire: `⟨buffer_size:4, receiver_id:16⟩`, `buffer_size > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBufferSize {
    pub buffer_size: u32,
    pub receiver_id: ChannelId,
}

impl NewBufferSize {
    pub const ID: u8 = 10;

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(ShuffleError::ContractViolation(
                "new buffer size must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn body_length(&self) -> usize {
        4 + ChannelId::WIRE_LENGTH
    }

    pub fn write_body_to(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.buffer_size);
        self.receiver_id.write_to(buf);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(buf, 4, "buffer size")?;
        let buffer_size = buf.get_u32();
        let receiver_id = ChannelId::read_from(buf)?;
        let message = Self {
            buffer_size,
            receiver_id,
        };
        message.validate()?;
        Ok(message)
    }
}

impl fmt::Display for NewBufferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NewBufferSize({} : {})", self.receiver_id, self.buffer_size)
    }
}

/// Consumer requests the producer (re)start with the named segment.
/// Wire: `⟨subpartition_id:4, segment_id:4, receiver_id:16⟩`,
/// `segment_id > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentId {
    pub subpartition_id: u32,
    pub segment_id: u32,
    pub receiver_id: ChannelId,
}

impl SegmentId {
    pub const ID: u8 = 11;

    pub fn validate(&self) -> Result<()> {
        if self.segment_id == 0 {
            return Err(ShuffleError::ContractViolation(
                "segment id must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn body_length(&self) -> usize {
        4 + 4 + ChannelId::WIRE_LENGTH
    }

    pub fn write_body_to(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.subpartition_id);
        buf.put_u32(self.segment_id);
        self.receiver_id.write_to(buf);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(buf, 8, "segment id")?;
        let subpartition_id = buf.get_u32();
        let segment_id = buf.get_u32();
        let receiver_id = ChannelId::read_from(buf)?;
        let message = Self {
            subpartition_id,
            segment_id,
            receiver_id,
        };
        message.validate()?;
        Ok(message)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentId({} : {})", self.receiver_id, self.segment_id)
    }
}

/// A decoded protocol message, one variant per message id.
#[derive(Debug)]
pub enum Message {
    BufferResponse(BufferResponse),
    ErrorResponse(ErrorResponse),
    PartitionRequest(PartitionRequest),
    TaskEventRequest(TaskEventRequest),
    CancelPartitionRequest(CancelPartitionRequest),
    CloseRequest(CloseRequest),
    AddCredit(AddCredit),
    ResumeConsumption(ResumeConsumption),
    AckAllUserRecordsProcessed(AckAllUserRecordsProcessed),
    BacklogAnnouncement(BacklogAnnouncement),
    NewBufferSize(NewBufferSize),
    SegmentId(SegmentId),
}

impl Message {
    /// The message id byte written after the magic number.
    pub fn msg_id(&self) -> u8 {
        match self {
            Message::BufferResponse(_) => BufferResponse::ID,
            Message::ErrorResponse(_) => ErrorResponse::ID,
            Message::PartitionRequest(_) => PartitionRequest::ID,
            Message::TaskEventRequest(_) => TaskEventRequest::ID,
            Message::CancelPartitionRequest(_) => CancelPartitionRequest::ID,
            Message::CloseRequest(_) => CloseRequest::ID,
            Message::AddCredit(_) => AddCredit::ID,
            Message::ResumeConsumption(_) => ResumeConsumption::ID,
            Message::AckAllUserRecordsProcessed(_) => AckAllUserRecordsProcessed::ID,
            Message::BacklogAnnouncement(_) => BacklogAnnouncement::ID,
            Message::NewBufferSize(_) => NewBufferSize::ID,
            Message::SegmentId(_) => SegmentId::ID,
        }
    }

    /// The channel this message is scoped to, if any. `CloseRequest`
    /// and fatal `ErrorResponse`s are connection-scoped.
    pub fn receiver_id(&self) -> Option<ChannelId> {
        match self {
            Message::BufferResponse(m) => Some(m.receiver_id),
            Message::ErrorResponse(m) => m.receiver_id,
            Message::PartitionRequest(m) => Some(m.receiver_id),
            Message::TaskEventRequest(m) => Some(m.receiver_id),
            Message::CancelPartitionRequest(m) => Some(m.receiver_id),
            Message::CloseRequest(_) => None,
            Message::AddCredit(m) => Some(m.receiver_id),
            Message::ResumeConsumption(m) => Some(m.receiver_id),
            Message::AckAllUserRecordsProcessed(m) => Some(m.receiver_id),
            Message::BacklogAnnouncement(m) => Some(m.receiver_id),
            Message::NewBufferSize(m) => Some(m.receiver_id),
            Message::SegmentId(m) => Some(m.receiver_id),
        }
    }

    /// Validate the catalog invariants for this message.
    pub fn validate(&self) -> Result<()> {
        match self {
            Message::BufferResponse(m) => m.validate(),
            Message::AddCredit(m) => m.validate(),
            Message::BacklogAnnouncement(m) => m.validate(),
            Message::NewBufferSize(m) => m.validate(),
            Message::SegmentId(m) => m.validate(),
            _ => Ok(()),
        }
    }

    /// Wire length of the body this message writes through
    /// [`Message::write_body_to`]. For `BufferResponse` this is the
    /// message header only; the payload is handed off separately.
    pub fn body_length(&self) -> usize {
        match self {
            Message::BufferResponse(m) => m.header_length(),
            Message::ErrorResponse(m) => {
                1 + m.receiver_id.map(|_| ChannelId::WIRE_LENGTH).unwrap_or(0)
                    + 4
                    + m.cause.class_name.len()
                    + 4
                    + m.cause.message.len()
                    + 4
                    + m.cause.stack_trace.len()
            }
            Message::PartitionRequest(m) => m.body_length(),
            Message::TaskEventRequest(m) => m.body_length(),
            Message::CancelPartitionRequest(m) => m.body_length(),
            Message::CloseRequest(m) => m.body_length(),
            Message::AddCredit(m) => m.body_length(),
            Message::ResumeConsumption(m) => m.body_length(),
            Message::AckAllUserRecordsProcessed(m) => m.body_length(),
            Message::BacklogAnnouncement(m) => m.body_length(),
            Message::NewBufferSize(m) => m.body_length(),
            Message::SegmentId(m) => m.body_length(),
        }
    }

    /// Write the in-header body of this message. The payload of a
    /// `BufferResponse` is not written here; it travels as its own
    /// buffer.
    pub fn write_body_to(&self, buf: &mut impl BufMut) {
        match self {
            Message::BufferResponse(m) => m.write_header_to(buf),
            Message::ErrorResponse(m) => m.write_body_to(buf),
            Message::PartitionRequest(m) => m.write_body_to(buf),
            Message::TaskEventRequest(m) => m.write_body_to(buf),
            Message::CancelPartitionRequest(m) => m.write_body_to(buf),
            Message::CloseRequest(m) => m.write_body_to(buf),
            Message::AddCredit(m) => m.write_body_to(buf),
            Message::ResumeConsumption(m) => m.write_body_to(buf),
            Message::AckAllUserRecordsProcessed(m) => m.write_body_to(buf),
            Message::BacklogAnnouncement(m) => m.write_body_to(buf),
            Message::NewBufferSize(m) => m.write_body_to(buf),
            Message::SegmentId(m) => m.write_body_to(buf),
        }
    }

    /// Decode a message body, dispatching on the id byte.
    ///
    /// The allocator is consulted only for `BufferResponse`. An id
    /// outside the catalog is fatal.
    pub fn decode_body(
        msg_id: u8,
        buf: &mut impl Buf,
        allocator: &dyn BufferAllocator,
    ) -> Result<Self> {
        let message = match msg_id {
            BufferResponse::ID => Message::BufferResponse(BufferResponse::read_from(buf, allocator)?),
            ErrorResponse::ID => Message::ErrorResponse(ErrorResponse::read_from(buf)?),
            PartitionRequest::ID => Message::PartitionRequest(PartitionRequest::read_from(buf)?),
            TaskEventRequest::ID => Message::TaskEventRequest(TaskEventRequest::read_from(buf)?),
            CancelPartitionRequest::ID => {
                Message::CancelPartitionRequest(CancelPartitionRequest::read_from(buf)?)
            }
            CloseRequest::ID => Message::CloseRequest(CloseRequest::read_from(buf)?),
            AddCredit::ID => Message::AddCredit(AddCredit::read_from(buf)?),
            ResumeConsumption::ID => Message::ResumeConsumption(ResumeConsumption::read_from(buf)?),
            AckAllUserRecordsProcessed::ID => {
                Message::AckAllUserRecordsProcessed(AckAllUserRecordsProcessed::read_from(buf)?)
            }
            BacklogAnnouncement::ID => {
                Message::BacklogAnnouncement(BacklogAnnouncement::read_from(buf)?)
            }
            NewBufferSize::ID => Message::NewBufferSize(NewBufferSize::read_from(buf)?),
            SegmentId::ID => Message::SegmentId(SegmentId::read_from(buf)?),
            unknown => return Err(ShuffleError::UnknownMessage(unknown)),
        };
        Ok(message)
    }
}

//! Streaming frame decoder.
//!
//! Accumulates raw transport bytes in a single `BytesMut` and extracts
//! whole messages with a two-state machine:
//!
//! - `WaitingForLength`: need the 4-byte frame length;
//! - `WaitingForBody`: length known, need the rest of the frame.
//!
//! Each complete frame is validated (magic number, message id) and
//! dispatched to the catalog decoder for its id. Data-carrying frames
//! consult the [`BufferAllocator`] to bind a payload buffer.
//!
//! Framing errors (bad magic, impossible length, unknown id) are fatal
//! and the caller must tear the connection down. Content-level failures
//! inside a frame surface as [`ShuffleError::Decode`] and concern only
//! the owning channel. On any error path the frame's scratch memory is
//! dropped before the error propagates.

use std::sync::Arc;

use bytes::{Buf, BytesMut};

use crate::buffer::BufferAllocator;
use crate::error::Result;
use crate::protocol::message::Message;
use crate::protocol::wire::{validate_frame_length, FramePrefix};

/// Initial capacity of the accumulation buffer.
const READ_BUFFER_CAPACITY: usize = 64 * 1024;

/// State machine for frame extraction.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the 4-byte length field.
    WaitingForLength,
    /// Length consumed; waiting for the remaining `frame_length - 4`
    /// bytes of the frame.
    WaitingForBody { frame_length: u32 },
}

/// Stateful decoder turning a byte stream into catalog messages.
///
/// One decoder per connection, driven from the connection's read loop.
pub struct MessageDecoder {
    buffer: BytesMut,
    state: State,
    allocator: Arc<dyn BufferAllocator>,
}

impl MessageDecoder {
    pub fn new(allocator: Arc<dyn BufferAllocator>) -> Self {
        Self {
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            state: State::WaitingForLength,
            allocator,
        }
    }

    /// Push transport bytes and extract every complete message.
    ///
    /// Partial frames stay buffered for the next push; an arbitrary
    /// re-chunking of the stream yields the same message sequence.
    ///
    /// # Errors
    ///
    /// Fatal errors ([`crate::ShuffleError::StreamCorrupted`],
    /// [`crate::ShuffleError::UnknownMessage`],
    /// [`crate::ShuffleError::ContractViolation`]) poison the stream;
    /// the connection owner must stop feeding this decoder and tear
    /// down.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Message>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(message) = self.try_extract_one()? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Bytes currently buffered (partial frame data).
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn try_extract_one(&mut self) -> Result<Option<Message>> {
        match self.state {
            State::WaitingForLength => {
                if self.buffer.len() < 4 {
                    return Ok(None);
                }

                let frame_length = self.buffer.get_u32();
                validate_frame_length(frame_length)?;

                self.state = State::WaitingForBody { frame_length };
                self.try_extract_one()
            }

            State::WaitingForBody { frame_length } => {
                let remaining = frame_length as usize - 4;
                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                // The frame's bytes leave the accumulation buffer here;
                // whatever happens below, they are dropped when `frame`
                // goes out of scope.
                let mut frame = self.buffer.split_to(remaining);
                self.state = State::WaitingForLength;

                let prefix = FramePrefix::read_after_length(frame_length, &mut frame)?;
                let message =
                    Message::decode_body(prefix.msg_id, &mut frame, self.allocator.as_ref())?;

                if frame.has_remaining() {
                    tracing::debug!(
                        msg_id = prefix.msg_id,
                        trailing = frame.remaining(),
                        "frame carried trailing bytes past its message body"
                    );
                }

                Ok(Some(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, DataType, UnpooledAllocator};
    use crate::error::ShuffleError;
    use crate::protocol::encoder::MessageEncoder;
    use crate::protocol::message::*;
    use crate::protocol::ChannelId;

    fn decoder() -> MessageDecoder {
        MessageDecoder::new(Arc::new(UnpooledAllocator::default()))
    }

    fn frame_bytes(message: Message) -> Vec<u8> {
        let mut encoder = MessageEncoder::new();
        let frame = encoder.encode(message).unwrap();
        let mut bytes = frame.header.to_vec();
        if let Some(payload) = &frame.payload {
            for chunk in payload.as_chunks() {
                bytes.extend_from_slice(chunk);
            }
        }
        bytes
    }

    #[test]
    fn test_single_complete_frame() {
        let mut decoder = decoder();
        let bytes = frame_bytes(Message::CloseRequest(CloseRequest));

        let messages = decoder.push(&bytes).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], Message::CloseRequest(_)));
        assert_eq!(decoder.buffered_bytes(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut decoder = decoder();
        let mut bytes = frame_bytes(Message::CloseRequest(CloseRequest));
        bytes.extend(frame_bytes(Message::AddCredit(AddCredit {
            credit: 2,
            receiver_id: ChannelId::from(1u128),
        })));
        bytes.extend(frame_bytes(Message::ResumeConsumption(ResumeConsumption {
            receiver_id: ChannelId::from(2u128),
        })));

        let messages = decoder.push(&bytes).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].msg_id(), CloseRequest::ID);
        assert_eq!(messages[1].msg_id(), AddCredit::ID);
        assert_eq!(messages[2].msg_id(), ResumeConsumption::ID);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut decoder = decoder();
        let bytes = frame_bytes(Message::AddCredit(AddCredit {
            credit: 9,
            receiver_id: ChannelId::from(3u128),
        }));

        let mut messages = Vec::new();
        for byte in &bytes {
            messages.extend(decoder.push(std::slice::from_ref(byte)).unwrap());
        }

        assert_eq!(messages.len(), 1);
        match &messages[0] {
            Message::AddCredit(m) => assert_eq!(m.credit, 9),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut decoder = decoder();
        let bytes = [0x00, 0x00, 0x00, 0x09, 0xDE, 0xAD, 0xBE, 0xEF, 0x05];

        let result = decoder.push(&bytes);
        assert!(matches!(result, Err(ShuffleError::StreamCorrupted(_))));
    }

    #[test]
    fn test_unknown_message_id_is_fatal() {
        let mut decoder = decoder();
        let bytes = [0x00, 0x00, 0x00, 0x09, 0xBA, 0xDC, 0x0F, 0xFE, 0x0C];

        let result = decoder.push(&bytes);
        assert!(matches!(result, Err(ShuffleError::UnknownMessage(12))));
    }

    #[test]
    fn test_undersized_frame_length_is_fatal() {
        let mut decoder = decoder();
        let result = decoder.push(&[0x00, 0x00, 0x00, 0x04]);
        assert!(matches!(result, Err(ShuffleError::StreamCorrupted(_))));
    }

    #[test]
    fn test_buffer_response_roundtrip_through_decoder() {
        let mut decoder = decoder();

        let mut payload = Buffer::with_capacity(32, DataType::DataBuffer);
        payload.append(b"some records").unwrap();
        let bytes = frame_bytes(Message::BufferResponse(BufferResponse::new(
            payload,
            7,
            ChannelId::from(4u128),
            1,
            3,
        )));

        let messages = decoder.push(&bytes).unwrap();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            Message::BufferResponse(m) => {
                assert_eq!(m.sequence_number, 7);
                assert_eq!(m.backlog, 3);
                assert_eq!(m.buffer_size, 12);
                assert_eq!(
                    m.buffer.as_ref().unwrap().as_chunks(),
                    vec![&b"some records"[..]]
                );
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_zero_size_buffer_response_has_no_payload() {
        let mut decoder = decoder();

        let payload = Buffer::with_capacity(0, DataType::EndOfPartition);
        let bytes = frame_bytes(Message::BufferResponse(BufferResponse::new(
            payload,
            42,
            ChannelId::from(5u128),
            0,
            0,
        )));

        let messages = decoder.push(&bytes).unwrap();
        match &messages[0] {
            Message::BufferResponse(m) => {
                assert!(m.buffer.is_none());
                assert_eq!(m.buffer_size, 0);
                assert_eq!(m.sequence_number, 42);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    struct GoneChannelAllocator;

    impl BufferAllocator for GoneChannelAllocator {
        fn allocate_pooled(&self, _channel: ChannelId) -> Option<Buffer> {
            None
        }

        fn allocate_unpooled(&self, size: usize, data_type: DataType) -> Buffer {
            Buffer::with_capacity(size, data_type)
        }
    }

    #[test]
    fn test_released_channel_skips_payload_and_continues() {
        let mut decoder = MessageDecoder::new(Arc::new(GoneChannelAllocator));

        let mut payload = Buffer::with_capacity(16, DataType::DataBuffer);
        payload.append(b"dropped on floor").unwrap();
        let mut bytes = frame_bytes(Message::BufferResponse(BufferResponse::new(
            payload,
            0,
            ChannelId::from(6u128),
            0,
            0,
        )));
        // A following frame must still parse cleanly.
        bytes.extend(frame_bytes(Message::CloseRequest(CloseRequest)));

        let messages = decoder.push(&bytes).unwrap();
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            Message::BufferResponse(m) => {
                assert!(m.buffer.is_none());
                // Size survives so a credit is still accounted for.
                assert_eq!(m.buffer_size, 16);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(matches!(messages[1], Message::CloseRequest(_)));
    }

    #[test]
    fn test_split_across_pushes_at_frame_boundary() {
        let mut decoder = decoder();
        let bytes = frame_bytes(Message::CancelPartitionRequest(CancelPartitionRequest {
            receiver_id: ChannelId::from(7u128),
        }));

        // Length field alone, then the rest.
        assert!(decoder.push(&bytes[..4]).unwrap().is_empty());
        assert!(decoder.buffered_bytes() == 0);
        let messages = decoder.push(&bytes[4..]).unwrap();
        assert_eq!(messages.len(), 1);
    }
}

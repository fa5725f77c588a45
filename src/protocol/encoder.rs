//! Message encoding: catalog values to wire frames.
//!
//! The encoder produces [`OutboundFrame`]s: a frozen header (frame
//! prefix plus message header) and, for data-carrying messages, the
//! payload [`Buffer`] riding next to it untouched. The payload is never
//! copied; the writer task hands both to the transport with a vectored
//! write.
//!
//! Two allocation strategies, depending on whether the body length is
//! known up front:
//!
//! - fixed-layout messages are written into an exactly-sized buffer with
//!   the final frame length leading;
//! - `ErrorResponse` (string fields) is written behind a zero length
//!   placeholder which is patched at offset 0 once the body is in place.
//!
//! Ownership: a payload attached to a message belongs to the resulting
//! frame. If encoding fails, the payload is recycled before the error
//! propagates; the buffer's release guard makes that exactly-once.

use bytes::Bytes;

use crate::buffer::Buffer;
use crate::error::Result;
use crate::protocol::header_pool::HeaderPool;
use crate::protocol::message::{BufferResponse, ErrorResponse, Message};
use crate::protocol::wire::{FramePrefix, FRAME_PREFIX_LENGTH};

/// An encoded frame ready for the writer task.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Frame prefix and message header (for control messages, the entire
    /// frame).
    pub header: Bytes,
    /// Zero-copy payload for data-carrying messages.
    pub payload: Option<Buffer>,
}

impl OutboundFrame {
    /// Total frame size on the wire, payload included.
    pub fn total_length(&self) -> usize {
        self.header.len()
            + self
                .payload
                .as_ref()
                .map(Buffer::readable_bytes)
                .unwrap_or(0)
    }

    /// Release the attached payload without sending the frame.
    pub fn release(mut self) {
        if let Some(buffer) = self.payload.take() {
            buffer.recycle();
        }
    }
}

/// Stateful encoder owning the header scratch arena.
///
/// One encoder per connection, used from the connection's own executor.
pub struct MessageEncoder {
    pool: HeaderPool,
}

impl MessageEncoder {
    pub fn new() -> Self {
        Self {
            pool: HeaderPool::new(),
        }
    }

    /// Encode one message into an [`OutboundFrame`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::ShuffleError::ContractViolation`] when the
    /// message fails its catalog invariants. Any attached payload has
    /// been recycled by the time the error is returned.
    pub fn encode(&mut self, message: Message) -> Result<OutboundFrame> {
        match message {
            Message::BufferResponse(mut response) => {
                if let Err(err) = response.validate() {
                    response.release_buffer();
                    return Err(err);
                }
                let header_length = response.header_length();
                let frame_length =
                    (FRAME_PREFIX_LENGTH + header_length) as u32 + response.buffer_size;
                let header = self
                    .pool
                    .encode_with(FRAME_PREFIX_LENGTH + header_length, |buf| {
                        FramePrefix {
                            frame_length,
                            msg_id: BufferResponse::ID,
                        }
                        .write_to(buf);
                        response.write_header_to(buf);
                    });
                Ok(OutboundFrame {
                    header,
                    payload: response.buffer.take(),
                })
            }

            Message::ErrorResponse(response) => {
                // Body length depends on string fields: write a zero
                // length placeholder and patch it once the body is done.
                let header = self.pool.encode_with(FRAME_PREFIX_LENGTH, |buf| {
                    FramePrefix {
                        frame_length: 0,
                        msg_id: ErrorResponse::ID,
                    }
                    .write_to(buf);
                    response.write_body_to(buf);
                    let frame_length = buf.len() as u32;
                    buf[0..4].copy_from_slice(&frame_length.to_be_bytes());
                });
                Ok(OutboundFrame {
                    header,
                    payload: None,
                })
            }

            control => {
                control.validate()?;
                let body_length = control.body_length();
                let header = self
                    .pool
                    .encode_with(FRAME_PREFIX_LENGTH + body_length, |buf| {
                        FramePrefix::for_body(control.msg_id(), body_length).write_to(buf);
                        control.write_body_to(buf);
                    });
                Ok(OutboundFrame {
                    header,
                    payload: None,
                })
            }
        }
    }
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::DataType;
    use crate::protocol::message::{AddCredit, CloseRequest, ErrorCause};
    use crate::protocol::ChannelId;

    #[test]
    fn test_close_request_exact_bytes() {
        let mut encoder = MessageEncoder::new();
        let frame = encoder.encode(Message::CloseRequest(CloseRequest)).unwrap();

        assert_eq!(
            &frame.header[..],
            &[0x00, 0x00, 0x00, 0x09, 0xBA, 0xDC, 0x0F, 0xFE, 0x05]
        );
        assert!(frame.payload.is_none());
        assert_eq!(frame.total_length(), 9);
    }

    #[test]
    fn test_add_credit_exact_bytes() {
        let mut encoder = MessageEncoder::new();
        let frame = encoder
            .encode(Message::AddCredit(AddCredit {
                credit: 7,
                receiver_id: ChannelId::new([0u8; 16]),
            }))
            .unwrap();

        // 9-byte prefix + 4-byte credit + 16-byte channel id = 29
        assert_eq!(frame.header.len(), 29);
        assert_eq!(
            &frame.header[..9],
            &[0x00, 0x00, 0x00, 0x1D, 0xBA, 0xDC, 0x0F, 0xFE, 0x06]
        );
        assert_eq!(&frame.header[9..13], &[0x00, 0x00, 0x00, 0x07]);
        assert!(frame.header[13..29].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_credit_rejected() {
        let mut encoder = MessageEncoder::new();
        let result = encoder.encode(Message::AddCredit(AddCredit {
            credit: 0,
            receiver_id: ChannelId::from(1u128),
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_buffer_response_header_and_payload_split() {
        let mut payload = Buffer::with_capacity(16, DataType::DataBuffer);
        payload.append(b"0123456789").unwrap();

        let mut encoder = MessageEncoder::new();
        let frame = encoder
            .encode(Message::BufferResponse(BufferResponse::new(
                payload,
                0,
                ChannelId::from(1u128),
                0,
                0,
            )))
            .unwrap();

        // Header carries prefix + fixed message header; the payload
        // rides separately.
        assert_eq!(
            frame.header.len(),
            FRAME_PREFIX_LENGTH + BufferResponse::MESSAGE_HEADER_LENGTH
        );
        assert_eq!(frame.total_length(), frame.header.len() + 10);

        // The frame length still covers the payload.
        let frame_length = u32::from_be_bytes(frame.header[0..4].try_into().unwrap());
        assert_eq!(frame_length as usize, frame.total_length());
        assert_eq!(frame.header[8], BufferResponse::ID);

        let payload = frame.payload.unwrap();
        assert_eq!(payload.as_chunks(), vec![&b"0123456789"[..]]);
    }

    #[test]
    fn test_buffer_response_partial_sizes_in_header() {
        let payload = Buffer::composite(
            vec![
                bytes::Bytes::from_static(&[1u8; 30]),
                bytes::Bytes::from_static(&[2u8; 70]),
            ],
            DataType::DataBuffer,
        );

        let mut encoder = MessageEncoder::new();
        let frame = encoder
            .encode(Message::BufferResponse(BufferResponse::new(
                payload,
                3,
                ChannelId::from(2u128),
                1,
                0,
            )))
            .unwrap();

        assert_eq!(
            frame.header.len(),
            FRAME_PREFIX_LENGTH + BufferResponse::MESSAGE_HEADER_LENGTH + 2 * 4
        );
        // Partial sizes are the last eight header bytes.
        let tail = &frame.header[frame.header.len() - 8..];
        assert_eq!(tail, &[0, 0, 0, 30, 0, 0, 0, 70]);
    }

    #[test]
    fn test_error_response_patched_length() {
        let mut encoder = MessageEncoder::new();
        let frame = encoder
            .encode(Message::ErrorResponse(ErrorResponse::fatal(
                ErrorCause::new("ProtocolException", "unknown message", ""),
            )))
            .unwrap();

        let frame_length = u32::from_be_bytes(frame.header[0..4].try_into().unwrap());
        assert_eq!(frame_length as usize, frame.header.len());
        assert_eq!(frame.header[8], ErrorResponse::ID);
    }
}

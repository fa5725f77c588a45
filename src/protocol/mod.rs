//! Protocol module - frame format, identifier codecs, message catalog,
//! and the encode/decode paths.
//!
//! - `wire`: the 9-byte frame prefix (length, magic, id)
//! - `ids`: fixed-width opaque identifiers and the subpartition index set
//! - `message`: the twelve-message catalog
//! - `encoder`/`decoder`: frames out, frames in
//! - `header_pool`: scratch memory for outbound headers

mod decoder;
mod encoder;
mod header_pool;
mod ids;
mod message;
mod wire;

pub use decoder::MessageDecoder;
pub use encoder::{MessageEncoder, OutboundFrame};
pub use header_pool::{HeaderPool, HEADER_POOL_CAPACITY};
pub use ids::{
    ChannelId, IntermediatePartitionId, PartitionId, ProducerAttemptId, SubpartitionIndexSet,
};
pub use message::{
    AckAllUserRecordsProcessed, AddCredit, BacklogAnnouncement, BufferResponse,
    CancelPartitionRequest, CloseRequest, ErrorCause, ErrorResponse, Message, NewBufferSize,
    PartitionRequest, ResumeConsumption, SegmentId, TaskEventRequest,
};
pub use wire::{
    validate_frame_length, FramePrefix, FRAME_PREFIX_LENGTH, MAGIC_NUMBER, MAX_FRAME_LENGTH,
};

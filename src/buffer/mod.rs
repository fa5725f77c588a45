//! Payload buffer model and the allocator seam.
//!
//! A [`Buffer`] is an owned payload region tagged with a [`DataType`] and
//! a compression flag. Its memory is one of:
//!
//! - [`Payload::Plain`] — a single contiguous region,
//! - [`Payload::Composite`] — an ordered list of fully-filled parts whose
//!   individual sizes survive the wire (the partial-sizes header tail),
//! - [`Payload::FileRegion`] — a region of a file streamed by the writer
//!   instead of held in memory.
//!
//! Buffer pools live outside this crate; they are consumed through
//! [`BufferAllocator`] and notified of releases through
//! [`BufferRecycler`]. A buffer notifies its recycler exactly once, on
//! [`Buffer::recycle`] or on drop, whichever comes first. This is the
//! release guard that every encode/decode error path relies on.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::error::{Result, ShuffleError};
use crate::protocol::ChannelId;

/// Semantic role of a payload, carried on the wire as one ordinal byte.
///
/// `is_buffer` splits the catalog in two: buffer kinds are user data and
/// are read into pooled network memory; event kinds are control payloads
/// read into unpooled memory sized exactly to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// No payload.
    None = 0,
    /// Bulk user records.
    DataBuffer = 1,
    /// A serialized runtime event.
    EventBuffer = 2,
    /// A runtime event that overtakes buffered data.
    PriorityEventBuffer = 3,
    /// An unaligned checkpoint barrier; pauses the channel until the
    /// consumer resumes it.
    UnalignedBarrier = 4,
    /// A watermark announcement.
    Watermark = 5,
    /// Marks the end of one segment within a subpartition.
    EndOfSegment = 6,
    /// Marks that no further user records will follow.
    EndOfData = 7,
    /// Terminal marker; the subpartition is exhausted.
    EndOfPartition = 8,
}

impl DataType {
    /// Decode a wire ordinal.
    pub fn from_ordinal(ordinal: u8) -> Result<Self> {
        match ordinal {
            0 => Ok(DataType::None),
            1 => Ok(DataType::DataBuffer),
            2 => Ok(DataType::EventBuffer),
            3 => Ok(DataType::PriorityEventBuffer),
            4 => Ok(DataType::UnalignedBarrier),
            5 => Ok(DataType::Watermark),
            6 => Ok(DataType::EndOfSegment),
            7 => Ok(DataType::EndOfData),
            8 => Ok(DataType::EndOfPartition),
            other => Err(ShuffleError::Decode(format!(
                "unknown data type ordinal: {other}"
            ))),
        }
    }

    /// The wire ordinal.
    #[inline]
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// True for user data; such payloads land in pooled network buffers.
    #[inline]
    pub fn is_buffer(self) -> bool {
        matches!(self, DataType::DataBuffer)
    }

    /// Whether emitting this kind pauses the channel until the consumer
    /// sends a resume.
    #[inline]
    pub fn pauses_channel(self) -> bool {
        matches!(self, DataType::UnalignedBarrier)
    }

    #[inline]
    pub fn is_end_of_data(self) -> bool {
        matches!(self, DataType::EndOfData)
    }

    #[inline]
    pub fn is_end_of_partition(self) -> bool {
        matches!(self, DataType::EndOfPartition)
    }
}

/// A file-backed payload region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRegion {
    pub path: PathBuf,
    pub offset: u64,
    pub length: u64,
}

/// Backing memory of a [`Buffer`].
pub enum Payload {
    /// One contiguous region.
    Plain(BytesMut),
    /// Fully-filled composite: parts written back-to-back on the wire,
    /// individual lengths recoverable from the message header.
    Composite(Vec<Bytes>),
    /// Data streamed from a file by the writer task.
    FileRegion(FileRegion),
}

/// Release notification target for pooled buffers.
///
/// Implemented by the (external) buffer pool; invoked exactly once per
/// buffer when it is recycled or dropped.
pub trait BufferRecycler: Send + Sync {
    fn on_recycle(&self);
}

/// The (external) buffer pool interface.
///
/// `allocate_pooled` returning `None` is meaningful, not an error: the
/// target channel has been released and no credit remains to honor. The
/// decoder then skips the payload bytes and continues.
pub trait BufferAllocator: Send + Sync {
    /// Allocate a pooled network buffer for a data payload headed to the
    /// given channel.
    fn allocate_pooled(&self, channel: ChannelId) -> Option<Buffer>;

    /// Allocate an unpooled buffer of exactly `size` bytes for an event
    /// payload.
    fn allocate_unpooled(&self, size: usize, data_type: DataType) -> Buffer;
}

/// An owned payload region with its wire attributes and release guard.
pub struct Buffer {
    payload: Payload,
    data_type: DataType,
    compressed: bool,
    recycler: Option<Arc<dyn BufferRecycler>>,
}

impl Buffer {
    /// Wrap a filled contiguous region.
    pub fn plain(data: BytesMut, data_type: DataType) -> Self {
        Self {
            payload: Payload::Plain(data),
            data_type,
            compressed: false,
            recycler: None,
        }
    }

    /// An empty buffer with `capacity` bytes reserved, ready to be
    /// filled via [`Buffer::append`].
    pub fn with_capacity(capacity: usize, data_type: DataType) -> Self {
        Self::plain(BytesMut::with_capacity(capacity), data_type)
    }

    /// A fully-filled composite of the given parts.
    pub fn composite(parts: Vec<Bytes>, data_type: DataType) -> Self {
        Self {
            payload: Payload::Composite(parts),
            data_type,
            compressed: false,
            recycler: None,
        }
    }

    /// A payload backed by a file region; the writer streams it.
    pub fn file_region(region: FileRegion, data_type: DataType) -> Self {
        Self {
            payload: Payload::FileRegion(region),
            data_type,
            compressed: false,
            recycler: None,
        }
    }

    /// Attach the pool this buffer must be returned to.
    pub fn with_recycler(mut self, recycler: Arc<dyn BufferRecycler>) -> Self {
        self.recycler = Some(recycler);
        self
    }

    /// Bytes this payload contributes to a frame body.
    pub fn readable_bytes(&self) -> usize {
        match &self.payload {
            Payload::Plain(data) => data.len(),
            Payload::Composite(parts) => parts.iter().map(Bytes::len).sum(),
            Payload::FileRegion(region) => region.length as usize,
        }
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn set_data_type(&mut self, data_type: DataType) {
        self.data_type = data_type;
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }

    /// The backing payload, for encoder pattern matching.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Lengths of the composite parts, `None` for plain and file-backed
    /// payloads.
    pub fn partial_sizes(&self) -> Option<Vec<u32>> {
        match &self.payload {
            Payload::Composite(parts) => {
                Some(parts.iter().map(|part| part.len() as u32).collect())
            }
            _ => None,
        }
    }

    /// Number of composite parts (0 for plain and file-backed payloads).
    pub fn num_parts(&self) -> usize {
        match &self.payload {
            Payload::Composite(parts) => parts.len(),
            _ => 0,
        }
    }

    /// In-memory slices for vectored writes. File-backed payloads have
    /// none; the writer streams them separately.
    pub fn as_chunks(&self) -> Vec<&[u8]> {
        match &self.payload {
            Payload::Plain(data) => {
                if data.is_empty() {
                    Vec::new()
                } else {
                    vec![&data[..]]
                }
            }
            Payload::Composite(parts) => parts
                .iter()
                .filter(|part| !part.is_empty())
                .map(|part| &part[..])
                .collect(),
            Payload::FileRegion(_) => Vec::new(),
        }
    }

    /// The backing file region, when the payload is file-backed.
    pub fn as_file_region(&self) -> Option<&FileRegion> {
        match &self.payload {
            Payload::FileRegion(region) => Some(region),
            _ => None,
        }
    }

    /// Append received bytes into a plain buffer being filled by the
    /// decoder.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.payload {
            Payload::Plain(target) => {
                target.extend_from_slice(data);
                Ok(())
            }
            _ => Err(ShuffleError::Decode(
                "cannot fill a non-plain buffer".into(),
            )),
        }
    }

    /// Return the buffer to its pool.
    ///
    /// Dropping the buffer has the same effect; either way the pool is
    /// notified exactly once.
    pub fn recycle(mut self) {
        if let Some(recycler) = self.recycler.take() {
            recycler.on_recycle();
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.take() {
            recycler.on_recycle();
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.payload {
            Payload::Plain(_) => "plain",
            Payload::Composite(_) => "composite",
            Payload::FileRegion(_) => "file-region",
        };
        f.debug_struct("Buffer")
            .field("kind", &kind)
            .field("readable_bytes", &self.readable_bytes())
            .field("data_type", &self.data_type)
            .field("compressed", &self.compressed)
            .finish()
    }
}

// Equality ignores the recycler: two buffers are equal when they would
// serialize identically.
impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        if self.data_type != other.data_type || self.compressed != other.compressed {
            return false;
        }
        match (&self.payload, &other.payload) {
            (Payload::Plain(a), Payload::Plain(b)) => a == b,
            (Payload::Composite(a), Payload::Composite(b)) => a == b,
            (Payload::FileRegion(a), Payload::FileRegion(b)) => a == b,
            _ => false,
        }
    }
}

/// A trivial allocator backed by the process heap.
///
/// Pooled requests always succeed and carry no recycler; useful for
/// tests and tools that do not manage network memory. Production
/// deployments provide their own pool behind [`BufferAllocator`].
#[derive(Debug, Clone)]
pub struct UnpooledAllocator {
    buffer_size: usize,
}

impl UnpooledAllocator {
    /// Default pooled buffer capacity, matching the common network
    /// segment size.
    pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }
}

impl Default for UnpooledAllocator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BUFFER_SIZE)
    }
}

impl BufferAllocator for UnpooledAllocator {
    fn allocate_pooled(&self, _channel: ChannelId) -> Option<Buffer> {
        Some(Buffer::with_capacity(
            self.buffer_size,
            DataType::DataBuffer,
        ))
    }

    fn allocate_unpooled(&self, size: usize, data_type: DataType) -> Buffer {
        Buffer::with_capacity(size, data_type)
    }
}

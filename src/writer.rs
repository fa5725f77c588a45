//! Dedicated writer task for flushing encoded frames.
//!
//! Frames reach the transport through an mpsc channel feeding one writer
//! task per connection:
//!
//! ```text
//! Producer logic ─┐
//! Flow control   ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Socket
//! Error reporting─┘
//! ```
//!
//! The task batches ready frames and writes header and payload slices
//! with a single vectored write; file-backed payloads are streamed from
//! disk in sequence order. The channel is bounded, so enqueueing
//! suspends when the transport falls behind - the only suspension point
//! on the send path.
//!
//! Payload release: every payload buffer is recycled exactly once, on
//! successful flush, on write failure, and for frames still queued when
//! the task dies - the buffer's release guard fires when the frame is
//! dropped on any of those paths.

use std::io::{IoSlice, SeekFrom};

use tokio::io::{AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::buffer::FileRegion;
use crate::error::{Result, ShuffleError};
use crate::protocol::OutboundFrame;

/// Default channel capacity for the frame queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch into a single vectored write.
const MAX_BATCH_SIZE: usize = 64;

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Capacity of the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable; shared by everything that emits on the connection.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame for writing.
    ///
    /// Suspends while the queue is full. On a closed connection the
    /// frame is dropped - recycling its payload - and
    /// [`ShuffleError::ConnectionClosed`] is returned.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| ShuffleError::ConnectionClosed)
    }

    /// Whether the writer task is still accepting frames.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Spawn the writer task for a connection.
///
/// Returns the sending handle and the task's join handle; the task ends
/// when every handle is dropped or the transport fails.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

/// Main writer loop: batch ready frames and flush them.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(frame) => frame,
            None => return Ok(()),
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        if let Err(err) = write_batch(&mut writer, &batch).await {
            tracing::error!(error = %err, "writer task failed; releasing queued frames");
            return Err(err);
        }
        // Frames drop here: payloads return to their pools.
    }
}

/// Write a batch, keeping frame order: runs of in-memory frames go out
/// as one vectored write, file-backed payloads are streamed in place.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut run_start = 0;
    for (index, frame) in batch.iter().enumerate() {
        let region = frame.payload.as_ref().and_then(|p| p.as_file_region());
        if let Some(region) = region {
            write_memory_frames(writer, &batch[run_start..index]).await?;
            writer.write_all(&frame.header).await?;
            write_file_region(writer, region).await?;
            run_start = index + 1;
        }
    }
    write_memory_frames(writer, &batch[run_start..]).await?;
    writer.flush().await?;
    Ok(())
}

/// All in-memory slices of one frame, header first.
fn frame_slices(frame: &OutboundFrame) -> Vec<&[u8]> {
    let mut slices = vec![&frame.header[..]];
    if let Some(payload) = &frame.payload {
        slices.extend(payload.as_chunks());
    }
    slices
}

/// Vectored write of a run of in-memory frames, continuing after short
/// writes.
async fn write_memory_frames<W>(writer: &mut W, frames: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if frames.is_empty() {
        return Ok(());
    }

    let total_size: usize = frames
        .iter()
        .map(|frame| frame_slices(frame).iter().map(|s| s.len()).sum::<usize>())
        .sum();

    let mut total_written = 0;
    while total_written < total_size {
        let slices = build_remaining_slices(frames, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(ShuffleError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }
    Ok(())
}

/// Build the IoSlice array for the bytes not yet written.
fn build_remaining_slices(frames: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(frames.len() * 2);
    let mut offset = 0;

    for frame in frames {
        for chunk in frame_slices(frame) {
            let start = offset;
            let end = offset + chunk.len();
            if skip_bytes < end && !chunk.is_empty() {
                let begin = skip_bytes.saturating_sub(start);
                slices.push(IoSlice::new(&chunk[begin..]));
            }
            offset = end;
        }
    }
    slices
}

/// Stream a file-backed payload region to the transport.
async fn write_file_region<W>(writer: &mut W, region: &FileRegion) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut file = tokio::fs::File::open(&region.path).await?;
    file.seek(SeekFrom::Start(region.offset)).await?;

    let mut limited = tokio::io::AsyncReadExt::take(file, region.length);
    let copied = tokio::io::copy(&mut limited, writer).await?;
    if copied != region.length {
        return Err(ShuffleError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "file region ended after {copied} of {} bytes",
                region.length
            ),
        )));
    }
    Ok(())
}

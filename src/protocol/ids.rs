//! Fixed-width opaque identifier codecs.
//!
//! The protocol never interprets these ids; they are compared for
//! equality and routed. Each type knows its own wire length and reads and
//! writes itself Big Endian, so the message catalog can size frames
//! before encoding.

use std::fmt;

use bytes::{Buf, BufMut};

use crate::error::{Result, ShuffleError};

fn ensure_remaining(buf: &mut impl Buf, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(ShuffleError::StreamCorrupted(format!(
            "truncated frame: {} more bytes needed for {what}",
            needed - buf.remaining()
        )));
    }
    Ok(())
}

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name([u8; Self::WIRE_LENGTH]);

        impl $name {
            /// Fixed wire length in bytes.
            pub const WIRE_LENGTH: usize = 16;

            /// Wrap raw id bytes.
            pub const fn new(bytes: [u8; Self::WIRE_LENGTH]) -> Self {
                Self(bytes)
            }

            /// The raw id bytes.
            pub fn as_bytes(&self) -> &[u8; Self::WIRE_LENGTH] {
                &self.0
            }

            /// Write the id to a buffer.
            pub fn write_to(&self, buf: &mut impl BufMut) {
                buf.put_slice(&self.0);
            }

            /// Read an id from a buffer.
            pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
                ensure_remaining(buf, Self::WIRE_LENGTH, stringify!($name))?;
                let mut bytes = [0u8; Self::WIRE_LENGTH];
                buf.copy_to_slice(&mut bytes);
                Ok(Self(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl From<u128> for $name {
            fn from(value: u128) -> Self {
                Self(value.to_be_bytes())
            }
        }
    };
}

opaque_id! {
    /// Identifies a logical receive channel on the consumer side.
    ChannelId
}

opaque_id! {
    /// Identifies an intermediate result partition on the producer side.
    IntermediatePartitionId
}

opaque_id! {
    /// Identifies one execution attempt of the producing task.
    ProducerAttemptId
}

/// Identifies a producer-side result partition: the intermediate
/// partition together with the attempt that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionId {
    pub intermediate: IntermediatePartitionId,
    pub producer: ProducerAttemptId,
}

impl PartitionId {
    /// Fixed wire length in bytes.
    pub const WIRE_LENGTH: usize =
        IntermediatePartitionId::WIRE_LENGTH + ProducerAttemptId::WIRE_LENGTH;

    pub fn new(intermediate: IntermediatePartitionId, producer: ProducerAttemptId) -> Self {
        Self {
            intermediate,
            producer,
        }
    }

    pub fn write_to(&self, buf: &mut impl BufMut) {
        self.intermediate.write_to(buf);
        self.producer.write_to(buf);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            intermediate: IntermediatePartitionId::read_from(buf)?,
            producer: ProducerAttemptId::read_from(buf)?,
        })
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.intermediate, self.producer)
    }
}

/// A set of non-negative subpartition indices, encoded as sorted
/// inclusive ranges:
///
/// ```text
/// ⟨num_ranges:u32, (start:u32, end:u32) · num_ranges⟩
/// ```
///
/// Ranges are ascending and non-overlapping, so the byte length of the
/// encoding is a function of the value alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubpartitionIndexSet {
    ranges: Vec<(u32, u32)>,
}

impl SubpartitionIndexSet {
    /// A set covering a single inclusive range.
    pub fn from_range(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self {
            ranges: vec![(start, end)],
        }
    }

    /// A set containing exactly one index.
    pub fn single(index: u32) -> Self {
        Self::from_range(index, index)
    }

    /// Build a set from arbitrary indices, coalescing adjacent runs.
    pub fn from_indices(indices: &[u32]) -> Self {
        let mut sorted: Vec<u32> = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut ranges: Vec<(u32, u32)> = Vec::new();
        for index in sorted {
            match ranges.last_mut() {
                Some((_, end)) if *end + 1 == index => *end = index,
                _ => ranges.push((index, index)),
            }
        }
        Self { ranges }
    }

    /// Wire length of this value: 4 bytes for the range count plus 8 per
    /// range.
    pub fn wire_length(&self) -> usize {
        4 + 8 * self.ranges.len()
    }

    /// Whether the set contains the given index.
    pub fn contains(&self, index: u32) -> bool {
        self.ranges
            .iter()
            .any(|&(start, end)| start <= index && index <= end)
    }

    /// Number of indices in the set.
    pub fn len(&self) -> usize {
        self.ranges
            .iter()
            .map(|&(start, end)| (end - start + 1) as usize)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterate over the contained indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|&(start, end)| start..=end)
    }

    pub fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.ranges.len() as u32);
        for &(start, end) in &self.ranges {
            buf.put_u32(start);
            buf.put_u32(end);
        }
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(buf, 4, "subpartition index set")?;
        let num_ranges = buf.get_u32() as usize;
        ensure_remaining(buf, num_ranges.saturating_mul(8), "subpartition index ranges")?;

        let mut ranges = Vec::with_capacity(num_ranges);
        let mut previous_end: Option<u32> = None;
        for _ in 0..num_ranges {
            let start = buf.get_u32();
            let end = buf.get_u32();
            if start > end {
                return Err(ShuffleError::Decode(format!(
                    "subpartition range {start}..={end} is inverted"
                )));
            }
            if let Some(prev) = previous_end {
                if start <= prev {
                    return Err(ShuffleError::Decode(
                        "subpartition ranges overlap or are out of order".into(),
                    ));
                }
            }
            previous_end = Some(end);
            ranges.push((start, end));
        }
        Ok(Self { ranges })
    }
}

impl fmt::Display for SubpartitionIndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (start, end)) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        write!(f, "]")
    }
}

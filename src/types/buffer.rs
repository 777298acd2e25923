//! Pipeline buffers and their timing

use std::sync::Arc;
use std::time::Duration;

use super::FrameItem;
use super::frame::MAX_SEGMENTS;
use crate::{EdgeError, Result};

/// A pipeline buffer: one or more memory blocks plus timing metadata.
///
/// This is the unit the host pipeline pushes into the publisher and pulls
/// out of the subscriber. Memory blocks are shared, so converting between
/// buffers and [`FrameItem`]s moves reference counts, not bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    memories: Vec<Arc<[u8]>>,

    /// Presentation timestamp
    pub pts: Option<Duration>,

    /// Decode timestamp
    pub dts: Option<Duration>,

    /// Buffer duration
    pub duration: Option<Duration>,
}

/// Start and end running time derived from a buffer's timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferTimes {
    pub start: Option<Duration>,
    pub end: Option<Duration>,
}

impl Buffer {
    /// Create an empty buffer with no memory and no timestamps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding a single memory block.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut buffer = Self::new();
        buffer.memories.push(Arc::from(data));
        buffer
    }

    /// Append one memory block.
    pub fn append_memory(&mut self, memory: impl Into<Arc<[u8]>>) {
        self.memories.push(memory.into());
    }

    /// Builder-style [`append_memory`](Self::append_memory).
    pub fn with_memory(mut self, memory: impl Into<Arc<[u8]>>) -> Self {
        self.append_memory(memory);
        self
    }

    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: Duration) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Number of memory blocks.
    pub fn n_memory(&self) -> usize {
        self.memories.len()
    }

    /// Borrow memory block `index`.
    pub fn memory(&self, index: usize) -> Option<&[u8]> {
        self.memories.get(index).map(|m| m.as_ref())
    }

    /// Iterate over memory blocks in order.
    pub fn memories(&self) -> impl Iterator<Item = &[u8]> {
        self.memories.iter().map(|m| m.as_ref())
    }

    /// Total size in bytes across all memory blocks.
    pub fn size(&self) -> usize {
        self.memories.iter().map(|m| m.len()).sum()
    }

    /// Copy all memory blocks into one contiguous vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        for memory in &self.memories {
            out.extend_from_slice(memory);
        }
        out
    }

    /// Running time covered by this buffer.
    ///
    /// The start is the decode timestamp when valid, otherwise the
    /// presentation timestamp. The end is only known when both a start and
    /// a duration are valid, and stays unknown when the sum overflows.
    pub fn times(&self) -> BufferTimes {
        let Some(sync_ts) = self.dts.or(self.pts) else {
            return BufferTimes::default();
        };

        BufferTimes { start: Some(sync_ts), end: self.duration.and_then(|d| sync_ts.checked_add(d)) }
    }
}

impl TryFrom<&Buffer> for FrameItem {
    type Error = EdgeError;

    fn try_from(buffer: &Buffer) -> Result<Self> {
        if buffer.memories.is_empty() {
            return Err(EdgeError::invalid_frame("buffer has no memory blocks"));
        }
        if buffer.memories.len() > MAX_SEGMENTS {
            return Err(EdgeError::invalid_frame(format!(
                "buffer has {} memory blocks, limit is {}",
                buffer.memories.len(),
                MAX_SEGMENTS
            )));
        }
        Ok(FrameItem::new(buffer.memories.clone()))
    }
}

impl From<FrameItem> for Buffer {
    fn from(item: FrameItem) -> Self {
        Self { memories: item.into_segments(), ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_prefer_dts_over_pts() {
        let buffer = Buffer::new()
            .with_pts(Duration::from_millis(40))
            .with_dts(Duration::from_millis(20))
            .with_duration(Duration::from_millis(33));

        let times = buffer.times();
        assert_eq!(times.start, Some(Duration::from_millis(20)));
        assert_eq!(times.end, Some(Duration::from_millis(53)));
    }

    #[test]
    fn times_leave_end_unknown_on_overflow() {
        let buffer = Buffer::new().with_pts(Duration::MAX).with_duration(Duration::from_secs(1));

        let times = buffer.times();
        assert_eq!(times.start, Some(Duration::MAX));
        assert_eq!(times.end, None);
    }

    #[test]
    fn times_fall_back_to_pts() {
        let buffer = Buffer::new().with_pts(Duration::from_secs(1));

        let times = buffer.times();
        assert_eq!(times.start, Some(Duration::from_secs(1)));
        assert_eq!(times.end, None);
    }

    #[test]
    fn times_without_timestamps_are_unknown() {
        let buffer = Buffer::new().with_duration(Duration::from_millis(10));
        assert_eq!(buffer.times(), BufferTimes::default());
    }

    #[test]
    fn buffer_to_frame_shares_memory() {
        let buffer = Buffer::new().with_memory(vec![1u8, 2, 3]).with_memory(vec![4u8]);
        let frame = FrameItem::try_from(&buffer).expect("valid buffer");

        assert_eq!(frame.count(), 2);
        assert_eq!(frame.segment(0), buffer.memory(0));
        assert_eq!(frame.segment(1), buffer.memory(1));
    }

    #[test]
    fn empty_buffer_cannot_become_a_frame() {
        assert!(FrameItem::try_from(&Buffer::new()).is_err());
    }

    #[test]
    fn frame_to_buffer_keeps_segments() {
        let frame = FrameItem::from_segments([vec![0xAAu8; 4], vec![0xBBu8; 8]]);
        let buffer = Buffer::from(frame);

        assert_eq!(buffer.n_memory(), 2);
        assert_eq!(buffer.size(), 12);
        assert_eq!(buffer.to_vec()[..4], [0xAA; 4]);
        assert_eq!(buffer.to_vec()[4..], [0xBB; 8]);
        assert_eq!(buffer.pts, None);
    }
}

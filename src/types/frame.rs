//! Frame items exchanged with the transport

use std::sync::Arc;

use crate::{EdgeError, Result};

/// Maximum number of memory segments a single frame may carry.
///
/// Matches the memory limit of a host pipeline buffer, so every buffer maps
/// onto exactly one frame item.
pub const MAX_SEGMENTS: usize = 16;

/// One unit of media data crossing the publisher/subscriber boundary.
///
/// A frame is an ordered list of byte segments (for example header and
/// payload living in separate allocations). Segments are reference counted,
/// so cloning a frame for fan-out never copies payload bytes.
///
/// A frame with zero segments can be represented, because a peer may send
/// one, but [`FrameItem::validate`] rejects it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameItem {
    segments: Vec<Arc<[u8]>>,
}

impl FrameItem {
    /// Create a frame from already shared segments.
    pub fn new(segments: Vec<Arc<[u8]>>) -> Self {
        Self { segments }
    }

    /// Create a frame by taking ownership of each segment.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<[u8]>>,
    {
        Self { segments: segments.into_iter().map(Into::into).collect() }
    }

    /// Append one segment at the end of the frame.
    pub fn push_segment(&mut self, segment: impl Into<Arc<[u8]>>) -> Result<()> {
        if self.segments.len() >= MAX_SEGMENTS {
            return Err(EdgeError::invalid_frame(format!(
                "frame already holds the maximum of {} segments",
                MAX_SEGMENTS
            )));
        }
        self.segments.push(segment.into());
        Ok(())
    }

    /// Number of segments.
    pub fn count(&self) -> usize {
        self.segments.len()
    }

    /// Whether the frame carries no segments at all.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Borrow segment `index`, if present.
    pub fn segment(&self, index: usize) -> Option<&[u8]> {
        self.segments.get(index).map(|s| s.as_ref())
    }

    /// Iterate over the segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> {
        self.segments.iter().map(|s| s.as_ref())
    }

    /// Sum of all segment lengths in bytes.
    pub fn total_len(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum()
    }

    /// Check the segment count is within `1..=MAX_SEGMENTS`.
    pub fn validate(&self) -> Result<()> {
        match self.segments.len() {
            0 => Err(EdgeError::invalid_frame("frame has no segments")),
            n if n > MAX_SEGMENTS => Err(EdgeError::invalid_frame(format!(
                "frame has {} segments, limit is {}",
                n, MAX_SEGMENTS
            ))),
            _ => Ok(()),
        }
    }

    /// Consume the frame and hand back its segments.
    pub fn into_segments(self) -> Vec<Arc<[u8]>> {
        self.segments
    }
}

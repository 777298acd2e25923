//! Core types for frames crossing the edge boundary.
//!
//! - [`FrameItem`] is what the transport sends and receives: an ordered list of
//!   shared byte segments.
//! - [`Buffer`] is what the host pipeline pushes and pulls: memory blocks plus
//!   PTS/DTS/duration.
//! - [`FlowReturn`] is the host-facing outcome of a data-flow call.
//! - [`EdgeStats`] counts traffic through an adapter.
//!
//! ## Usage Example
//!
//! ```rust
//! use edgestream::types::{Buffer, FrameItem};
//!
//! let buffer = Buffer::new()
//!     .with_memory(b"head".to_vec())
//!     .with_memory(b"payload!".to_vec());
//!
//! let frame = FrameItem::try_from(&buffer).unwrap();
//! assert_eq!(frame.count(), 2);
//! assert_eq!(frame.total_len(), 12);
//!
//! let back = Buffer::from(frame);
//! assert_eq!(back.to_vec(), b"headpayload!");
//! ```

mod buffer;
mod flow;
mod frame;

pub use buffer::{Buffer, BufferTimes};
pub use flow::FlowReturn;
pub use frame::{FrameItem, MAX_SEGMENTS};

use serde::{Deserialize, Serialize};

/// Traffic counters for an adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeStats {
    /// Frames sent (publisher) or produced (subscriber)
    pub frames: u64,

    /// Payload bytes across those frames
    pub bytes: u64,

    /// Inbound events dropped without reaching the pipeline
    pub dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    prop_compose! {
        fn arb_segments()(
            segments in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..=MAX_SEGMENTS)
        ) -> Vec<Vec<u8>> {
            segments
        }
    }

    proptest! {
        #[test]
        fn prop_buffer_frame_conversion_preserves_bytes(segments in arb_segments()) {
            let mut buffer = Buffer::new();
            for segment in &segments {
                buffer.append_memory(segment.clone());
            }

            let frame = FrameItem::try_from(&buffer).unwrap();
            prop_assert_eq!(frame.count(), segments.len());
            prop_assert_eq!(frame.total_len(), buffer.size());

            let back = Buffer::from(frame);
            let expected: Vec<u8> = segments.concat();
            prop_assert_eq!(back.to_vec(), expected);
            prop_assert_eq!(back.n_memory(), segments.len());
        }
    }

    #[test]
    fn flow_return_from_result() {
        let ok: crate::Result<()> = Ok(());
        assert_eq!(FlowReturn::from_result(&ok), FlowReturn::Ok);

        let flushing: crate::Result<()> = Err(crate::EdgeError::flushing());
        assert_eq!(FlowReturn::from_result(&flushing), FlowReturn::Flushing);
        assert!(!FlowReturn::from_result(&flushing).is_ok());
    }
}

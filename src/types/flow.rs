//! Flow results reported to the host pipeline

use serde::{Deserialize, Serialize};

/// Outcome of a data-flow call as seen by the host pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowReturn {
    /// The buffer was handled
    Ok,

    /// The element is shutting down; the caller should stop pushing or pulling
    Flushing,

    /// The call failed for this buffer
    Error,
}

impl FlowReturn {
    /// Collapse a result into a flow return.
    pub fn from_result<T>(result: &crate::Result<T>) -> Self {
        match result {
            Ok(_) => FlowReturn::Ok,
            Err(err) => FlowReturn::from(err),
        }
    }

    pub fn is_ok(self) -> bool {
        self == FlowReturn::Ok
    }
}

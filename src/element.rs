//! Hook traits the host pipeline drives
//!
//! A [`Sink`] receives buffers from the pipeline (the publisher); a
//! [`Source`] hands buffers to the pipeline on demand (the subscriber).
//!
//! Sources take `&self` everywhere: the pipeline pulls on its streaming
//! thread while the application may call [`Source::stop`] from another one,
//! and stopping must be able to unblock a pull in progress.

use crate::types::{Buffer, BufferTimes, FlowReturn};
use crate::Result;

/// Element that produces buffers for the pipeline.
pub trait Source: Send + Sync {
    /// Bring the element up. Must succeed before the first `produce`.
    fn start(&self) -> Result<()>;

    /// Tear the element down. Never fails and is safe to call at any time.
    fn stop(&self);

    /// Block until the next buffer is available.
    fn produce(&self) -> Result<Buffer>;

    /// Running time covered by `buffer`.
    fn get_times(&self, buffer: &Buffer) -> BufferTimes {
        buffer.times()
    }

    /// Whether the element can seek. Live sources cannot.
    fn is_seekable(&self) -> bool {
        false
    }

    /// [`produce`](Source::produce) reported as a flow result.
    fn produce_flow(&self) -> (FlowReturn, Option<Buffer>) {
        match self.produce() {
            Ok(buffer) => (FlowReturn::Ok, Some(buffer)),
            Err(e) => (FlowReturn::from(&e), None),
        }
    }

    fn name(&self) -> &str;
}

/// Element that consumes buffers from the pipeline.
pub trait Sink: Send {
    fn start(&mut self) -> Result<()>;

    /// Tear the element down. Never fails and is safe to call at any time.
    fn stop(&mut self);

    /// Handle one buffer.
    fn accept(&mut self, buffer: &Buffer) -> Result<()>;

    /// Handle a list of buffers in order, stopping at the first failure.
    fn accept_list(&mut self, buffers: &[Buffer]) -> Result<()> {
        buffers.iter().try_for_each(|buffer| self.accept(buffer))
    }

    /// The upstream format changed to `caps`.
    fn negotiate(&mut self, caps: &str) -> Result<()>;

    fn name(&self) -> &str;
}

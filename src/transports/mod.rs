//! Transport implementations
//!
//! - [`TcpTransport`]: direct-stream transport over TCP sockets
//! - [`MemoryTransport`]: in-process transport for tests and single-process pipelines

pub mod memory;
pub mod tcp;
mod wire;

pub use memory::{FailPoint, MemoryHandle, MemoryTransport};
pub use tcp::{TcpHandle, TcpTransport};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a callback thread panicked while
/// holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

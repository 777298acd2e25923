//! Test utilities shared by unit tests and benchmarks
//!
//! Helpers for building frames and standing up in-memory publishers without
//! going through a full adapter.

#![cfg(any(test, feature = "benchmark"))]

use crate::transport::{EdgeFlag, EdgeHandle, EdgeTransport, INFO_HOST, INFO_PORT};
use crate::transports::{MemoryHandle, MemoryTransport};
use crate::types::FrameItem;
use crate::ConnectType;

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
///
/// Later calls are no-ops, so every test may call it.
#[cfg(test)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Frame whose segments have the given lengths, each filled with its index.
pub fn frame_with_lengths(lengths: &[usize]) -> FrameItem {
    FrameItem::from_segments(
        lengths.iter().enumerate().map(|(i, &len)| vec![i as u8; len]),
    )
}

/// Started send handle listening on `host:port` inside `transport`.
///
/// Panics if the address is taken; tests pick distinct ports.
pub fn memory_listener(transport: &MemoryTransport, host: &str, port: u16) -> MemoryHandle {
    let mut handle = transport
        .create("test-listener", ConnectType::Tcp, EdgeFlag::Send)
        .expect("memory transport accepts TCP");
    handle.set_info(INFO_HOST, host).expect("set HOST");
    handle.set_info(INFO_PORT, &port.to_string()).expect("set PORT");
    handle.start().expect("listener should start");
    handle
}

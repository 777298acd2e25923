//! Publisher/subscriber adapters between media pipelines and edge transports.
//!
//! Edgestream connects a local pull/push frame pipeline to a network
//! publish/subscribe transport. A publisher forwards every buffer the pipeline
//! pushes; a subscriber queues frames from the network until the pipeline
//! pulls them.
//!
//! # Features
//!
//! - **Handle lifecycle**: one state machine shared by both directions, with
//!   cleanup on every failure path
//! - **Caps negotiation**: format changes accumulate in a history carried next
//!   to the data, so late subscribers see every format
//! - **Decoupled receive path**: network callbacks never block on the pipeline
//! - **Pluggable transports**: TCP for real deployments, in-memory for tests
//!
//! ## Example (TCP)
//!
//! ```rust,no_run
//! use edgestream::{Edge, EdgeConfig};
//! use edgestream::element::{Sink, Source};
//! use edgestream::types::Buffer;
//!
//! fn main() -> edgestream::Result<()> {
//!     let mut publisher = Edge::publish(EdgeConfig::new("0.0.0.0", 3000))?;
//!     publisher.negotiate("video/x-raw,format=RGB,width=640,height=480")?;
//!
//!     let subscriber = Edge::subscribe(EdgeConfig::new("127.0.0.1", 3000))?;
//!
//!     publisher.accept(&Buffer::from_slice(&[0u8; 640 * 480 * 3]))?;
//!     let buffer = subscriber.produce()?;
//!     println!("received {} bytes", buffer.size());
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
pub mod element;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Transport boundary
pub mod lifecycle;
pub mod negotiation;
pub mod queue;
pub mod transport;
pub mod transports;

// Pipeline-facing adapters
pub mod adapters;

// Core exports
pub use adapters::{PublisherAdapter, SubscriberAdapter};
pub use config::{ConnectType, EdgeConfig};
pub use error::*;
pub use lifecycle::LifecycleState;
pub use negotiation::{CAPS_DELIMITER, CapsHistory, SchemaDescriptor};
pub use types::{Buffer, EdgeStats, FlowReturn, FrameItem};

// Transport exports
pub use transport::{EdgeEvent, EdgeFlag, EdgeHandle, EdgeTransport};
pub use transports::{MemoryHandle, MemoryTransport, TcpHandle, TcpTransport};

use element::{Sink, Source};

/// Entry point for TCP publishers and subscribers.
///
/// Both constructors return an adapter that is already started. Build the
/// adapters directly when a different transport is needed or when start
/// should happen later.
///
/// # Examples
///
/// ```rust,no_run
/// use edgestream::{Edge, EdgeConfig};
///
/// # fn main() -> edgestream::Result<()> {
/// let publisher = Edge::publish(EdgeConfig::new("localhost", 0))?;
/// println!("listening on port {:?}", publisher.local_port());
/// # Ok(())
/// # }
/// ```
pub struct Edge;

impl Edge {
    /// Listen on `config.host:config.port` and start publishing.
    ///
    /// # Errors
    ///
    /// Returns `StartFailed` if the configuration is invalid, the connection
    /// type is not supported, or the address cannot be bound.
    pub fn publish(config: EdgeConfig) -> Result<PublisherAdapter<TcpTransport>> {
        let mut publisher = PublisherAdapter::new(TcpTransport::new(), config);
        publisher.start()?;
        Ok(publisher)
    }

    /// Connect to the publisher at `config.host:config.port`.
    ///
    /// # Errors
    ///
    /// Returns `StartFailed` if the configuration is invalid, the connection
    /// type is not supported, or the publisher cannot be reached.
    pub fn subscribe(config: EdgeConfig) -> Result<SubscriberAdapter<TcpTransport>> {
        let subscriber = SubscriberAdapter::new(TcpTransport::new(), config);
        subscriber.start()?;
        Ok(subscriber)
    }
}

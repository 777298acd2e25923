//! Pipeline adapters on top of an edge transport.
//!
//! - [`PublisherAdapter`] is a [`Sink`](crate::element::Sink): buffers pushed
//!   by the pipeline are sent to every connected subscriber, and caps changes
//!   are appended to the handle's caps history.
//! - [`SubscriberAdapter`] is a [`Source`](crate::element::Source): frames
//!   received from the publisher are queued until the pipeline pulls them.
//!
//! Both drive their handle through [`HandleLifecycle`](crate::lifecycle::HandleLifecycle)
//! and report every start-sequence failure as `StartFailed`, with the failing
//! step kept as the error source.
//!
//! # Example
//!
//! ```rust
//! use edgestream::adapters::{PublisherAdapter, SubscriberAdapter};
//! use edgestream::element::{Sink, Source};
//! use edgestream::types::Buffer;
//! use edgestream::{EdgeConfig, MemoryTransport};
//!
//! # fn main() -> edgestream::Result<()> {
//! let transport = MemoryTransport::new();
//!
//! let mut publisher = PublisherAdapter::new(transport.clone(), EdgeConfig::new("127.0.0.1", 5000));
//! publisher.start()?;
//! publisher.negotiate("video/x-raw,width=640")?;
//!
//! let subscriber = SubscriberAdapter::new(transport, EdgeConfig::new("127.0.0.1", 5000));
//! subscriber.start()?;
//! assert_eq!(subscriber.caps().as_deref(), Some("video/x-raw,width=640"));
//!
//! publisher.accept(&Buffer::from_slice(b"frame"))?;
//! assert_eq!(subscriber.produce()?.to_vec(), b"frame");
//!
//! subscriber.stop();
//! publisher.stop();
//! # Ok(())
//! # }
//! ```

mod publisher;
mod subscriber;

pub use publisher::PublisherAdapter;
pub use subscriber::SubscriberAdapter;

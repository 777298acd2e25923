//! Transport handle traits
//!
//! A transport is a factory for [`EdgeHandle`]s. A handle is an opaque
//! connection endpoint with a direction, a string metadata store and an event
//! callback. Adapters only ever talk to a transport through these two traits,
//! so the same adapter code runs over TCP, the in-memory transport used in
//! tests, or any other backend.

use std::fmt;
use std::sync::Arc;

use crate::config::ConnectType;
use crate::types::FrameItem;
use crate::Result;

/// Metadata key carrying the accumulated caps history.
pub const INFO_CAPS: &str = "CAPS";
/// Metadata key for the address a publisher listens on.
pub const INFO_HOST: &str = "HOST";
/// Metadata key for the port a publisher listens on. Updated with the real
/// port when the transport picks one.
pub const INFO_PORT: &str = "PORT";
/// Metadata key for the address a subscriber connects to.
pub const INFO_DEST_HOST: &str = "DEST_HOST";
/// Metadata key for the port a subscriber connects to.
pub const INFO_DEST_PORT: &str = "DEST_PORT";

/// Direction a handle is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeFlag {
    /// The handle sends frames (publisher)
    Send,
    /// The handle receives frames (subscriber)
    Recv,
}

impl fmt::Display for EdgeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeFlag::Send => f.write_str("send"),
            EdgeFlag::Recv => f.write_str("recv"),
        }
    }
}

/// Event delivered to a handle's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeEvent {
    /// A frame arrived from the peer
    NewDataReceived(FrameItem),

    /// The peer published a new caps history
    Capability(String),

    /// A peer connection was established
    ConnectionCompleted,

    /// A peer connection was closed
    ConnectionClosed,

    /// The transport will not invoke the callback again
    CallbackReleased,

    /// The transport received an event but could not decode its payload
    Malformed(String),

    /// An event kind this crate does not know about
    Unknown(u8),
}

impl EdgeEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EdgeEvent::NewDataReceived(_) => "new-data-received",
            EdgeEvent::Capability(_) => "capability",
            EdgeEvent::ConnectionCompleted => "connection-completed",
            EdgeEvent::ConnectionClosed => "connection-closed",
            EdgeEvent::CallbackReleased => "callback-released",
            EdgeEvent::Malformed(_) => "malformed",
            EdgeEvent::Unknown(_) => "unknown",
        }
    }
}

/// Callback invoked by the transport, possibly from several threads at once.
pub type EventCallback = Arc<dyn Fn(EdgeEvent) + Send + Sync>;

/// Factory for transport handles.
pub trait EdgeTransport: Send + Sync + 'static {
    /// Handle type produced by this transport
    type Handle: EdgeHandle;

    /// Allocate a handle.
    ///
    /// Transports reject connection types they cannot serve.
    fn create(&self, id: &str, connect_type: ConnectType, flag: EdgeFlag) -> Result<Self::Handle>;
}

/// An opaque transport endpoint.
///
/// Apart from [`release`](EdgeHandle::release), operations are only meaningful
/// between creation and release. Implementations must make `release`
/// idempotent and must not invoke the event callback once it returns.
pub trait EdgeHandle: Send + 'static {
    /// Store a string value in the handle's metadata.
    fn set_info(&mut self, key: &str, value: &str) -> Result<()>;

    /// Read a string value from the handle's metadata.
    fn get_info(&self, key: &str) -> Result<Option<String>>;

    /// Install the event sink. Must happen before [`start`](EdgeHandle::start).
    fn set_event_callback(&mut self, callback: EventCallback) -> Result<()>;

    /// Activate the transport's internal processing.
    fn start(&mut self) -> Result<()>;

    /// Deactivate the transport's internal processing.
    fn stop(&mut self) -> Result<()>;

    /// Establish the logical connection to the peer.
    fn connect(&mut self, host: &str, port: u16) -> Result<()>;

    /// Hand one frame to the transport.
    fn send(&mut self, frame: FrameItem) -> Result<()>;

    /// Drop all transport resources. Safe to call more than once.
    fn release(&mut self);
}

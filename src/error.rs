//! Error types for edge publishing and subscribing.
//!
//! All fallible operations in this crate return [`EdgeError`]. Variants follow
//! the lifecycle of an edge connection so callers can tell which step failed
//! and whether it is worth retrying.
//!
//! ## Error Categories
//!
//! - **Lifecycle Errors**: `CreateFailed`, `StartFailed`, `ConnectFailed`. Terminal for
//!   the current start attempt; the handle has already been released.
//! - **Per-frame Errors**: `SendFailed`, `ProduceFailed`. Reported for a single call;
//!   the adapter keeps running.
//! - **Negotiation Errors**: `NegotiationFailed`, raised when the caps history
//!   could not be read or written.
//! - **Transport Errors**: raw failures reported by an [`EdgeHandle`](crate::EdgeHandle)
//!   implementation, usually wrapped by one of the categories above.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use edgestream::EdgeError;
//!
//! let error = EdgeError::connect_failed("peer refused connection");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```
//!
//! ## Flow Results
//!
//! Host pipelines speak in flow results rather than rich errors:
//!
//! ```rust
//! use edgestream::{EdgeError, FlowReturn};
//!
//! let closed = EdgeError::flushing();
//! assert_eq!(FlowReturn::from(&closed), FlowReturn::Flushing);
//!
//! let send = EdgeError::send_failed("peer went away");
//! assert_eq!(FlowReturn::from(&send), FlowReturn::Error);
//! ```

use thiserror::Error;

use crate::lifecycle::LifecycleState;
use crate::types::FlowReturn;

/// Boxed error used as the `source` of wrapped failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for edge operations.
pub type Result<T, E = EdgeError> = std::result::Result<T, E>;

/// Main error type for edge operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EdgeError {
    #[error("Failed to create edge handle: {reason}")]
    CreateFailed {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to start edge handle: {reason}")]
    StartFailed {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to connect to {host}:{port}: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to send frame: {reason}")]
    SendFailed {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to produce frame: {reason}")]
    ProduceFailed { reason: String, flushing: bool },

    #[error("Caps negotiation failed: {reason}")]
    NegotiationFailed {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Transport {operation} failed: {reason}")]
    Transport {
        operation: &'static str,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Cannot {operation} while handle is {state}")]
    InvalidState { operation: &'static str, state: LifecycleState },

    #[error("Invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EdgeError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            EdgeError::CreateFailed { .. } => false,
            EdgeError::StartFailed { .. } => true,
            EdgeError::ConnectFailed { .. } => true,
            EdgeError::SendFailed { .. } => true,
            EdgeError::ProduceFailed { flushing, .. } => !flushing,
            EdgeError::NegotiationFailed { .. } => false,
            EdgeError::Transport { .. } => true,
            EdgeError::InvalidState { .. } => false,
            EdgeError::InvalidFrame { .. } => false,
            EdgeError::Config { .. } => false,
            EdgeError::Io(_) => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            EdgeError::CreateFailed { .. } => vec![
                "Use a supported connection type (TCP)",
                "Check that the transport library is available",
            ],
            EdgeError::StartFailed { .. } => vec![
                "Check the configured host and port",
                "Make sure the port is not already in use",
                "Restart the pipeline to retry",
            ],
            EdgeError::ConnectFailed { .. } => vec![
                "Ensure the publisher is running",
                "Verify the destination host and port",
                "Check firewall rules between the peers",
            ],
            EdgeError::SendFailed { .. } => vec![
                "Check that the handle is started",
                "Verify the buffer carries at least one memory segment",
            ],
            EdgeError::ProduceFailed { .. } => vec![
                "Check that the subscriber is started",
                "Verify the publisher sends non-empty frames",
            ],
            EdgeError::NegotiationFailed { .. } => vec![
                "Start the publisher before negotiating caps",
                "Make sure the caps string does not contain the history delimiter",
            ],
            EdgeError::Transport { .. } => vec![
                "Inspect the transport logs",
                "Restart the edge connection",
            ],
            EdgeError::InvalidState { .. } => vec![
                "Follow the create, configure, start, connect order",
                "Release the handle before creating a new one",
            ],
            EdgeError::InvalidFrame { .. } => vec![
                "Frames need between one and sixteen memory segments",
            ],
            EdgeError::Config { .. } => vec![
                "Check property names and value formats",
                "Ports must be between 0 and 65535",
            ],
            EdgeError::Io(_) => vec![
                "Check network connectivity",
                "Check file permissions",
            ],
        }
    }

    /// Whether this error means the queue was closed under a pending pull.
    pub fn is_flushing(&self) -> bool {
        matches!(self, EdgeError::ProduceFailed { flushing: true, .. })
    }

    /// Helper constructor for handle creation errors.
    pub fn create_failed(reason: impl Into<String>) -> Self {
        EdgeError::CreateFailed { reason: reason.into(), source: None }
    }

    /// Helper constructor for start errors.
    pub fn start_failed(reason: impl Into<String>) -> Self {
        EdgeError::StartFailed { reason: reason.into(), source: None }
    }

    /// Helper constructor for start errors with the failing step as source.
    pub fn start_failed_with_source(reason: impl Into<String>, source: EdgeError) -> Self {
        EdgeError::StartFailed { reason: reason.into(), source: Some(Box::new(source)) }
    }

    /// Helper constructor for connect errors.
    pub fn connect_failed(reason: impl Into<String>) -> Self {
        EdgeError::ConnectFailed {
            host: String::new(),
            port: 0,
            reason: reason.into(),
            source: None,
        }
    }

    /// Helper constructor for send errors.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        EdgeError::SendFailed { reason: reason.into(), source: None }
    }

    /// Helper constructor for produce errors.
    pub fn produce_failed(reason: impl Into<String>) -> Self {
        EdgeError::ProduceFailed { reason: reason.into(), flushing: false }
    }

    /// Produce error raised when the inbound queue is closed.
    pub fn flushing() -> Self {
        EdgeError::ProduceFailed { reason: "inbound queue is closed".to_string(), flushing: true }
    }

    /// Helper constructor for negotiation errors.
    pub fn negotiation_failed(reason: impl Into<String>) -> Self {
        EdgeError::NegotiationFailed { reason: reason.into(), source: None }
    }

    /// Helper constructor for raw transport errors.
    pub fn transport(operation: &'static str, reason: impl Into<String>) -> Self {
        EdgeError::Transport { operation, reason: reason.into(), source: None }
    }

    /// Helper constructor for raw transport errors with source.
    pub fn transport_with_source(
        operation: &'static str,
        reason: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        EdgeError::Transport { operation, reason: reason.into(), source: Some(source.into()) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(context: impl Into<String>, details: impl Into<String>) -> Self {
        EdgeError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for invalid frame errors.
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        EdgeError::InvalidFrame { reason: reason.into() }
    }

    /// Wrap any failure from a start sequence as `StartFailed`.
    ///
    /// Errors that already are `StartFailed` pass through unchanged.
    pub fn into_start_failure(self, reason: impl Into<String>) -> Self {
        match self {
            err @ EdgeError::StartFailed { .. } => err,
            other => EdgeError::start_failed_with_source(reason, other),
        }
    }
}

impl From<&EdgeError> for FlowReturn {
    fn from(err: &EdgeError) -> Self {
        if err.is_flushing() { FlowReturn::Flushing } else { FlowReturn::Error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in ".*",
            host in "[a-z0-9.]{1,20}",
            port in any::<u16>(),
          ) {
            let connect = EdgeError::ConnectFailed {
              host: host.clone(),
              port,
              reason: reason.clone(),
              source: None,
            };
            let msg = connect.to_string();
            prop_assert!(msg.contains(&host));
            prop_assert!(msg.contains(&port.to_string()));
            prop_assert!(msg.contains(&reason));

            let send = EdgeError::send_failed(reason.clone());
            prop_assert!(send.to_string().contains(&reason));

            let negotiation = EdgeError::negotiation_failed(reason.clone());
            prop_assert!(negotiation.to_string().contains(&reason));
          }

          #[test]
          fn start_failure_keeps_the_failing_step_as_source(reason in "[a-z ]{1,40}") {
            let inner = EdgeError::connect_failed(reason.clone());
            let outer = inner.into_start_failure("subscriber start");

            prop_assert!(matches!(outer, EdgeError::StartFailed { .. }), "expected StartFailed");
            let source = std::error::Error::source(&outer).map(|s| s.to_string());
            prop_assert!(source.is_some());
            prop_assert!(source.unwrap_or_default().contains(&reason));
          }
        }
    }

    #[test]
    fn start_failure_is_not_double_wrapped() {
        let err = EdgeError::start_failed("bind failed").into_start_failure("publisher start");
        match err {
            EdgeError::StartFailed { reason, source } => {
                assert_eq!(reason, "bind failed");
                assert!(source.is_none());
            }
            other => panic!("Expected StartFailed, got {other:?}"),
        }
    }

    #[test]
    fn error_traits_validation() {
        // EdgeError crosses callback threads, so it must stay Send + Sync.
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<EdgeError>();

        let error = EdgeError::create_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn recovery_methods_work() {
        let connect = EdgeError::connect_failed("refused");
        let create = EdgeError::create_failed("unsupported");
        let flushing = EdgeError::flushing();

        assert!(connect.is_retryable());
        assert!(!create.is_retryable());
        assert!(!flushing.is_retryable());
        assert!(EdgeError::produce_failed("empty frame").is_retryable());

        for err in [&connect, &create, &flushing] {
            let suggestions = err.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn flow_return_mapping() {
        assert_eq!(FlowReturn::from(&EdgeError::flushing()), FlowReturn::Flushing);
        assert_eq!(FlowReturn::from(&EdgeError::produce_failed("x")), FlowReturn::Error);
        assert_eq!(FlowReturn::from(&EdgeError::send_failed("x")), FlowReturn::Error);
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: EdgeError = io_err.into();
        assert!(matches!(err, EdgeError::Io(_)));
        assert!(err.to_string().contains("refused"));
    }
}

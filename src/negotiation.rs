//! Caps negotiation over handle metadata
//!
//! The publisher keeps the full history of negotiated caps under the `CAPS`
//! metadata key. Every renegotiation appends to the history instead of
//! overwriting it, so a subscriber that joins after several format changes can
//! still see all of them:
//!
//! ```text
//! video/x-raw,width=640@edge_sink_caps@video/x-raw,width=1280
//! ```
//!
//! The delimiter is part of the interoperability contract between publishers
//! and subscribers built separately, and must never change.

use std::fmt;
use tracing::debug;

use crate::transport::{EdgeHandle, INFO_CAPS};
use crate::{EdgeError, Result};

/// Separator between entries of the caps history.
pub const CAPS_DELIMITER: &str = "@edge_sink_caps@";

/// A serialized frame-format description.
///
/// Never empty and never contains [`CAPS_DELIMITER`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaDescriptor(String);

impl SchemaDescriptor {
    pub fn new(caps: impl Into<String>) -> Result<Self> {
        let caps = caps.into();
        if caps.trim().is_empty() {
            return Err(EdgeError::negotiation_failed("caps description is empty"));
        }
        if caps.contains(CAPS_DELIMITER) {
            return Err(EdgeError::negotiation_failed(format!(
                "caps description contains the history delimiter '{}'",
                CAPS_DELIMITER
            )));
        }
        Ok(Self(caps))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append `descriptor` to the caps history stored on `handle`.
///
/// Returns the new history. Any metadata read or write failure becomes
/// `NegotiationFailed`; the caller must not continue with stale caps.
pub fn on_schema_change<H>(handle: &mut H, descriptor: &SchemaDescriptor) -> Result<String>
where
    H: EdgeHandle + ?Sized,
{
    let previous = handle.get_info(INFO_CAPS).map_err(|e| EdgeError::NegotiationFailed {
        reason: "cannot read current caps".to_string(),
        source: Some(Box::new(e)),
    })?;

    let history = append_caps(previous.as_deref().unwrap_or(""), descriptor);

    handle.set_info(INFO_CAPS, &history).map_err(|e| EdgeError::NegotiationFailed {
        reason: format!("cannot store caps '{}'", descriptor),
        source: Some(Box::new(e)),
    })?;

    debug!(caps = %descriptor, history_len = history.len(), "Caps history updated");
    Ok(history)
}

/// Join a new descriptor onto an existing history string.
pub fn append_caps(previous: &str, descriptor: &SchemaDescriptor) -> String {
    if previous.is_empty() {
        descriptor.as_str().to_string()
    } else {
        format!("{}{}{}", previous, CAPS_DELIMITER, descriptor)
    }
}

/// Parsed caps history, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapsHistory {
    entries: Vec<String>,
}

impl CapsHistory {
    /// Split a stored history value.
    ///
    /// Empty entries are skipped, which also accepts histories written by
    /// peers that put the delimiter in front of the first entry.
    pub fn parse(value: &str) -> Self {
        let entries = value
            .split(CAPS_DELIMITER)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();
        Self { entries }
    }

    /// Most recently negotiated caps.
    pub fn latest(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{EdgeFlag, EdgeTransport};
    use crate::transports::memory::{FailPoint, MemoryTransport};
    use crate::ConnectType;
    use proptest::prelude::*;

    fn handle(transport: &MemoryTransport) -> crate::MemoryHandle {
        transport.create("sink", ConnectType::Tcp, EdgeFlag::Send).unwrap()
    }

    fn caps(s: &str) -> SchemaDescriptor {
        SchemaDescriptor::new(s).unwrap()
    }

    #[test]
    fn first_negotiation_stores_plain_caps() {
        let transport = MemoryTransport::new();
        let mut handle = handle(&transport);

        let history = on_schema_change(&mut handle, &caps("video/x-raw,width=640")).unwrap();
        assert_eq!(history, "video/x-raw,width=640");
        assert_eq!(handle.get_info("CAPS").unwrap().as_deref(), Some("video/x-raw,width=640"));
    }

    #[test]
    fn renegotiation_accumulates() {
        let transport = MemoryTransport::new();
        let mut handle = handle(&transport);

        on_schema_change(&mut handle, &caps("video/x-raw,width=640")).unwrap();
        on_schema_change(&mut handle, &caps("video/x-raw,width=1280")).unwrap();

        assert_eq!(
            handle.get_info("CAPS").unwrap().as_deref(),
            Some("video/x-raw,width=640@edge_sink_caps@video/x-raw,width=1280")
        );
    }

    #[test]
    fn write_failure_is_a_negotiation_failure() {
        let transport = MemoryTransport::new();
        let mut handle = handle(&transport);
        transport.fail(FailPoint::SetInfo);

        let err = on_schema_change(&mut handle, &caps("audio/x-raw")).unwrap_err();
        assert!(matches!(err, EdgeError::NegotiationFailed { .. }));
    }

    #[test]
    fn read_failure_is_a_negotiation_failure() {
        let transport = MemoryTransport::new();
        let mut handle = handle(&transport);
        transport.fail(FailPoint::GetInfo);

        let err = on_schema_change(&mut handle, &caps("audio/x-raw")).unwrap_err();
        assert!(matches!(err, EdgeError::NegotiationFailed { .. }));
        transport.clear_failures();
        assert_eq!(handle.get_info("CAPS").unwrap(), None);
    }

    #[test]
    fn descriptors_are_validated() {
        assert!(SchemaDescriptor::new("").is_err());
        assert!(SchemaDescriptor::new("   ").is_err());
        assert!(SchemaDescriptor::new("a@edge_sink_caps@b").is_err());
        assert_eq!(caps("text/x-raw").to_string(), "text/x-raw");
    }

    #[test]
    fn history_parsing() {
        let history = CapsHistory::parse("a@edge_sink_caps@b@edge_sink_caps@c");
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest(), Some("c"));
        assert_eq!(history.iter().collect::<Vec<_>>(), ["a", "b", "c"]);

        let prefixed = CapsHistory::parse("@edge_sink_caps@a");
        assert_eq!(prefixed.iter().collect::<Vec<_>>(), ["a"]);

        assert!(CapsHistory::parse("").is_empty());
        assert_eq!(CapsHistory::parse("").latest(), None);
    }

    proptest! {
        #[test]
        fn prop_history_is_the_delimited_join(
            descriptors in prop::collection::vec("[a-z/]{1,12}(,[a-z]{1,6}=[0-9]{1,4}){0,3}", 1..10)
        ) {
            let transport = MemoryTransport::new();
            let mut handle = handle(&transport);

            for d in &descriptors {
                on_schema_change(&mut handle, &caps(d)).unwrap();
            }

            let stored = handle.get_info("CAPS").unwrap().unwrap();
            prop_assert_eq!(&stored, &descriptors.join(CAPS_DELIMITER));

            let parsed = CapsHistory::parse(&stored);
            prop_assert_eq!(parsed.iter().collect::<Vec<_>>(), descriptors.iter().map(String::as_str).collect::<Vec<_>>());
            prop_assert_eq!(parsed.latest(), descriptors.last().map(String::as_str));
        }
    }
}

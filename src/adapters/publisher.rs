//! Publisher adapter (sink role)
//!
//! Every accepted buffer becomes one [`FrameItem`] handed straight to the
//! transport on the pipeline thread. There is no queue and no retry: a send
//! failure is reported for that buffer and the next buffer is tried afresh.

use std::sync::Arc;
use tracing::{debug, error, info, trace};

use crate::config::EdgeConfig;
use crate::element::Sink;
use crate::lifecycle::{ConnectPlan, HandleLifecycle, LifecycleState};
use crate::negotiation::{CapsHistory, SchemaDescriptor, on_schema_change};
use crate::transport::{
    EdgeEvent, EdgeFlag, EdgeHandle, EdgeTransport, EventCallback, INFO_CAPS, INFO_HOST, INFO_PORT,
};
use crate::types::{Buffer, EdgeStats, FrameItem};
use crate::{EdgeError, Result};

/// Forwards pipeline buffers and caps to subscribers.
pub struct PublisherAdapter<T: EdgeTransport> {
    /// Transport factory used at every start
    transport: T,

    /// Connection settings, read at start
    config: EdgeConfig,

    /// Send handle and its state
    lifecycle: HandleLifecycle<T::Handle>,

    /// Last negotiated caps of the current session
    schema: Option<SchemaDescriptor>,

    stats: EdgeStats,
}

impl<T: EdgeTransport> PublisherAdapter<T> {
    pub fn new(transport: T, config: EdgeConfig) -> Self {
        Self {
            transport,
            config,
            lifecycle: HandleLifecycle::new(),
            schema: None,
            stats: EdgeStats::default(),
        }
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// Set a configuration property. Takes effect at the next start.
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        self.config.set_property(name, value)
    }

    pub fn property(&self, name: &str) -> Option<String> {
        self.config.property(name)
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Frames and bytes sent since creation.
    pub fn stats(&self) -> EdgeStats {
        self.stats
    }

    /// Caps most recently negotiated in this session.
    pub fn current_schema(&self) -> Option<&SchemaDescriptor> {
        self.schema.as_ref()
    }

    /// Every caps negotiated in this session, oldest first.
    pub fn caps_history(&self) -> CapsHistory {
        match self.lifecycle.handle().map(|h| h.get_info(INFO_CAPS)) {
            Some(Ok(Some(value))) => CapsHistory::parse(&value),
            _ => CapsHistory::default(),
        }
    }

    /// Port the transport is listening on.
    ///
    /// Differs from the configured port when that was 0.
    pub fn local_port(&self) -> Option<u16> {
        let handle = self.lifecycle.handle()?;
        handle.get_info(INFO_PORT).ok().flatten()?.parse().ok()
    }

    fn plan(&self) -> ConnectPlan {
        let config = &self.config;
        ConnectPlan {
            id: config.id.clone(),
            flag: EdgeFlag::Send,
            connect_type: config.connect_type,
            info: vec![
                (INFO_HOST.to_string(), config.host.clone()),
                (INFO_PORT.to_string(), config.port.to_string()),
            ],
            host: config.host.clone(),
            port: config.port,
        }
    }
}

fn event_callback() -> EventCallback {
    Arc::new(|event| match event {
        EdgeEvent::ConnectionCompleted => debug!("Subscriber connected"),
        EdgeEvent::ConnectionClosed => debug!("Subscriber disconnected"),
        other => trace!(kind = other.kind(), "Ignoring event on publisher"),
    })
}

impl<T: EdgeTransport> Sink for PublisherAdapter<T> {
    fn start(&mut self) -> Result<()> {
        self.config
            .validate()
            .map_err(|e| e.into_start_failure("invalid publisher configuration"))?;

        let plan = self.plan();
        self.lifecycle.open(&self.transport, &plan, event_callback()).map_err(|e| {
            error!("Publisher '{}' failed to start: {}", plan.id, e);
            e.into_start_failure(format!(
                "publisher '{}' could not listen on {}:{}",
                plan.id, plan.host, plan.port
            ))
        })?;

        self.schema = None;
        info!(
            "Publisher '{}' serving on {}:{}",
            plan.id,
            plan.host,
            self.local_port().unwrap_or(plan.port)
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.lifecycle.release();
        self.schema = None;
        debug!("Publisher '{}' stopped", self.config.id);
    }

    fn accept(&mut self, buffer: &Buffer) -> Result<()> {
        let Some(handle) = self.lifecycle.connected_handle_mut() else {
            return Err(EdgeError::send_failed("publisher is not started"));
        };

        let frame = FrameItem::try_from(buffer).map_err(|e| EdgeError::SendFailed {
            reason: "buffer cannot be sent".to_string(),
            source: Some(Box::new(e)),
        })?;
        let bytes = frame.total_len();
        let segments = frame.count();

        handle.send(frame).map_err(|e| {
            error!("Failed to send {} byte frame: {}", bytes, e);
            EdgeError::SendFailed {
                reason: "transport rejected the frame".to_string(),
                source: Some(Box::new(e)),
            }
        })?;

        self.stats.frames += 1;
        self.stats.bytes += bytes as u64;
        trace!(segments, bytes, "Frame sent");
        Ok(())
    }

    fn negotiate(&mut self, caps: &str) -> Result<()> {
        let descriptor = SchemaDescriptor::new(caps)?;
        let Some(handle) = self.lifecycle.connected_handle_mut() else {
            return Err(EdgeError::negotiation_failed("publisher is not started"));
        };

        let history = on_schema_change(handle, &descriptor)?;
        info!(caps = %descriptor, entries = CapsHistory::parse(&history).len(), "Caps negotiated");
        self.schema = Some(descriptor);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.config.id
    }
}

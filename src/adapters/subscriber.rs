//! Subscriber adapter (source role)
//!
//! Frames arrive on transport threads through the event callback and are
//! parked in an [`InboundQueue`]; the pipeline pulls them one at a time with
//! [`Source::produce`]. The callback never blocks and never touches the
//! adapter's locks, so a slow pipeline cannot stall the transport.

use futures::Stream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::config::EdgeConfig;
use crate::element::Source;
use crate::lifecycle::{ConnectPlan, HandleLifecycle, LifecycleState};
use crate::negotiation::CapsHistory;
use crate::queue::InboundQueue;
use crate::transport::{
    EdgeEvent, EdgeFlag, EdgeHandle, EdgeTransport, EventCallback, INFO_CAPS, INFO_DEST_HOST,
    INFO_DEST_PORT,
};
use crate::transports::lock;
use crate::types::{Buffer, EdgeStats, FrameItem};
use crate::{EdgeError, Result};

#[derive(Debug, Default)]
struct Counters {
    frames: AtomicU64,
    bytes: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> EdgeStats {
        EdgeStats {
            frames: self.frames.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Receives frames from a publisher and hands them to the pipeline on demand.
///
/// All hooks take `&self`: share the adapter in an `Arc` to call
/// [`stop`](Source::stop) from another thread while `produce` is blocked.
pub struct SubscriberAdapter<T: EdgeTransport> {
    /// Transport factory used at every start
    transport: T,

    /// Connection settings, read at start
    config: EdgeConfig,

    /// Receive handle and its state
    lifecycle: Mutex<HandleLifecycle<T::Handle>>,

    /// Queue of the current session, `None` while stopped
    queue: Mutex<Option<Arc<InboundQueue>>>,

    /// Counters shared with the event callback
    counters: Arc<Counters>,
}

impl<T: EdgeTransport> SubscriberAdapter<T> {
    pub fn new(transport: T, config: EdgeConfig) -> Self {
        Self {
            transport,
            config,
            lifecycle: Mutex::new(HandleLifecycle::new()),
            queue: Mutex::new(None),
            counters: Arc::new(Counters::default()),
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
        lock(&self.lifecycle).state()
    }

    /// Frames produced, bytes produced and events dropped since creation.
    pub fn stats(&self) -> EdgeStats {
        self.counters.snapshot()
    }

    /// Items waiting to be produced.
    pub fn queued(&self) -> usize {
        lock(&self.queue).as_ref().map_or(0, |q| q.len())
    }

    /// Full caps history the publisher has announced.
    pub fn caps_history(&self) -> CapsHistory {
        let lifecycle = lock(&self.lifecycle);
        match lifecycle.handle().map(|h| h.get_info(INFO_CAPS)) {
            Some(Ok(Some(value))) => CapsHistory::parse(&value),
            Some(Err(e)) => {
                debug!("Cannot read caps from subscriber handle: {}", e);
                CapsHistory::default()
            }
            _ => CapsHistory::default(),
        }
    }

    /// Most recent caps the publisher has announced.
    pub fn caps(&self) -> Option<String> {
        self.caps_history().latest().map(str::to_string)
    }

    /// Async view of the inbound queue.
    ///
    /// Yields buffers in arrival order and ends when the adapter stops.
    /// Invalid frames are skipped. Do not mix with blocking `produce` calls:
    /// each frame goes to whichever consumer takes it first.
    ///
    /// The stream is bound to the session running when it is created. Taken
    /// before [`start`](Source::start) it ends immediately, and after a
    /// restart a fresh stream is needed for the new session.
    pub fn frames(&self) -> impl Stream<Item = Buffer> + Send + 'static {
        let queue = lock(&self.queue).clone();
        let counters = Arc::clone(&self.counters);

        futures::stream::unfold(queue, move |queue| {
            let counters = Arc::clone(&counters);
            async move {
                let queue = queue?;
                loop {
                    let frame = queue.pop_async().await.ok()?;
                    if let Ok(buffer) = into_buffer(frame, &counters) {
                        return Some((buffer, Some(queue)));
                    }
                }
            }
        })
    }

    fn plan(&self) -> ConnectPlan {
        let config = &self.config;
        ConnectPlan {
            id: config.id.clone(),
            flag: EdgeFlag::Recv,
            connect_type: config.connect_type,
            info: vec![
                (INFO_DEST_HOST.to_string(), config.host.clone()),
                (INFO_DEST_PORT.to_string(), config.port.to_string()),
            ],
            host: config.host.clone(),
            port: config.port,
        }
    }

    fn discard_queue(&self) -> usize {
        match lock(&self.queue).take() {
            Some(queue) => {
                queue.close();
                queue.drain()
            }
            None => 0,
        }
    }
}

/// Callback installed on the receive handle.
fn event_callback(queue: Arc<InboundQueue>, counters: Arc<Counters>) -> EventCallback {
    Arc::new(move |event| match event {
        EdgeEvent::NewDataReceived(frame) => {
            let segments = frame.count();
            if queue.push(frame) {
                trace!(segments, "Frame queued");
            } else {
                trace!("Queue closed, dropping frame");
            }
        }
        EdgeEvent::Capability(caps) => debug!(caps = %caps, "Publisher announced caps"),
        EdgeEvent::ConnectionCompleted => debug!("Connected to publisher"),
        EdgeEvent::ConnectionClosed => info!("Publisher connection closed"),
        EdgeEvent::CallbackReleased => trace!("Event callback released"),
        EdgeEvent::Malformed(reason) => {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Dropping malformed event: {}", reason);
        }
        EdgeEvent::Unknown(kind) => debug!("Ignoring unknown event kind {}", kind),
    })
}

/// Turn a dequeued frame into a pipeline buffer, rejecting invalid frames.
fn into_buffer(frame: FrameItem, counters: &Counters) -> Result<Buffer> {
    if let Err(e) = frame.validate() {
        counters.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("Discarding received frame: {}", e);
        return Err(EdgeError::produce_failed(e.to_string()));
    }

    let buffer = Buffer::from(frame);
    counters.frames.fetch_add(1, Ordering::Relaxed);
    counters.bytes.fetch_add(buffer.size() as u64, Ordering::Relaxed);
    Ok(buffer)
}

impl<T: EdgeTransport> Source for SubscriberAdapter<T> {
    fn start(&self) -> Result<()> {
        self.config
            .validate()
            .map_err(|e| e.into_start_failure("invalid subscriber configuration"))?;

        let mut lifecycle = lock(&self.lifecycle);
        if matches!(lifecycle.state(), LifecycleState::Configured | LifecycleState::Connected) {
            return Err(EdgeError::start_failed_with_source(
                "subscriber is already started",
                EdgeError::InvalidState { operation: "start", state: lifecycle.state() },
            ));
        }

        let queue = Arc::new(InboundQueue::new());
        *lock(&self.queue) = Some(Arc::clone(&queue));

        let plan = self.plan();
        let callback = event_callback(queue, Arc::clone(&self.counters));

        if let Err(e) = lifecycle.open(&self.transport, &plan, callback) {
            error!("Subscriber '{}' failed to start: {}", plan.id, e);
            self.discard_queue();
            return Err(e.into_start_failure(format!(
                "subscriber '{}' could not connect to {}:{}",
                plan.id, plan.host, plan.port
            )));
        }

        info!("Subscriber '{}' receiving from {}:{}", plan.id, plan.host, plan.port);
        Ok(())
    }

    fn stop(&self) {
        // Release first so no callback can push while the queue drains.
        lock(&self.lifecycle).release();

        let dropped = self.discard_queue();
        if dropped > 0 {
            debug!("Dropped {} queued frames on stop", dropped);
        }
        debug!("Subscriber '{}' stopped", self.config.id);
    }

    fn produce(&self) -> Result<Buffer> {
        let queue = lock(&self.queue).clone().ok_or_else(|| EdgeError::ProduceFailed {
            reason: "subscriber is not started".to_string(),
            flushing: true,
        })?;

        let frame = queue.pop()?;
        let buffer = into_buffer(frame, &self.counters)?;
        trace!(memories = buffer.n_memory(), size = buffer.size(), "Produced buffer");
        Ok(buffer)
    }

    fn name(&self) -> &str {
        &self.config.id
    }
}

impl<T: EdgeTransport> Drop for SubscriberAdapter<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

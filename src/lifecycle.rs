//! Handle lifecycle state machine
//!
//! Both adapters drive their handle through the same sequence:
//!
//! ```text
//! Idle --create--> Configured --configure/register/start/connect--> Connected
//!   ^                  |                                                |
//!   |                  +--------------- release / failure --------------+--> Closed
//!   +---------------------------------- create (restart) -------------------+
//! ```
//!
//! `start` and `connect` failures are terminal for the attempt: the handle is
//! released before the error is returned, so callers never hold a
//! half-initialised handle.

use std::fmt;
use tracing::{debug, error, info};

use crate::config::ConnectType;
use crate::transport::{EdgeFlag, EdgeHandle, EdgeTransport, EventCallback};
use crate::{EdgeError, Result};

/// Where a handle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// No handle allocated
    Idle,
    /// Handle created; settings and callback may be applied
    Configured,
    /// Transport started and connected to the peer
    Connected,
    /// Handle released
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Configured => "configured",
            LifecycleState::Connected => "connected",
            LifecycleState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Everything needed to take a handle from `Idle` to `Connected`.
#[derive(Debug, Clone)]
pub struct ConnectPlan {
    pub id: String,
    pub flag: EdgeFlag,
    pub connect_type: ConnectType,
    /// Metadata applied before start, in order
    pub info: Vec<(String, String)>,
    pub host: String,
    pub port: u16,
}

/// Owns one handle and enforces the order of lifecycle calls.
pub struct HandleLifecycle<H: EdgeHandle> {
    state: LifecycleState,
    handle: Option<H>,
    started: bool,
    callback_registered: bool,
}

impl<H: EdgeHandle> Default for HandleLifecycle<H> {
    fn default() -> Self {
        Self { state: LifecycleState::Idle, handle: None, started: false, callback_registered: false }
    }
}

impl<H: EdgeHandle> HandleLifecycle<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LifecycleState::Connected
    }

    /// The handle, while one is allocated.
    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    /// The handle, only once connected.
    pub fn connected_handle_mut(&mut self) -> Option<&mut H> {
        if self.is_connected() { self.handle.as_mut() } else { None }
    }

    /// Allocate a handle. Allowed from `Idle` and `Closed`.
    pub fn create<T>(
        &mut self,
        transport: &T,
        id: &str,
        flag: EdgeFlag,
        connect_type: ConnectType,
    ) -> Result<()>
    where
        T: EdgeTransport<Handle = H>,
    {
        if !matches!(self.state, LifecycleState::Idle | LifecycleState::Closed) {
            return Err(EdgeError::InvalidState { operation: "create", state: self.state });
        }

        let handle = transport.create(id, connect_type, flag).map_err(|e| {
            error!("Failed to create {} edge handle ({}): {}", flag, connect_type, e);
            EdgeError::CreateFailed {
                reason: format!("{} handle '{}' over {}", flag, id, connect_type),
                source: Some(Box::new(e)),
            }
        })?;

        debug!(id, %flag, %connect_type, "Edge handle created");
        self.handle = Some(handle);
        self.started = false;
        self.callback_registered = false;
        self.state = LifecycleState::Configured;
        Ok(())
    }

    /// Apply one metadata setting before start.
    pub fn configure(&mut self, key: &str, value: &str) -> Result<()> {
        let handle = self.before_start("configure")?;
        handle.set_info(key, value).map_err(|e| EdgeError::StartFailed {
            reason: format!("cannot set {}", key),
            source: Some(Box::new(e)),
        })?;
        debug!(key, value, "Edge handle configured");
        Ok(())
    }

    /// Install the event callback before start.
    pub fn register_callback(&mut self, callback: EventCallback) -> Result<()> {
        let handle = self.before_start("register a callback")?;
        handle.set_event_callback(callback).map_err(|e| EdgeError::StartFailed {
            reason: "cannot register event callback".to_string(),
            source: Some(Box::new(e)),
        })?;
        self.callback_registered = true;
        Ok(())
    }

    /// Start the transport. Releases the handle on failure.
    pub fn start(&mut self) -> Result<()> {
        if !self.callback_registered {
            debug!("Starting edge handle without an event callback");
        }
        let handle = self.before_start("start")?;

        if let Err(e) = handle.start() {
            error!("Failed to start edge handle: {}", e);
            self.release();
            return Err(EdgeError::StartFailed {
                reason: "transport refused to start, check host and port".to_string(),
                source: Some(Box::new(e)),
            });
        }

        self.started = true;
        debug!("Edge handle started");
        Ok(())
    }

    /// Connect to the peer. Releases the handle on failure.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.state != LifecycleState::Configured || !self.started {
            return Err(EdgeError::InvalidState { operation: "connect", state: self.state });
        }
        let Some(handle) = self.handle.as_mut() else {
            return Err(EdgeError::InvalidState { operation: "connect", state: self.state });
        };

        if let Err(e) = handle.connect(host, port) {
            error!("Failed to connect to edge peer {}:{}: {}", host, port, e);
            self.release();
            return Err(EdgeError::ConnectFailed {
                host: host.to_string(),
                port,
                reason: "transport could not reach the peer".to_string(),
                source: Some(Box::new(e)),
            });
        }

        self.state = LifecycleState::Connected;
        info!("Edge handle connected to {}:{}", host, port);
        Ok(())
    }

    /// Run the whole sequence from `Idle`/`Closed` to `Connected`.
    ///
    /// Any failure leaves the lifecycle released.
    pub fn open<T>(&mut self, transport: &T, plan: &ConnectPlan, callback: EventCallback) -> Result<()>
    where
        T: EdgeTransport<Handle = H>,
    {
        self.create(transport, &plan.id, plan.flag, plan.connect_type)?;

        let result = self.bring_up(plan, callback);
        if result.is_err() {
            self.release();
        }
        result
    }

    fn bring_up(&mut self, plan: &ConnectPlan, callback: EventCallback) -> Result<()> {
        for (key, value) in &plan.info {
            self.configure(key, value)?;
        }
        self.register_callback(callback)?;
        self.start()?;
        self.connect(&plan.host, plan.port)
    }

    /// Stop and release the handle.
    ///
    /// Idempotent, and a no-op when no handle was ever created. Errors from
    /// the transport's stop are logged, never returned.
    pub fn release(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            if self.state != LifecycleState::Idle {
                self.state = LifecycleState::Closed;
            }
            return;
        };

        if self.started {
            if let Err(e) = handle.stop() {
                debug!("Ignoring error while stopping edge handle: {}", e);
            }
        }
        handle.release();

        self.started = false;
        self.callback_registered = false;
        self.state = LifecycleState::Closed;
        debug!("Edge handle released");
    }

    fn before_start(&mut self, operation: &'static str) -> Result<&mut H> {
        if self.state != LifecycleState::Configured || self.started {
            return Err(EdgeError::InvalidState { operation, state: self.state });
        }
        self.handle.as_mut().ok_or(EdgeError::InvalidState { operation, state: self.state })
    }
}

impl<H: EdgeHandle> Drop for HandleLifecycle<H> {
    fn drop(&mut self) {
        self.release();
    }
}

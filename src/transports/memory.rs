//! In-process transport
//!
//! Publishers listen on a `(HOST, PORT)` pair inside a shared in-memory
//! network; subscribers connect to it. Frames sent by a publisher fan out to
//! the callbacks of every connected subscriber on the sender's thread, and
//! caps written by a publisher are mirrored into its subscribers' metadata.
//!
//! Every operation is logged and can be made to fail, which makes this the
//! transport of choice for exercising adapter error paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

use super::lock;
use crate::config::{ConnectType, DEFAULT_HOST};
use crate::transport::{
    EdgeEvent, EdgeFlag, EdgeHandle, EdgeTransport, EventCallback, INFO_CAPS, INFO_HOST, INFO_PORT,
};
use crate::types::FrameItem;
use crate::{EdgeError, Result};

/// First port handed out when a publisher asks for port 0.
const EPHEMERAL_PORT_START: u16 = 49152;

/// Operation that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Create,
    SetInfo,
    GetInfo,
    SetCallback,
    Start,
    Stop,
    Connect,
    Send,
}

/// Shared in-memory network. Clones refer to the same network.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    network: Arc<Mutex<Network>>,
}

#[derive(Default)]
struct Network {
    next_handle: u64,
    next_port: u16,
    endpoints: HashMap<u64, Endpoint>,
    listeners: HashMap<(String, u16), u64>,
    failures: HashSet<FailPoint>,
    calls: Vec<String>,
}

struct Endpoint {
    flag: EdgeFlag,
    info: HashMap<String, String>,
    callback: Option<EventCallback>,
    started: bool,
    listening: Option<(String, u16)>,
    /// Send side: subscribers connected to this publisher
    peers: Vec<u64>,
    /// Recv side: publisher this subscriber is connected to
    upstream: Option<u64>,
}

impl Network {
    fn check(&self, point: FailPoint, operation: &'static str) -> Result<()> {
        if self.failures.contains(&point) {
            return Err(EdgeError::transport(operation, "injected failure"));
        }
        Ok(())
    }

    fn endpoint(&mut self, id: u64, operation: &'static str) -> Result<&mut Endpoint> {
        self.endpoints
            .get_mut(&id)
            .ok_or_else(|| EdgeError::transport(operation, "handle has been released"))
    }

    fn allocate_port(&mut self, host: &str) -> u16 {
        if self.next_port < EPHEMERAL_PORT_START {
            self.next_port = EPHEMERAL_PORT_START;
        }
        loop {
            let port = self.next_port;
            self.next_port = self.next_port.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
            if !self.listeners.contains_key(&(host.to_string(), port)) {
                return port;
            }
        }
    }

    fn callback(&self, id: u64) -> Option<EventCallback> {
        self.endpoints.get(&id).and_then(|e| e.callback.clone())
    }

    /// Unlink an endpoint from the network, returning callbacks that should
    /// hear about the closed connection.
    fn detach(&mut self, id: u64) -> Vec<EventCallback> {
        let mut notify = Vec::new();
        let Some(endpoint) = self.endpoints.get_mut(&id) else {
            return notify;
        };

        let listening = endpoint.listening.take();
        let peers = std::mem::take(&mut endpoint.peers);
        let upstream = endpoint.upstream.take();

        if let Some(addr) = listening {
            self.listeners.remove(&addr);
        }
        for peer in peers {
            if let Some(p) = self.endpoints.get_mut(&peer) {
                p.upstream = None;
                notify.extend(p.callback.clone());
            }
        }
        if let Some(server) = upstream {
            if let Some(s) = self.endpoints.get_mut(&server) {
                s.peers.retain(|p| *p != id);
            }
        }
        notify
    }
}

fn normalize_host(host: &str) -> String {
    match host {
        "localhost" | "0.0.0.0" => "127.0.0.1".to_string(),
        other => other.to_string(),
    }
}

fn dispatch(callbacks: Vec<EventCallback>, event: EdgeEvent) {
    for callback in callbacks {
        callback(event.clone());
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `point` operation fail until cleared.
    pub fn fail(&self, point: FailPoint) {
        lock(&self.network).failures.insert(point);
    }

    pub fn clear_failures(&self) {
        lock(&self.network).failures.clear();
    }

    /// Operations performed so far, e.g. `"connect 127.0.0.1:5000"`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.network).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.network).calls.clear();
    }

    /// Handles created and not yet released.
    pub fn live_handles(&self) -> usize {
        lock(&self.network).endpoints.len()
    }

    /// Invoke the callback of every started receive handle with `event`,
    /// as if it arrived from the network. Returns how many callbacks ran.
    pub fn deliver(&self, event: EdgeEvent) -> usize {
        let callbacks: Vec<EventCallback> = lock(&self.network)
            .endpoints
            .values()
            .filter(|e| e.flag == EdgeFlag::Recv && e.started)
            .filter_map(|e| e.callback.clone())
            .collect();

        let count = callbacks.len();
        trace!(kind = event.kind(), receivers = count, "Delivering simulated event");
        dispatch(callbacks, event);
        count
    }
}

impl EdgeTransport for MemoryTransport {
    type Handle = MemoryHandle;

    fn create(&self, id: &str, connect_type: ConnectType, flag: EdgeFlag) -> Result<MemoryHandle> {
        let mut net = lock(&self.network);
        net.calls.push(format!("create {} {} {}", id, flag, connect_type));
        net.check(FailPoint::Create, "create")?;

        if !connect_type.is_supported() {
            return Err(EdgeError::transport(
                "create",
                format!("connection type {} is not supported", connect_type),
            ));
        }

        let handle_id = net.next_handle;
        net.next_handle += 1;
        net.endpoints.insert(
            handle_id,
            Endpoint {
                flag,
                info: HashMap::new(),
                callback: None,
                started: false,
                listening: None,
                peers: Vec::new(),
                upstream: None,
            },
        );

        Ok(MemoryHandle { id: handle_id, network: Arc::clone(&self.network), released: false })
    }
}

/// Handle into a [`MemoryTransport`] network.
pub struct MemoryHandle {
    id: u64,
    network: Arc<Mutex<Network>>,
    released: bool,
}

impl EdgeHandle for MemoryHandle {
    fn set_info(&mut self, key: &str, value: &str) -> Result<()> {
        let (callbacks, caps) = {
            let mut net = lock(&self.network);
            net.calls.push(format!("set_info {}={}", key, value));
            net.check(FailPoint::SetInfo, "set_info")?;

            let endpoint = net.endpoint(self.id, "set_info")?;
            endpoint.info.insert(key.to_string(), value.to_string());

            if key != INFO_CAPS || endpoint.flag != EdgeFlag::Send {
                return Ok(());
            }

            let peers = endpoint.peers.clone();
            let mut callbacks = Vec::new();
            for peer in peers {
                if let Some(p) = net.endpoints.get_mut(&peer) {
                    p.info.insert(INFO_CAPS.to_string(), value.to_string());
                    callbacks.extend(p.callback.clone());
                }
            }
            (callbacks, value.to_string())
        };

        dispatch(callbacks, EdgeEvent::Capability(caps));
        Ok(())
    }

    fn get_info(&self, key: &str) -> Result<Option<String>> {
        let mut net = lock(&self.network);
        net.calls.push(format!("get_info {}", key));
        net.check(FailPoint::GetInfo, "get_info")?;
        Ok(net.endpoint(self.id, "get_info")?.info.get(key).cloned())
    }

    fn set_event_callback(&mut self, callback: EventCallback) -> Result<()> {
        let mut net = lock(&self.network);
        net.calls.push("set_event_callback".to_string());
        net.check(FailPoint::SetCallback, "set_event_callback")?;
        net.endpoint(self.id, "set_event_callback")?.callback = Some(callback);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let mut net = lock(&self.network);
        net.calls.push("start".to_string());
        net.check(FailPoint::Start, "start")?;

        let endpoint = net.endpoint(self.id, "start")?;
        if endpoint.started {
            return Err(EdgeError::transport("start", "handle already started"));
        }

        if endpoint.flag == EdgeFlag::Send {
            let host =
                normalize_host(endpoint.info.get(INFO_HOST).map(String::as_str).unwrap_or(DEFAULT_HOST));
            let requested = match endpoint.info.get(INFO_PORT) {
                Some(p) => p
                    .parse::<u16>()
                    .map_err(|_| EdgeError::transport("start", format!("invalid port '{}'", p)))?,
                None => 0,
            };

            let port = if requested == 0 { net.allocate_port(&host) } else { requested };
            let addr = (host, port);
            if net.listeners.contains_key(&addr) {
                return Err(EdgeError::transport(
                    "start",
                    format!("address {}:{} already in use", addr.0, addr.1),
                ));
            }
            net.listeners.insert(addr.clone(), self.id);

            let endpoint = net.endpoint(self.id, "start")?;
            endpoint.info.insert(INFO_PORT.to_string(), port.to_string());
            debug!("Memory publisher listening on {}:{}", addr.0, addr.1);
            endpoint.listening = Some(addr);
        }

        net.endpoint(self.id, "start")?.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let callbacks = {
            let mut net = lock(&self.network);
            net.calls.push("stop".to_string());
            net.check(FailPoint::Stop, "stop")?;
            net.endpoint(self.id, "stop")?.started = false;
            net.detach(self.id)
        };
        dispatch(callbacks, EdgeEvent::ConnectionClosed);
        Ok(())
    }

    fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let (own, server, caps) = {
            let mut net = lock(&self.network);
            net.calls.push(format!("connect {}:{}", host, port));
            net.check(FailPoint::Connect, "connect")?;

            let endpoint = net.endpoint(self.id, "connect")?;
            if !endpoint.started {
                return Err(EdgeError::transport("connect", "handle not started"));
            }
            if endpoint.flag == EdgeFlag::Send {
                // Publishers accept connections; connecting only confirms the listener.
                return if endpoint.listening.is_some() {
                    Ok(())
                } else {
                    Err(EdgeError::transport("connect", "publisher is not listening"))
                };
            }

            let Some(&server_id) = net.listeners.get(&(normalize_host(host), port)) else {
                return Err(EdgeError::transport(
                    "connect",
                    format!("connection refused by {}:{}", host, port),
                ));
            };

            let server = net.endpoint(server_id, "connect")?;
            server.peers.push(self.id);
            let caps = server.info.get(INFO_CAPS).cloned();

            let endpoint = net.endpoint(self.id, "connect")?;
            endpoint.upstream = Some(server_id);
            if let Some(caps) = &caps {
                endpoint.info.insert(INFO_CAPS.to_string(), caps.clone());
            }

            (net.callback(self.id), net.callback(server_id), caps)
        };

        if let Some(server) = server {
            server(EdgeEvent::ConnectionCompleted);
        }
        if let Some(own) = own {
            own(EdgeEvent::ConnectionCompleted);
            if let Some(caps) = caps {
                own(EdgeEvent::Capability(caps));
            }
        }
        Ok(())
    }

    fn send(&mut self, frame: FrameItem) -> Result<()> {
        let callbacks = {
            let mut net = lock(&self.network);
            net.calls.push(format!("send {}", frame.count()));
            net.check(FailPoint::Send, "send")?;

            let endpoint = net.endpoint(self.id, "send")?;
            if endpoint.flag != EdgeFlag::Send {
                return Err(EdgeError::transport("send", "receive handle cannot send"));
            }
            if !endpoint.started {
                return Err(EdgeError::transport("send", "handle not started"));
            }

            let peers = endpoint.peers.clone();
            peers.into_iter().filter_map(|p| net.callback(p)).collect::<Vec<_>>()
        };

        trace!(segments = frame.count(), receivers = callbacks.len(), "Memory send");
        dispatch(callbacks, EdgeEvent::NewDataReceived(frame));
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let callbacks = {
            let mut net = lock(&self.network);
            net.calls.push("release".to_string());
            let callbacks = net.detach(self.id);
            net.endpoints.remove(&self.id);
            callbacks
        };
        dispatch(callbacks, EdgeEvent::ConnectionClosed);
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.release();
    }
}

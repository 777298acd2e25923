//! Direct-stream transport over TCP
//!
//! A send handle binds a listener on `HOST:PORT` and accepts any number of
//! subscribers. Each new subscriber first receives the current `CAPS` value,
//! then every frame sent afterwards. Later `CAPS` updates are pushed to all
//! connected subscribers as they happen.
//!
//! A receive handle opens one stream to the publisher and decodes it on a
//! dedicated reader thread, which is also the thread the event callback runs
//! on.

use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::lock;
use super::wire::{self, Inbound};
use crate::config::{ConnectType, DEFAULT_HOST};
use crate::transport::{
    EdgeEvent, EdgeFlag, EdgeHandle, EdgeTransport, EventCallback, INFO_CAPS, INFO_HOST, INFO_PORT,
};
use crate::types::FrameItem;
use crate::{EdgeError, Result};

/// How often the accept loop checks for shutdown.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

type Metadata = Arc<Mutex<HashMap<String, String>>>;

/// TCP transport factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

impl EdgeTransport for TcpTransport {
    type Handle = TcpHandle;

    fn create(&self, id: &str, connect_type: ConnectType, flag: EdgeFlag) -> Result<TcpHandle> {
        if !connect_type.is_supported() {
            return Err(EdgeError::transport(
                "create",
                format!("connection type {} is not supported", connect_type),
            ));
        }
        Ok(TcpHandle {
            id: id.to_string(),
            flag,
            info: Arc::new(Mutex::new(HashMap::new())),
            callback: None,
            running: Arc::new(AtomicBool::new(false)),
            server: None,
            client: None,
            released: false,
        })
    }
}

struct Subscriber {
    peer: SocketAddr,
    writer: BufWriter<TcpStream>,
}

struct Server {
    local_addr: SocketAddr,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    accept_thread: Option<JoinHandle<()>>,
}

struct Client {
    stream: TcpStream,
    reader_thread: Option<JoinHandle<()>>,
}

/// Handle created by [`TcpTransport`].
///
/// The event callback runs on transport threads. It must not stop or release
/// the handle that invoked it.
pub struct TcpHandle {
    id: String,
    flag: EdgeFlag,
    info: Metadata,
    callback: Option<EventCallback>,
    running: Arc<AtomicBool>,
    server: Option<Server>,
    client: Option<Client>,
    released: bool,
}

impl TcpHandle {
    /// Address the publisher listens on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|s| s.local_addr)
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.released {
            return Err(EdgeError::transport(operation, "handle has been released"));
        }
        Ok(())
    }

    fn listen(&mut self) -> Result<()> {
        let (host, port) = {
            let info = lock(&self.info);
            let host = info.get(INFO_HOST).cloned().unwrap_or_else(|| DEFAULT_HOST.to_string());
            let port = match info.get(INFO_PORT) {
                Some(p) => p
                    .parse::<u16>()
                    .map_err(|_| EdgeError::transport("start", format!("invalid port '{}'", p)))?,
                None => 0,
            };
            (host, port)
        };

        let listener = TcpListener::bind((host.as_str(), port)).map_err(|e| {
            EdgeError::transport_with_source("start", format!("cannot listen on {}:{}", host, port), e)
        })?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        lock(&self.info).insert(INFO_PORT.to_string(), local_addr.port().to_string());

        let subscribers = Arc::new(Mutex::new(Vec::new()));
        let accept_thread = {
            let subscribers = Arc::clone(&subscribers);
            let info = Arc::clone(&self.info);
            let callback = self.callback.clone();
            let running = Arc::clone(&self.running);
            thread::Builder::new()
                .name(format!("edge-accept-{}", self.id))
                .spawn(move || accept_loop(listener, subscribers, info, callback, running))?
        };

        info!("TCP publisher '{}' listening on {}", self.id, local_addr);
        self.server = Some(Server { local_addr, subscribers, accept_thread: Some(accept_thread) });
        Ok(())
    }

    fn broadcast(&self, message: &[u8]) -> usize {
        let Some(server) = &self.server else {
            return 0;
        };
        let mut subscribers = lock(&server.subscribers);
        subscribers.retain_mut(|s| match wire::write_message(&mut s.writer, message) {
            Ok(()) => true,
            Err(e) => {
                debug!("Dropping subscriber {}: {}", s.peer, e);
                false
            }
        });
        subscribers.len()
    }
}

fn accept_loop(
    listener: TcpListener,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    info: Metadata,
    callback: Option<EventCallback>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => match admit(stream, peer, &subscribers, &info) {
                Ok(()) => {
                    debug!("Subscriber {} connected", peer);
                    if let Some(cb) = &callback {
                        cb(EdgeEvent::ConnectionCompleted);
                    }
                }
                Err(e) => warn!("Failed to admit subscriber {}: {}", peer, e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                warn!("Accept failed: {}", e);
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    trace!("Accept loop finished");
}

fn admit(
    stream: TcpStream,
    peer: SocketAddr,
    subscribers: &Mutex<Vec<Subscriber>>,
    info: &Metadata,
) -> std::io::Result<()> {
    // Accepted sockets may inherit the listener's non-blocking mode.
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let mut writer = BufWriter::new(stream);

    // Holding the list lock while reading caps keeps a concurrent caps
    // update from slipping between the snapshot and the registration.
    let mut subscribers = lock(subscribers);
    let caps = lock(info).get(INFO_CAPS).cloned();
    if let Some(caps) = caps {
        wire::write_message(&mut writer, &wire::encode_info(INFO_CAPS, &caps)?)?;
    }
    subscribers.push(Subscriber { peer, writer });
    Ok(())
}

fn read_loop(
    stream: TcpStream,
    info: Metadata,
    callback: Option<EventCallback>,
    running: Arc<AtomicBool>,
) {
    let emit = |event: EdgeEvent| {
        if let Some(cb) = &callback {
            cb(event);
        }
    };
    let mut reader = BufReader::new(stream);

    loop {
        match wire::read_message(&mut reader) {
            Ok(Some(Inbound::Data(frame))) => emit(EdgeEvent::NewDataReceived(frame)),
            Ok(Some(Inbound::Info { key, value })) => {
                lock(&info).insert(key.clone(), value.clone());
                if key == INFO_CAPS {
                    emit(EdgeEvent::Capability(value));
                }
            }
            Ok(Some(Inbound::Unknown(tag))) => emit(EdgeEvent::Unknown(tag)),
            Ok(Some(Inbound::Malformed(reason))) => emit(EdgeEvent::Malformed(reason)),
            Ok(None) => {
                if running.load(Ordering::Acquire) {
                    debug!("Publisher closed the stream");
                    emit(EdgeEvent::ConnectionClosed);
                }
                break;
            }
            Err(e) => {
                if running.load(Ordering::Acquire) {
                    warn!("Lost connection to publisher: {}", e);
                    emit(EdgeEvent::ConnectionClosed);
                }
                break;
            }
        }
    }
    trace!("Read loop finished");
}

impl EdgeHandle for TcpHandle {
    fn set_info(&mut self, key: &str, value: &str) -> Result<()> {
        self.ensure_open("set_info")?;
        lock(&self.info).insert(key.to_string(), value.to_string());

        if key == INFO_CAPS && self.server.is_some() {
            let message = wire::encode_info(key, value)
                .map_err(|e| EdgeError::transport_with_source("set_info", "caps too large to send", e))?;
            let reached = self.broadcast(&message);
            debug!(subscribers = reached, "Pushed caps update");
        }
        Ok(())
    }

    fn get_info(&self, key: &str) -> Result<Option<String>> {
        self.ensure_open("get_info")?;
        Ok(lock(&self.info).get(key).cloned())
    }

    fn set_event_callback(&mut self, callback: EventCallback) -> Result<()> {
        self.ensure_open("set_event_callback")?;
        if self.running.load(Ordering::Acquire) {
            return Err(EdgeError::transport("set_event_callback", "handle already started"));
        }
        self.callback = Some(callback);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.ensure_open("start")?;
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(EdgeError::transport("start", "handle already started"));
        }

        if self.flag == EdgeFlag::Send {
            if let Err(e) = self.listen() {
                self.running.store(false, Ordering::Release);
                return Err(e);
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);

        if let Some(mut client) = self.client.take() {
            let _ = client.stream.shutdown(Shutdown::Both);
            if let Some(reader) = client.reader_thread.take() {
                if reader.join().is_err() {
                    warn!("Reader thread for '{}' panicked", self.id);
                }
            }
        }

        if let Some(mut server) = self.server.take() {
            if let Some(acceptor) = server.accept_thread.take() {
                if acceptor.join().is_err() {
                    warn!("Accept thread for '{}' panicked", self.id);
                }
            }
            for subscriber in lock(&server.subscribers).drain(..) {
                let _ = subscriber.writer.get_ref().shutdown(Shutdown::Both);
            }
        }
        Ok(())
    }

    fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.ensure_open("connect")?;
        if !self.running.load(Ordering::Acquire) {
            return Err(EdgeError::transport("connect", "handle not started"));
        }

        if self.flag == EdgeFlag::Send {
            // Publishers accept connections; connecting only confirms the listener.
            return match &self.server {
                Some(server) => {
                    trace!("Publisher '{}' already listening on {}", self.id, server.local_addr);
                    Ok(())
                }
                None => Err(EdgeError::transport("connect", "publisher is not listening")),
            };
        }

        if self.client.is_some() {
            return Err(EdgeError::transport("connect", "already connected"));
        }

        let stream = TcpStream::connect((host, port)).map_err(|e| {
            EdgeError::transport_with_source("connect", format!("cannot reach {}:{}", host, port), e)
        })?;
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;

        let reader_thread = {
            let info = Arc::clone(&self.info);
            let callback = self.callback.clone();
            let running = Arc::clone(&self.running);
            thread::Builder::new()
                .name(format!("edge-reader-{}", self.id))
                .spawn(move || read_loop(reader, info, callback, running))?
        };

        if let Some(cb) = &self.callback {
            cb(EdgeEvent::ConnectionCompleted);
        }
        info!("TCP subscriber '{}' connected to {}:{}", self.id, host, port);
        self.client = Some(Client { stream, reader_thread: Some(reader_thread) });
        Ok(())
    }

    fn send(&mut self, frame: FrameItem) -> Result<()> {
        self.ensure_open("send")?;
        if self.flag != EdgeFlag::Send {
            return Err(EdgeError::transport("send", "receive handle cannot send"));
        }
        if self.server.is_none() || !self.running.load(Ordering::Acquire) {
            return Err(EdgeError::transport("send", "handle not started"));
        }

        let message = wire::encode_data(&frame)
            .map_err(|e| EdgeError::transport_with_source("send", "frame cannot be framed", e))?;
        let reached = self.broadcast(&message);
        trace!(segments = frame.count(), bytes = frame.total_len(), subscribers = reached, "TCP send");
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        let _ = self.stop();
        self.callback = None;
        self.released = true;
        debug!("TCP handle '{}' released", self.id);
    }
}

impl Drop for TcpHandle {
    fn drop(&mut self) {
        self.release();
    }
}

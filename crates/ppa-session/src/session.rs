//! UDP discovery/control session.
//!
//! One tokio task owns the socket, the device registry, and the sequence
//! counter. Everything reaches it through channels: the handle sends
//! commands in, events come back out over a single typed mpsc channel.
//! Discovery is a periodic broadcast ping; liveness is swept on the same
//! tick. The protocol is fire-and-forget, so sends are never retried and
//! send failures surface as error events rather than state changes.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

use serde::Deserialize;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use ppa_protocol::commands;
use ppa_protocol::messages::{MessageHeader, MessageType};
use ppa_protocol::{
    COMPONENT_ALL, DEFAULT_BROADCAST_ADDRESS, DEFAULT_DEVICE_PORT, DEFAULT_DEVICE_TIMEOUT_MS,
    DEFAULT_DISCOVERY_INTERVAL_MS,
};

use crate::registry::{DeviceInfo, DeviceKey, DeviceRegistry};

const RECV_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Port the devices listen on; discovery broadcasts go here.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
    #[serde(default = "default_device_timeout_ms")]
    pub device_timeout_ms: u64,
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: Ipv4Addr,
}

fn default_discovery_port() -> u16 {
    DEFAULT_DEVICE_PORT
}

fn default_discovery_interval_ms() -> u64 {
    DEFAULT_DISCOVERY_INTERVAL_MS
}

fn default_device_timeout_ms() -> u64 {
    DEFAULT_DEVICE_TIMEOUT_MS
}

fn default_broadcast_address() -> Ipv4Addr {
    DEFAULT_BROADCAST_ADDRESS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            discovery_interval_ms: default_discovery_interval_ms(),
            device_timeout_ms: default_device_timeout_ms(),
            broadcast_address: default_broadcast_address(),
        }
    }
}

impl SessionConfig {
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }
}

/// Everything the session reports to its caller. Offline devices are
/// state (`DeviceTimedOut`), not errors; `Error` is reserved for
/// transport failures and misuse.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    DeviceDiscovered(DeviceInfo),
    DeviceTimedOut(DeviceInfo),
    MessageReceived {
        header: MessageHeader,
        source: SocketAddr,
    },
    Error(String),
}

/// `start()` is the only operation that fails synchronously; acquiring
/// the transport is a precondition for everything else.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to bind discovery socket: {0}")]
    Bind(#[source] std::io::Error),
}

enum Command {
    SendPing(DeviceKey),
    SendVolume(DeviceKey, f32),
    SendPresetRecall(DeviceKey, u8),
    AddDevice(DeviceKey),
    Devices(oneshot::Sender<Vec<DeviceInfo>>),
    Shutdown,
}

struct Running {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

pub struct Session {
    config: SessionConfig,
    events: mpsc::Sender<SessionEvent>,
    running: Option<Running>,
}

impl Session {
    pub fn new(config: SessionConfig, events: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            config,
            events,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bind a broadcast-capable socket on an ephemeral port and spawn the
    /// session loop. No-op when already running.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.running.is_some() {
            warn!("session already running");
            return Ok(());
        }

        let socket = bind_broadcast_socket().map_err(SessionError::Bind)?;
        let local = socket.local_addr().map_err(SessionError::Bind)?;
        info!(
            %local,
            port = self.config.discovery_port,
            interval_ms = self.config.discovery_interval_ms,
            "session transport bound"
        );

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let session_loop = SessionLoop {
            socket,
            config: self.config.clone(),
            registry: DeviceRegistry::new(),
            sequence: 1,
            commands: cmd_rx,
            events: self.events.clone(),
        };
        let task = tokio::spawn(session_loop.run());

        self.running = Some(Running {
            commands: cmd_tx,
            task,
        });
        Ok(())
    }

    /// Shut the loop down, close the socket, and drop the registry.
    /// Waits for the loop to exit so no events fire afterwards.
    /// Idempotent.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.commands.send(Command::Shutdown);
        let _ = running.task.await;
        info!("session stopped");
    }

    /// Unicast a liveness ping to one device.
    pub fn send_ping(&self, target: DeviceKey) {
        self.dispatch(Command::SendPing(target));
    }

    /// Set a device's master volume (normalized 0.0..=1.0, saturating).
    pub fn send_volume(&self, target: DeviceKey, level: f32) {
        self.dispatch(Command::SendVolume(target, level));
    }

    /// Recall a stored preset by index on one device.
    pub fn send_preset_recall(&self, target: DeviceKey, index: u8) {
        self.dispatch(Command::SendPresetRecall(target, index));
    }

    /// Register a device by address without waiting for discovery. It is
    /// reported immediately (disconnected) and pinged once; only a real
    /// response flips it to connected.
    pub fn add_device(&self, host: impl Into<String>, port: u16) {
        self.dispatch(Command::AddDevice(DeviceKey::new(host, port)));
    }

    /// Snapshot of the registry. Empty when the session is stopped.
    pub async fn devices(&self) -> Vec<DeviceInfo> {
        let Some(running) = &self.running else {
            return Vec::new();
        };
        let (tx, rx) = oneshot::channel();
        if running.commands.send(Command::Devices(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    fn dispatch(&self, command: Command) {
        match &self.running {
            Some(running) => {
                // The loop only drops the receiver on shutdown; a failed
                // send means we raced a stop() and the command is moot.
                let _ = running.commands.send(command);
            }
            None => {
                let _ = self
                    .events
                    .try_send(SessionEvent::Error("session not running".to_string()));
            }
        }
    }
}

fn bind_broadcast_socket() -> std::io::Result<UdpSocket> {
    let s = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    s.set_reuse_address(true)?;
    s.set_broadcast(true)?;
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    s.bind(&addr.into())?;
    s.set_nonblocking(true)?;
    UdpSocket::from_std(s.into())
}

fn next_sequence(counter: &mut u16) -> u16 {
    *counter = counter.wrapping_add(1);
    *counter
}

struct SessionLoop {
    socket: UdpSocket,
    config: SessionConfig,
    registry: DeviceRegistry,
    sequence: u16,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<SessionEvent>,
}

impl SessionLoop {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.discovery_interval());
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.discovery_tick().await;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, src)) => self.handle_datagram(&buf[..len], src),
                    Err(e) => self.emit_error(format!("socket receive failed: {e}")),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
            }
        }

        self.registry.clear();
        debug!("session loop exited");
    }

    /// One discovery cycle: broadcast a ping, then sweep for devices that
    /// went silent. Timeout detection is cooperative, so worst-case
    /// latency is one interval past the threshold.
    async fn discovery_tick(&mut self) {
        let seq = next_sequence(&mut self.sequence);
        let frame = commands::ping(seq, COMPONENT_ALL);
        let dest = SocketAddr::V4(SocketAddrV4::new(
            self.config.broadcast_address,
            self.config.discovery_port,
        ));

        match self.socket.send_to(&frame, dest).await {
            Ok(_) => debug!(seq, %dest, "discovery ping broadcast"),
            Err(e) => self.emit_error(format!("discovery broadcast failed: {e}")),
        }

        for device in self
            .registry
            .sweep_timeouts(Instant::now(), self.config.device_timeout())
        {
            info!(device = %device.key, "device timed out");
            self.emit(SessionEvent::DeviceTimedOut(device));
        }
    }

    fn handle_datagram(&mut self, data: &[u8], src: SocketAddr) {
        let header = match MessageHeader::decode(data) {
            Ok(header) => header,
            Err(_) => {
                // Likely a non-protocol or corrupted packet; not worth an
                // error event.
                trace!(from = %src, len = data.len(), "dropping undecodable datagram");
                return;
            }
        };

        let key = DeviceKey::from_addr(src);
        let now = Instant::now();

        if self.registry.contains(&key) {
            self.registry
                .mark_connected(&key, Some(header.device_unique_id), now);
        } else if header.message_type == MessageType::Ping {
            // Unknown sender answering a ping: a newly discovered device.
            let mut device = DeviceInfo::new(key.clone(), now);
            device.unique_id = header.device_unique_id;
            device.is_connected = true;
            self.registry.upsert(device.clone());
            info!(device = %key, id = ?device.unique_id, "discovered device");
            self.emit(SessionEvent::DeviceDiscovered(device));
        }

        self.emit(SessionEvent::MessageReceived {
            header,
            source: src,
        });
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendPing(key) => {
                let frame = commands::ping(next_sequence(&mut self.sequence), COMPONENT_ALL);
                self.send_frame(&key, &frame, "ping").await;
            }
            Command::SendVolume(key, level) => {
                let frame =
                    commands::volume(level, next_sequence(&mut self.sequence), COMPONENT_ALL);
                self.send_frame(&key, &frame, "volume command").await;
            }
            Command::SendPresetRecall(key, index) => {
                let frame = commands::preset_recall(
                    index,
                    next_sequence(&mut self.sequence),
                    COMPONENT_ALL,
                );
                self.send_frame(&key, &frame, "preset recall").await;
            }
            Command::AddDevice(key) => self.add_device(key).await,
            Command::Devices(reply) => {
                let _ = reply.send(self.registry.all());
            }
            Command::Shutdown => unreachable!("handled by the loop"),
        }
    }

    async fn add_device(&mut self, key: DeviceKey) {
        let device = DeviceInfo::new(key.clone(), Instant::now());
        self.registry.upsert(device.clone());
        info!(device = %key, "device added manually");
        self.emit(SessionEvent::DeviceDiscovered(device));

        // Verification ping; the device stays disconnected until it
        // actually answers.
        let frame = commands::ping(next_sequence(&mut self.sequence), COMPONENT_ALL);
        self.send_frame(&key, &frame, "verification ping").await;
    }

    async fn send_frame(&mut self, key: &DeviceKey, frame: &[u8], what: &str) {
        let addr = match key.to_socket_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.emit_error(format!("invalid device address {key}: {e}"));
                return;
            }
        };

        match self.socket.send_to(frame, addr).await {
            Ok(_) => debug!(device = %key, what, "sent"),
            Err(e) => self.emit_error(format!("failed to send {what} to {key}: {e}")),
        }
    }

    fn emit(&self, event: SessionEvent) {
        // Never block the loop on a lagging or absent consumer: stop()
        // waits for the loop to exit, so a full channel would wedge
        // shutdown. Events are as fire-and-forget as the protocol.
        if let Err(e) = self.events.try_send(event) {
            debug!("dropping event, consumer not keeping up: {e}");
        }
    }

    fn emit_error(&self, message: String) {
        warn!("{message}");
        self.emit(SessionEvent::Error(message));
    }
}

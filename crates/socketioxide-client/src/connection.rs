//! A [`Connection`] is one socket.io session with a server origin.
//!
//! It multiplexes several [`NsSocket`]s, one per namespace, over a single transport.
//! Everything that touches the transport or the timers runs on a dedicated task
//! (see [`crate::engine`]), the [`Connection`] handle only talks to it through [`Command`]s.
//!
//! ```text
//!            register / send / emit / disconnect
//!   NsSocket ───────────────────────────────────┐
//!                                               ▼
//!   Transport ──── TransportEvents ────► [ command channel ] ───► engine task
//!   timers ────────────────────────────────────▲                     │
//!                                                                    ▼
//!                                                      SocketCallback / AckCallback
//! ```
use std::{
    fmt,
    sync::{
        Arc, Mutex, OnceLock, Weak,
        atomic::{AtomicU8, Ordering},
    },
};

use http::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use socketioxide_client_core::{
    CorrelationId, DEFAULT_NS, Frame, HandshakeData, ProtocolVersion, Str,
};
use tokio::sync::mpsc;

use crate::{
    ack::{AckCallback, AckTable},
    buffer::OutputBuffer,
    config::ClientConfig,
    engine::Engine,
    errors::{Error, SendError},
    ns::{NamespaceRegistry, NsSocket},
    registry::RegistryInner,
    transport::TransportEvent,
};

/// Messages processed by the engine task of a connection.
#[derive(Debug)]
pub(crate) enum Command {
    /// The handshake request completed
    Handshake(Result<HandshakeData, Error>),
    /// Something happened to the transport of the given generation
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    /// Send an encoded frame, or buffer it until the transport is ready
    Send(Str),
    /// A socket joined the connection
    Registered(Str),
    /// Time to send a keepalive
    Heartbeat,
    /// Nothing was received within the heartbeat window of the given generation
    WatchdogExpired(u64),
    /// The reconnect delay elapsed
    ReconnectTimer,
    /// The closing timeout elapsed without a successful reconnect
    ReconnectDeadline,
    /// Drop the transport and reconnect
    Reconnect,
    /// Tear the connection down, every remaining socket is disconnected
    Shutdown,
}

pub(crate) type CommandTx = mpsc::UnboundedSender<Command>;

/// The lifecycle of a [`Connection`].
///
/// `Invalid` is terminal, a connection never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Created, the handshake is not started yet
    Init = 0,
    /// The handshake request is in flight
    Handshaking = 1,
    /// A transport is connecting
    ConnectingTransport = 2,
    /// The transport is connected, frames are sent right away
    Ready = 3,
    /// The transport was lost, a reconnect is scheduled
    Interrupted = 4,
    /// The connection is torn down
    Invalid = 5,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Init,
            1 => ConnectionState::Handshaking,
            2 => ConnectionState::ConnectingTransport,
            3 => ConnectionState::Ready,
            4 => ConnectionState::Interrupted,
            _ => ConnectionState::Invalid,
        }
    }
}

/// A socket.io session with one server origin.
///
/// Connections are created by a [`ConnectionRegistry`](crate::ConnectionRegistry) when a socket
/// is registered for an origin that has no usable connection.
/// All the methods can be called from any thread, they never block on the network.
pub struct Connection {
    origin: String,
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) headers: HeaderMap,
    pub(crate) sockets: NamespaceRegistry,
    pub(crate) acks: AckTable,
    pub(crate) buffer: OutputBuffer,
    pub(crate) session: OnceLock<HandshakeData>,
    state: AtomicU8,
    transport_name: Mutex<Option<&'static str>>,
    last_error: Mutex<Option<Error>>,
    pub(crate) cmd_tx: CommandTx,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    registry: Weak<RegistryInner>,
}

impl Connection {
    pub(crate) fn new(
        origin: String,
        config: Arc<ClientConfig>,
        headers: HeaderMap,
        registry: Weak<RegistryInner>,
    ) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            origin,
            config,
            headers,
            sockets: NamespaceRegistry::default(),
            acks: AckTable::new(),
            buffer: OutputBuffer::default(),
            session: OnceLock::new(),
            state: AtomicU8::new(ConnectionState::Init as u8),
            transport_name: Mutex::new(None),
            last_error: Mutex::new(None),
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            registry,
        })
    }

    /// Spawn the engine task. It must be called from a tokio runtime.
    pub(crate) fn start(self: &Arc<Self>) {
        if let Some(rx) = self.cmd_rx.lock().unwrap().take() {
            #[cfg(feature = "tracing")]
            tracing::debug!(origin = self.origin, "starting connection");
            tokio::spawn(Engine::new(self.clone(), rx).run());
        }
    }

    /// The `scheme://host:port` origin of the server.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The protocol version of this connection.
    pub fn protocol(&self) -> ProtocolVersion {
        self.config.protocol
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// The session negotiated by the handshake, once it completed.
    pub fn session(&self) -> Option<&HandshakeData> {
        self.session.get()
    }

    /// The name of the current transport, if one was selected.
    pub fn transport_name(&self) -> Option<&'static str> {
        *self.transport_name.lock().unwrap()
    }

    /// The last error that interrupted or tore down this connection.
    pub fn last_error(&self) -> Option<Error> {
        self.last_error.lock().unwrap().clone()
    }

    /// The number of frames waiting for the transport.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The number of acknowledgements still awaited from the server.
    pub fn pending_acks(&self) -> usize {
        self.acks.len()
    }

    /// Attach a socket to this connection.
    ///
    /// Returns `false` if the connection is torn down or closing, if its namespace is already taken
    /// or if the socket was already registered once.
    /// A connect frame is sent for every namespace except the default one.
    pub fn register(self: &Arc<Self>, socket: &Arc<NsSocket>) -> bool {
        let registered = self
            .sockets
            .register_if(socket, || self.state() != ConnectionState::Invalid);
        if !registered {
            return false;
        }
        socket.bind(Arc::downgrade(self));
        #[cfg(feature = "tracing")]
        tracing::debug!(origin = self.origin, ns = ?socket.ns(), "socket registered");
        let _ = self.cmd_tx.send(Command::Registered(socket.ns().clone()));
        true
    }

    /// Detach a socket from this connection.
    ///
    /// A disconnect frame is sent for the namespace and `on_disconnect` is called.
    /// The connection is torn down once its last socket is gone.
    /// Unregistering twice is a no-op.
    pub fn unregister(&self, socket: &NsSocket) {
        if !socket.mark_dead() {
            return;
        }
        self.sockets.remove_socket(socket);
        #[cfg(feature = "tracing")]
        tracing::debug!(origin = self.origin, ns = ?socket.ns(), "socket unregistered");

        if let Ok(raw) = self.protocol().encode(&Frame::disconnect(socket.ns())) {
            let _ = self.cmd_tx.send(Command::Send(raw));
        }
        // an emptied connection takes no more sockets, the next one gets a new connection
        if self.sockets.is_closed() {
            self.detach();
            let _ = self.cmd_tx.send(Command::Shutdown);
        }
        socket.deliver_disconnect();
    }

    /// Send a text message on behalf of `socket`.
    pub fn send(
        &self,
        socket: &NsSocket,
        text: impl Into<Str>,
        ack: Option<AckCallback>,
    ) -> Result<(), SendError> {
        self.send_frame(socket, Frame::message(socket.ns(), text), ack)
    }

    /// Send a structured message on behalf of `socket`.
    pub fn send_json(
        &self,
        socket: &NsSocket,
        value: Value,
        ack: Option<AckCallback>,
    ) -> Result<(), SendError> {
        self.send_frame(socket, Frame::json(socket.ns(), value), ack)
    }

    /// Emit an event on behalf of `socket`.
    pub fn emit(
        &self,
        socket: &NsSocket,
        event: impl Into<String>,
        args: Vec<Value>,
        ack: Option<AckCallback>,
    ) -> Result<(), SendError> {
        self.send_frame(socket, Frame::event(socket.ns(), event, args), ack)
    }

    /// Emit an event with a single argument serialized from `data`.
    pub fn emit_serialize<T: Serialize + ?Sized>(
        &self,
        socket: &NsSocket,
        event: impl Into<String>,
        data: &T,
        ack: Option<AckCallback>,
    ) -> Result<(), SendError> {
        let value = serde_json::to_value(data)?;
        self.emit(socket, event, vec![value], ack)
    }

    /// Drop the current transport and connect a new one with the same session.
    pub fn reconnect(&self) {
        let _ = self.cmd_tx.send(Command::Reconnect);
    }

    /// Tear the connection down. Every remaining socket gets `on_disconnect`.
    pub fn disconnect(&self) {
        self.sockets.close();
        self.detach();
        let _ = self.cmd_tx.send(Command::Shutdown);
    }

    fn send_frame(
        &self,
        socket: &NsSocket,
        mut frame: Frame,
        ack: Option<AckCallback>,
    ) -> Result<(), SendError> {
        if !socket.is_registered() {
            return Err(SendError::SocketClosed);
        }
        if self.state() == ConnectionState::Invalid {
            return Err(SendError::ConnectionClosed);
        }
        if let Some(ack) = ack {
            frame.id = Some(CorrelationId::requested(self.acks.request_ack(ack)));
        }
        let raw = self.protocol().encode(&frame)?;
        #[cfg(feature = "tracing")]
        tracing::trace!(origin = self.origin, ?raw, "queueing frame");
        self.cmd_tx
            .send(Command::Send(raw))
            .map_err(|_| SendError::ConnectionClosed)
    }

    /// Move to `state`, fails once the connection is invalid.
    pub(crate) fn set_state(&self, state: ConnectionState) -> bool {
        let res = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != ConnectionState::Invalid as u8).then_some(state as u8)
            });
        #[cfg(feature = "tracing")]
        if let Ok(prev) = res {
            tracing::debug!(
                origin = self.origin,
                "connection state {:?} -> {:?}",
                ConnectionState::from_u8(prev),
                state
            );
        }
        res.is_ok()
    }

    pub(crate) fn set_transport_name(&self, name: &'static str) {
        self.transport_name.lock().unwrap().replace(name);
    }

    pub(crate) fn set_last_error(&self, err: Error) {
        self.last_error.lock().unwrap().replace(err);
    }

    /// The socket that gets `on_connect` when the transport is first ready.
    pub(crate) fn default_socket(&self) -> Option<Arc<NsSocket>> {
        self.sockets.get(DEFAULT_NS)
    }

    /// Forget this connection in its registry.
    pub(crate) fn detach(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("origin", &self.origin)
            .field("state", &self.state())
            .field("transport", &self.transport_name())
            .field("sockets", &self.sockets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_is_terminal() {
        let conn = Connection::new(
            "http://localhost".into(),
            Arc::new(ClientConfig::default()),
            HeaderMap::new(),
            Weak::new(),
        );
        assert_eq!(conn.state(), ConnectionState::Init);
        assert!(conn.set_state(ConnectionState::Handshaking));
        assert!(conn.set_state(ConnectionState::Invalid));
        assert!(!conn.set_state(ConnectionState::Ready));
        assert!(!conn.set_state(ConnectionState::Invalid));
        assert_eq!(conn.state(), ConnectionState::Invalid);
    }

    #[test]
    fn sends_are_refused_once_invalid() {
        struct Noop;
        impl crate::SocketCallback for Noop {}

        let conn = Connection::new(
            "http://localhost".into(),
            Arc::new(ClientConfig::default()),
            HeaderMap::new(),
            Weak::new(),
        );
        let socket = NsSocket::new("/chat", Noop);
        assert!(matches!(
            conn.emit(&socket, "ev", vec![], None),
            Err(SendError::SocketClosed)
        ));
        assert!(conn.register(&socket));
        conn.emit(&socket, "ev", vec![], None).unwrap();
        conn.set_state(ConnectionState::Invalid);
        assert!(matches!(
            conn.emit(&socket, "ev", vec![], None),
            Err(SendError::ConnectionClosed)
        ));
        assert!(!conn.register(&NsSocket::new("/news", Noop)));
    }
}

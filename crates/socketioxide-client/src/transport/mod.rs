//! The transport contract used by the connection engine.
//!
//! The engine never knows which concrete transport it drives. A transport is created by
//! a [`TransportFactory`] selected by name from the transports advertised by the server,
//! and reports everything that happens to it through its [`TransportEvents`] sink.
use std::time::{SystemTime, UNIX_EPOCH};

use http::HeaderMap;
use socketioxide_client_core::{ProtocolVersion, Str};

use crate::{
    connection::{Command, CommandTx},
    errors::TransportError,
};

pub mod polling;
pub mod ws;

pub use polling::{PollingFactory, PollingTransport};
pub use ws::{WebsocketFactory, WebsocketTransport};

/// A concrete network mechanism carrying encoded frames.
///
/// Every operation is non-blocking: completion and failures are reported asynchronously
/// through the [`TransportEvents`] given to [`Transport::connect`].
pub trait Transport: Send + 'static {
    /// The transport name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Start connecting. [`TransportEvents::connected`] must be called once ready.
    fn connect(&mut self, events: TransportEvents);

    /// Send one frame. Fails if the transport is not connected.
    fn send(&mut self, frame: Str) -> Result<(), TransportError>;

    /// Whether [`Transport::send_bulk`] is supported.
    fn can_send_bulk(&self) -> bool {
        false
    }

    /// Send several frames at once, in order.
    fn send_bulk(&mut self, frames: &[Str]) -> Result<(), TransportError> {
        let _ = frames;
        Err(TransportError::BulkUnsupported)
    }

    /// Gracefully close the transport.
    fn disconnect(&mut self);

    /// Detach the transport from the engine, no event should be reported afterwards.
    fn invalidate(&mut self);
}

/// Creates transports of one kind.
pub trait TransportFactory: Send + Sync + 'static {
    /// The name the server advertises for this transport with the given protocol version.
    fn name(&self, version: ProtocolVersion) -> &'static str;

    /// Create a transport for the given session.
    fn create(&self, ctx: &TransportContext) -> Box<dyn Transport>;
}

/// Everything a transport needs to reach a session.
#[derive(Debug, Clone)]
pub struct TransportContext {
    /// `scheme://host:port` of the server
    pub origin: String,
    /// The base path, e.g. `/socket.io/1/`
    pub req_path: String,
    /// The session id
    pub sid: String,
    /// The protocol version of the session
    pub version: ProtocolVersion,
    /// Custom headers added to every request
    pub headers: HeaderMap,
}

impl TransportContext {
    /// The http url of the given transport for this session.
    ///
    /// * 0.9.x: `{origin}{req_path}{transport}/{sid}`
    /// * 1.0.x: `{origin}{req_path}?EIO=2&transport={transport}&sid={sid}`
    pub fn url(&self, transport: &str) -> String {
        match self.version {
            ProtocolVersion::V1 => {
                format!("{}{}{}/{}", self.origin, self.req_path, transport, self.sid)
            }
            ProtocolVersion::V2 => format!(
                "{}{}?EIO=2&transport={}&sid={}",
                self.origin, self.req_path, transport, self.sid
            ),
        }
    }

    /// Same as [`TransportContext::url`] with a `ws` or `wss` scheme.
    pub fn ws_url(&self, transport: &str) -> String {
        let url = self.url(transport);
        if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            url
        }
    }

    /// Same as [`TransportContext::url`] with a cache busting timestamp.
    pub fn polling_url(&self, transport: &str) -> String {
        let sep = match self.version {
            ProtocolVersion::V1 => '?',
            ProtocolVersion::V2 => '&',
        };
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        format!("{}{sep}t={t}", self.url(transport))
    }
}

/// What happened to a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// The transport is ready to send
    Connected,
    /// One frame was received
    Message(Str),
    /// A multi-frame payload was received
    Payload(Str),
    /// The transport was closed
    Closed,
    /// The transport failed and is not usable anymore
    Error(TransportError),
    /// Frames accepted by [`Transport::send`] that never reached the server
    Unsent(Vec<Str>),
}

/// The sink through which a transport reports its events to the engine.
///
/// Events of a transport superseded by a newer one are ignored.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    tx: CommandTx,
}

impl TransportEvents {
    pub(crate) fn new(generation: u64, tx: CommandTx) -> Self {
        Self { generation, tx }
    }

    /// The transport is ready.
    pub fn connected(&self) {
        self.emit(TransportEvent::Connected);
    }

    /// A single frame was received.
    pub fn message(&self, frame: Str) {
        self.emit(TransportEvent::Message(frame));
    }

    /// A multi-frame payload was received, it is split by the engine.
    pub fn payload(&self, data: Str) {
        self.emit(TransportEvent::Payload(data));
    }

    /// The transport was closed.
    pub fn closed(&self) {
        self.emit(TransportEvent::Closed);
    }

    /// The transport failed.
    pub fn error(&self, err: TransportError) {
        self.emit(TransportEvent::Error(err));
    }

    /// Give back frames that could not be delivered, they are sent again after a reconnect.
    ///
    /// It must be reported before the [`TransportEvents::error`] that ends the transport.
    pub fn unsent(&self, frames: Vec<Str>) {
        if !frames.is_empty() {
            self.emit(TransportEvent::Unsent(frames));
        }
    }

    /// Whether the engine is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn emit(&self, event: TransportEvent) {
        #[cfg(feature = "tracing")]
        tracing::trace!(generation = self.generation, ?event, "transport event");
        // the engine may already be torn down
        let _ = self.tx.send(Command::Transport {
            generation: self.generation,
            event,
        });
    }
}

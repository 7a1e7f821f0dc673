//! The [`Frame`] is the base unit of data exchanged with a socket.io server.
//!
//! A frame is version agnostic: the same value is encoded to the 0.9.x or to the
//! 1.0.x wire format by the [`ProtocolVersion`](crate::ProtocolVersion) codec.
use std::fmt;

use serde_json::Value;

use crate::Str;

/// The path of the default namespace.
///
/// The 0.9.x protocol writes it as an empty endpoint and the 1.0.x protocol omits it,
/// both are normalized to `/` once decoded.
pub const DEFAULT_NS: &str = "/";

/// Normalize a namespace path, an empty path is the default namespace.
pub fn normalize_ns(ns: &str) -> Str {
    if ns.is_empty() || ns == DEFAULT_NS {
        Str::from(DEFAULT_NS)
    } else {
        Str::copy_from_slice(ns)
    }
}

/// The correlation id attached to a frame that expects an acknowledgement.
///
/// With the 0.9.x protocol an id followed by a `+` asks for an acknowledgement carrying data,
/// a bare id asks for an automatic, empty, acknowledgement.
/// The 1.0.x protocol only knows about the first kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId {
    /// The numeric id
    pub id: i64,
    /// Whether the peer expects data back (trailing `+`)
    pub wants_data: bool,
}

impl CorrelationId {
    /// An id requesting an acknowledgement with data.
    pub fn requested(id: i64) -> Self {
        Self {
            id,
            wants_data: true,
        }
    }
    /// An id requesting an automatic acknowledgement.
    pub fn automatic(id: i64) -> Self {
        Self {
            id,
            wants_data: false,
        }
    }
}

/// Formatted the way the 0.9.x protocol writes it, e.g. `12+`.
impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = itoa::Buffer::new();
        f.write_str(buf.format(self.id))?;
        if self.wants_data {
            f.write_str("+")?;
        }
        Ok(())
    }
}

/// Probe frames exchanged while upgrading a 1.0.x session to another transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// `2probe`
    Ping,
    /// `3probe`
    Pong,
}

/// | Kind          | 0.9.x | 1.0.x        |
/// |---------------|-------|--------------|
/// | Disconnect    | `0`   | `41`         |
/// | Connect       | `1`   | `40`         |
/// | Heartbeat     | `2`   | `2` (ping)   |
/// | Pong          | -     | `3`          |
/// | Probe         | -     | `2probe` / `3probe` |
/// | Open          | -     | `0`          |
/// | Close         | -     | `1`          |
/// | Upgrade       | -     | `5`          |
/// | Message       | `3`   | `42["message",text]` |
/// | JsonMessage   | `4`   | `42["message",json]` |
/// | Event         | `5`   | `42`         |
/// | Ack           | `6`   | `43`         |
/// | Error         | `7`   | `44`         |
/// | Noop          | `8`   | `6`          |
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    /// Disconnect from a namespace (or from the whole session for the default one)
    Disconnect,
    /// Connect to a namespace
    Connect,
    /// Keepalive frame
    Heartbeat,
    /// Answer to a 1.0.x ping
    Pong,
    /// Transport upgrade probe
    Probe(Probe),
    /// 1.0.x engine open packet, the payload is the raw handshake json
    Open(Str),
    /// 1.0.x engine close packet
    Close,
    /// 1.0.x engine upgrade packet
    Upgrade,
    /// Plain text message
    Message(Str),
    /// Structured message
    JsonMessage(Value),
    /// Named event with positional arguments
    Event {
        /// The event name
        name: String,
        /// The event arguments, possibly empty
        args: Vec<Value>,
    },
    /// Acknowledgement of the frame previously sent with the `id` correlation id
    Ack {
        /// The acknowledged id
        id: i64,
        /// Arguments given to the acknowledgement
        args: Vec<Value>,
    },
    /// Error pushed by the server
    Error(Str),
    /// No operation
    Noop,
}

impl FrameData {
    /// A short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FrameData::Disconnect => "disconnect",
            FrameData::Connect => "connect",
            FrameData::Heartbeat => "heartbeat",
            FrameData::Pong => "pong",
            FrameData::Probe(_) => "probe",
            FrameData::Open(_) => "open",
            FrameData::Close => "close",
            FrameData::Upgrade => "upgrade",
            FrameData::Message(_) => "message",
            FrameData::JsonMessage(_) => "json message",
            FrameData::Event { .. } => "event",
            FrameData::Ack { .. } => "ack",
            FrameData::Error(_) => "error",
            FrameData::Noop => "noop",
        }
    }

    /// Whether this frame can carry a [`CorrelationId`] requesting an acknowledgement.
    pub fn accepts_id(&self) -> bool {
        matches!(
            self,
            FrameData::Message(_) | FrameData::JsonMessage(_) | FrameData::Event { .. }
        )
    }
}

/// A socket.io frame: a [`FrameData`], the namespace it belongs to
/// and an optional [`CorrelationId`].
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The frame data
    pub data: FrameData,
    /// The namespace the frame belongs to, `/` for the default namespace
    pub ns: Str,
    /// The correlation id when the sender expects an acknowledgement
    pub id: Option<CorrelationId>,
}

impl Frame {
    /// Create a frame for the given namespace
    pub fn new(ns: impl AsRef<str>, data: FrameData) -> Self {
        Self {
            data,
            ns: normalize_ns(ns.as_ref()),
            id: None,
        }
    }

    /// Create a frame for the default namespace
    pub fn root(data: FrameData) -> Self {
        Self {
            data,
            ns: Str::from(DEFAULT_NS),
            id: None,
        }
    }

    /// Create a connect frame for the given namespace
    pub fn connect(ns: impl AsRef<str>) -> Self {
        Self::new(ns, FrameData::Connect)
    }

    /// Create a disconnect frame for the given namespace
    pub fn disconnect(ns: impl AsRef<str>) -> Self {
        Self::new(ns, FrameData::Disconnect)
    }

    /// Create a keepalive frame
    pub fn heartbeat() -> Self {
        Self::root(FrameData::Heartbeat)
    }

    /// Create a text message frame
    pub fn message(ns: impl AsRef<str>, text: impl Into<Str>) -> Self {
        Self::new(ns, FrameData::Message(text.into()))
    }

    /// Create a structured message frame
    pub fn json(ns: impl AsRef<str>, value: Value) -> Self {
        Self::new(ns, FrameData::JsonMessage(value))
    }

    /// Create an event frame
    pub fn event(ns: impl AsRef<str>, name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(
            ns,
            FrameData::Event {
                name: name.into(),
                args,
            },
        )
    }

    /// Create an acknowledgement frame for the given id
    pub fn ack(ns: impl AsRef<str>, id: i64, args: Vec<Value>) -> Self {
        Self::new(ns, FrameData::Ack { id, args })
    }

    /// Set the correlation id of the frame
    pub fn with_id(mut self, id: CorrelationId) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether the frame belongs to the default namespace
    pub fn is_default_ns(&self) -> bool {
        self.ns == DEFAULT_NS
    }
}

/// Error frames advising the client to disconnect end with this suffix (0.9.x).
const DISCONNECT_ADVICE: &str = "+0";

impl Frame {
    /// Whether this is an error frame advising the client to disconnect.
    pub fn advises_disconnect(&self) -> bool {
        matches!(&self.data, FrameData::Error(reason) if reason.ends_with(DISCONNECT_ADVICE))
    }
}

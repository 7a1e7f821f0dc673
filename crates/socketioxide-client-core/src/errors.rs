//! Errors raised while encoding or decoding frames, payloads and handshakes.
use crate::ProtocolVersion;

/// Error raised when a frame cannot be decoded.
///
/// Only [`DecodeError::Garbage`] is fatal to a connection,
/// every other variant only drops the offending frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The control code is not numeric or the frame is empty.
    #[error("garbage frame: {0:?}")]
    Garbage(String),
    /// The control code is numeric but unknown.
    #[error("unknown control code {0}")]
    UnknownControlCode(u32),
    /// The frame payload is not the expected json.
    #[error("malformed json payload: {0}")]
    MalformedJson(#[from] serde_json::Error),
    /// The frame payload has an unexpected shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(&'static str),
    /// The correlation id is not a number.
    #[error("invalid correlation id: {0:?}")]
    InvalidId(String),
    /// The frame is valid but not supported by this implementation (binary attachments).
    #[error("unsupported frame: {0}")]
    Unsupported(&'static str),
}

impl DecodeError {
    /// Whether the connection should be torn down after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::Garbage(_))
    }
}

/// Error raised when a frame cannot be encoded.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The frame kind has no representation for this protocol version.
    #[error("{frame} frames cannot be encoded with protocol {version}")]
    Unsupported {
        /// The frame kind
        frame: &'static str,
        /// The protocol version
        version: ProtocolVersion,
    },
    /// The frame arguments could not be serialized.
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error raised when a multi-frame transport payload cannot be split.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PayloadError {
    /// The length prefix is missing or not a number.
    #[error("invalid length prefix at offset {0}")]
    InvalidLength(usize),
    /// The announced length does not match the remaining data.
    #[error("length mismatch: {expected} announced at offset {offset}")]
    LengthMismatch {
        /// The byte offset of the faulty frame
        offset: usize,
        /// The announced length in utf-16 code units
        expected: usize,
    },
}

/// Error raised when a handshake response cannot be parsed.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// The body is neither a 0.9.x colon separated record nor a 1.0.x json document.
    #[error("unrecognized handshake body: {0:?}")]
    Malformed(String),
    /// A timeout field is not a number.
    #[error("invalid timeout field {0:?}")]
    InvalidTimeout(String),
    /// The 1.0.x json document could not be deserialized.
    #[error("invalid handshake json: {0}")]
    Json(#[from] serde_json::Error),
    /// The server answered with a different protocol version than the one configured.
    #[error("server speaks protocol {found}, expected {expected}")]
    VersionMismatch {
        /// The configured version
        expected: ProtocolVersion,
        /// The version detected from the response
        found: ProtocolVersion,
    },
}

//! Frame codecs for the supported protocol versions.
//!
//! Each version lives in its own module exposing a pair of pure `encode` / `decode`
//! functions, [`ProtocolVersion`] dispatches to the right one.
use std::{fmt, str::FromStr};

use crate::{
    Str,
    errors::{DecodeError, EncodeError},
    frame::Frame,
};

pub mod v1;
pub mod v2;

/// The socket.io protocol version spoken by a connection.
///
/// It is chosen once when the connection is configured and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// The socket.io 0.9.x protocol
    #[default]
    V1,
    /// The socket.io 1.0.x protocol (engine.io 2)
    V2,
}

impl ProtocolVersion {
    /// Encode a frame to its wire representation.
    #[inline]
    pub fn encode(self, frame: &Frame) -> Result<Str, EncodeError> {
        match self {
            ProtocolVersion::V1 => v1::encode(frame),
            ProtocolVersion::V2 => v2::encode(frame),
        }
    }

    /// Decode a frame from its wire representation.
    #[inline]
    pub fn decode(self, raw: &Str) -> Result<Frame, DecodeError> {
        match self {
            ProtocolVersion::V1 => v1::decode(raw),
            ProtocolVersion::V2 => v2::decode(raw),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => f.write_str("0.9"),
            ProtocolVersion::V2 => f.write_str("1.0"),
        }
    }
}

/// Error returned when parsing an unknown protocol version.
#[derive(Debug, thiserror::Error)]
#[error("unknown protocol version {0:?}")]
pub struct UnknownProtocolVersion(String);

impl FromStr for ProtocolVersion {
    type Err = UnknownProtocolVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" | "0.9" | "v1" | "V1" => Ok(ProtocolVersion::V1),
            "2" | "1.0" | "v2" | "V2" => Ok(ProtocolVersion::V2),
            _ => Err(UnknownProtocolVersion(s.to_string())),
        }
    }
}

/// Read the leading ascii digits of `s`, returning the parsed number and the rest.
///
/// Returns `None` when `s` does not start with a digit or the number overflows.
pub(crate) fn split_number(s: &str) -> Option<(i64, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let n = s[..end].parse().ok()?;
    Some((n, &s[end..]))
}

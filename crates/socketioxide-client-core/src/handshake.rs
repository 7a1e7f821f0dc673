//! Handshake response parsing.
//!
//! * 0.9.x answers with `sid:heartbeat:closing:transports`, timeouts are in seconds
//!   and an empty field disables the timeout.
//! * 1.0.x answers with an engine.io open packet, possibly wrapped in a payload
//!   (`97:0{"sid":...}`). The json object is extracted between the first `{` and the last `}`.
use std::time::Duration;

use serde::Deserialize;

use crate::{ProtocolVersion, errors::HandshakeError};

/// The session negotiated with the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeData {
    /// The session id
    pub sid: String,
    /// The protocol version detected from the response
    pub version: ProtocolVersion,
    /// The heartbeat timeout (0.9.x) or ping interval (1.0.x), `None` when disabled
    pub heartbeat_timeout: Option<Duration>,
    /// The closing timeout (0.9.x) or ping timeout (1.0.x), `None` when disabled
    pub closing_timeout: Option<Duration>,
    /// The transports advertised by the server
    pub transports: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPacket {
    sid: String,
    #[serde(default)]
    upgrades: Vec<String>,
    ping_interval: u64,
    ping_timeout: u64,
}

/// The 1.0.x transport every server supports.
const POLLING: &str = "polling";

impl HandshakeData {
    /// Parse a handshake response body, detecting its protocol version from its structure.
    pub fn parse(body: &str) -> Result<Self, HandshakeError> {
        let body = body.trim();
        match (body.find('{'), body.rfind('}')) {
            (Some(start), Some(end)) if start < end => Self::parse_v2(&body[start..=end]),
            _ if body.contains(':') => Self::parse_v1(body),
            _ => Err(HandshakeError::Malformed(body.to_string())),
        }
    }

    /// Parse a response body and check it matches the expected protocol version.
    pub fn parse_expecting(body: &str, expected: ProtocolVersion) -> Result<Self, HandshakeError> {
        let data = Self::parse(body)?;
        if data.version != expected {
            return Err(HandshakeError::VersionMismatch {
                expected,
                found: data.version,
            });
        }
        Ok(data)
    }

    fn parse_v1(body: &str) -> Result<Self, HandshakeError> {
        let mut fields = body.splitn(4, ':');
        let (Some(sid), Some(hb), Some(ct), Some(transports)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(HandshakeError::Malformed(body.to_string()));
        };
        if sid.is_empty() {
            return Err(HandshakeError::Malformed(body.to_string()));
        }
        Ok(Self {
            sid: sid.to_string(),
            version: ProtocolVersion::V1,
            heartbeat_timeout: parse_seconds(hb)?,
            closing_timeout: parse_seconds(ct)?,
            transports: transports
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    fn parse_v2(json: &str) -> Result<Self, HandshakeError> {
        let packet: OpenPacket = serde_json::from_str(json)?;
        let mut transports = packet.upgrades;
        if !transports.iter().any(|t| t == POLLING) {
            transports.push(POLLING.to_string());
        }
        Ok(Self {
            sid: packet.sid,
            version: ProtocolVersion::V2,
            heartbeat_timeout: millis(packet.ping_interval),
            closing_timeout: millis(packet.ping_timeout),
            transports,
        })
    }

    /// The longest silence tolerated before the session is considered dead:
    /// the closing timeout plus the heartbeat timeout.
    ///
    /// Returns `None` when the server disabled the closing timeout.
    pub fn heartbeat_window(&self) -> Option<Duration> {
        self.closing_timeout
            .map(|ct| ct + self.heartbeat_timeout.unwrap_or_default())
    }

    /// Whether the server advertised the given transport.
    pub fn supports(&self, transport: &str) -> bool {
        self.transports.iter().any(|t| t == transport)
    }
}

fn parse_seconds(field: &str) -> Result<Option<Duration>, HandshakeError> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    let secs: u64 = field
        .parse()
        .map_err(|_| HandshakeError::InvalidTimeout(field.to_string()))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

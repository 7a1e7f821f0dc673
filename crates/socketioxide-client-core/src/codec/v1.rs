//! The socket.io 0.9.x frame format: `type:id:endpoint:data`.
//!
//! * `type` is a single digit control code.
//! * `id` is an optional correlation id, a trailing `+` asks for an acknowledgement with data.
//! * `endpoint` is the namespace, empty for the default one.
//! * `data` is everything after the third colon and may contain colons itself.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ProtocolVersion, split_number};
use crate::{
    Str,
    errors::{DecodeError, EncodeError},
    frame::{CorrelationId, Frame, FrameData, normalize_ns},
};

#[derive(Serialize)]
struct EventOut<'a> {
    name: &'a str,
    args: &'a [Value],
}

#[derive(Deserialize)]
struct EventIn {
    name: String,
    #[serde(default)]
    args: Vec<Value>,
}

/// Encode a frame to the 0.9.x format.
pub fn encode(frame: &Frame) -> Result<Str, EncodeError> {
    let code = match &frame.data {
        FrameData::Disconnect => '0',
        FrameData::Connect => '1',
        FrameData::Heartbeat => '2',
        FrameData::Message(_) => '3',
        FrameData::JsonMessage(_) => '4',
        FrameData::Event { .. } => '5',
        FrameData::Ack { .. } => '6',
        FrameData::Error(_) => '7',
        FrameData::Noop => '8',
        data @ (FrameData::Pong
        | FrameData::Probe(_)
        | FrameData::Open(_)
        | FrameData::Close
        | FrameData::Upgrade) => {
            return Err(EncodeError::Unsupported {
                frame: data.name(),
                version: ProtocolVersion::V1,
            });
        }
    };

    let mut out = String::with_capacity(frame.ns.len() + 8);
    out.push(code);
    out.push(':');
    if let Some(id) = frame.id.filter(|_| frame.data.accepts_id()) {
        out.push_str(itoa::Buffer::new().format(id.id));
        if id.wants_data {
            out.push('+');
        }
    }
    out.push(':');
    if !frame.is_default_ns() {
        out.push_str(&frame.ns);
    }

    match &frame.data {
        FrameData::Message(text) | FrameData::Error(text) => {
            out.push(':');
            out.push_str(text);
        }
        FrameData::JsonMessage(value) => {
            out.push(':');
            out.push_str(&serde_json::to_string(value)?);
        }
        FrameData::Event { name, args } => {
            out.push(':');
            out.push_str(&serde_json::to_string(&EventOut { name, args })?);
        }
        FrameData::Ack { id, args } => {
            out.push(':');
            out.push_str(itoa::Buffer::new().format(*id));
            if !args.is_empty() {
                out.push('+');
                out.push_str(&serde_json::to_string(args)?);
            }
        }
        _ => (),
    }

    Ok(Str::from(out))
}

/// Decode a 0.9.x frame.
pub fn decode(raw: &Str) -> Result<Frame, DecodeError> {
    let s = raw.as_str();
    let mut colons = s.match_indices(':').map(|(i, _)| i);
    let c0 = colons.next().unwrap_or(s.len());
    let c1 = colons.next().unwrap_or(s.len());
    let c2 = colons.next().unwrap_or(s.len());
    let field = |from: usize, to: usize| s.get(from..to).unwrap_or("");

    let code = &s[..c0];
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::Garbage(s.to_string()));
    }
    let code: u32 = code
        .parse()
        .map_err(|_| DecodeError::Garbage(s.to_string()))?;

    let id = parse_id(field(c0 + 1, c1))?;
    let ns = normalize_ns(field(c1 + 1, c2));
    let data = if c2 < s.len() {
        raw.slice(c2 + 1..)
    } else {
        Str::default()
    };

    let data = match code {
        0 => FrameData::Disconnect,
        1 => FrameData::Connect,
        2 => FrameData::Heartbeat,
        3 => FrameData::Message(data),
        4 => FrameData::JsonMessage(serde_json::from_str(&data)?),
        5 => {
            let EventIn { name, args } = serde_json::from_str(&data)?;
            FrameData::Event { name, args }
        }
        6 => parse_ack(&data)?,
        7 => FrameData::Error(data),
        8 => FrameData::Noop,
        code => return Err(DecodeError::UnknownControlCode(code)),
    };

    Ok(Frame { data, ns, id })
}

fn parse_id(field: &str) -> Result<Option<CorrelationId>, DecodeError> {
    if field.is_empty() {
        return Ok(None);
    }
    let (digits, wants_data) = match field.strip_suffix('+') {
        Some(digits) => (digits, true),
        None => (field, false),
    };
    let id = digits
        .parse()
        .map_err(|_| DecodeError::InvalidId(field.to_string()))?;
    Ok(Some(CorrelationId { id, wants_data }))
}

/// `6:::4` acknowledges id 4 without data, `6:::4+[...]` with data.
fn parse_ack(data: &str) -> Result<FrameData, DecodeError> {
    match split_number(data) {
        Some((id, "")) => Ok(FrameData::Ack { id, args: vec![] }),
        Some((id, rest)) => match rest.strip_prefix('+') {
            Some(args) => Ok(FrameData::Ack {
                id,
                args: serde_json::from_str(args)?,
            }),
            None => Err(DecodeError::InvalidId(data.to_string())),
        },
        None => Err(DecodeError::InvalidId(data.to_string())),
    }
}

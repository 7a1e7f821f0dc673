//! The socket.io 1.0.x frame format.
//!
//! Every frame starts with an engine.io packet code. Message packets (`4`) wrap a
//! socket.io packet: `<code>[/namespace,][id][json data]`.
//!
//! The plain and structured messages of the 0.9.x protocol do not exist anymore,
//! they are mapped to an event named `message` with a single argument.
use serde::{Serialize, ser::SerializeSeq};
use serde_json::Value;

use super::{ProtocolVersion, split_number};
use crate::{
    Str,
    errors::{DecodeError, EncodeError},
    frame::{CorrelationId, Frame, FrameData, Probe, normalize_ns},
};

/// The event name used to carry 0.9.x style messages.
pub const MESSAGE_EVENT: &str = "message";
const PROBE: &str = "probe";

/// Serialize an event as `[name, ...args]` without cloning the arguments.
struct EventOut<'a, T> {
    name: &'a str,
    args: &'a [T],
}
impl<T: Serialize> Serialize for EventOut<'_, T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.args.len() + 1))?;
        seq.serialize_element(self.name)?;
        for arg in self.args {
            seq.serialize_element(arg)?;
        }
        seq.end()
    }
}

/// Encode a frame to the 1.0.x format.
pub fn encode(frame: &Frame) -> Result<Str, EncodeError> {
    let engine = match &frame.data {
        FrameData::Open(data) => return Ok(Str::from(format!("0{data}"))),
        FrameData::Close => "1",
        FrameData::Heartbeat => "2",
        FrameData::Pong => "3",
        FrameData::Probe(Probe::Ping) => "2probe",
        FrameData::Probe(Probe::Pong) => "3probe",
        FrameData::Upgrade => "5",
        FrameData::Noop => "6",
        _ => "",
    };
    if !engine.is_empty() {
        return Ok(Str::from(engine));
    }

    let (code, id, payload) = match &frame.data {
        FrameData::Connect => ('0', None, None),
        FrameData::Disconnect => ('1', None, None),
        FrameData::Message(text) => {
            let args = [text.as_str()];
            let event = EventOut {
                name: MESSAGE_EVENT,
                args: &args,
            };
            ('2', frame.id, Some(serde_json::to_string(&event)?))
        }
        FrameData::JsonMessage(value) => {
            let event = EventOut {
                name: MESSAGE_EVENT,
                args: std::slice::from_ref(value),
            };
            ('2', frame.id, Some(serde_json::to_string(&event)?))
        }
        FrameData::Event { name, args } => {
            let event = EventOut { name, args };
            ('2', frame.id, Some(serde_json::to_string(&event)?))
        }
        FrameData::Ack { id, args } => (
            '3',
            Some(CorrelationId::requested(*id)),
            Some(serde_json::to_string(args)?),
        ),
        FrameData::Error(reason) => ('4', None, Some(reason.to_string())),
        data => {
            return Err(EncodeError::Unsupported {
                frame: data.name(),
                version: ProtocolVersion::V2,
            });
        }
    };

    let mut out = String::with_capacity(
        2 + frame.ns.len() + payload.as_ref().map(String::len).unwrap_or(0) + 8,
    );
    out.push('4');
    out.push(code);
    if !frame.is_default_ns() {
        out.push_str(&frame.ns);
        if id.is_some() || payload.is_some() {
            out.push(',');
        }
    }
    if let Some(id) = id {
        out.push_str(itoa::Buffer::new().format(id.id));
    }
    if let Some(payload) = payload {
        out.push_str(&payload);
    }
    Ok(Str::from(out))
}

/// Decode a 1.0.x frame.
pub fn decode(raw: &Str) -> Result<Frame, DecodeError> {
    let code = match raw.as_bytes().first() {
        Some(b) if b.is_ascii_digit() => b - b'0',
        _ => return Err(DecodeError::Garbage(raw.to_string())),
    };
    let rest = &raw[1..];
    let data = match code {
        0 => FrameData::Open(raw.slice(1..)),
        1 => FrameData::Close,
        2 if rest == PROBE => FrameData::Probe(Probe::Ping),
        2 => FrameData::Heartbeat,
        3 if rest == PROBE => FrameData::Probe(Probe::Pong),
        3 => FrameData::Pong,
        4 => return decode_packet(raw),
        5 => FrameData::Upgrade,
        6 => FrameData::Noop,
        code => return Err(DecodeError::UnknownControlCode(code.into())),
    };
    Ok(Frame::root(data))
}

/// Decode the socket.io packet wrapped in an engine.io message packet.
fn decode_packet(raw: &Str) -> Result<Frame, DecodeError> {
    let code = match raw.as_bytes().get(1) {
        Some(b) if b.is_ascii_digit() => b - b'0',
        _ => return Err(DecodeError::Garbage(raw.to_string())),
    };

    let mut i = 2;
    let ns = if raw[i..].starts_with('/') {
        let end = raw[i..].find(',').map(|p| i + p).unwrap_or(raw.len());
        let ns = normalize_ns(&raw[i..end]);
        i = (end + 1).min(raw.len());
        ns
    } else {
        normalize_ns("")
    };

    let id = match split_number(&raw[i..]) {
        Some((id, rest)) => {
            i = raw.len() - rest.len();
            Some(id)
        }
        None => None,
    };
    let payload = raw.slice(i..);

    let (data, id) = match code {
        0 => (FrameData::Connect, None),
        1 => (FrameData::Disconnect, None),
        2 => (decode_event(&payload)?, id.map(CorrelationId::requested)),
        3 => {
            let id = id.ok_or_else(|| DecodeError::InvalidId(raw.to_string()))?;
            let args = if payload.is_empty() {
                vec![]
            } else {
                serde_json::from_str(&payload)?
            };
            (FrameData::Ack { id, args }, None)
        }
        4 => (FrameData::Error(payload), None),
        5 | 6 => return Err(DecodeError::Unsupported("binary attachments")),
        code => return Err(DecodeError::UnknownControlCode(code.into())),
    };

    Ok(Frame { data, ns, id })
}

fn decode_event(payload: &str) -> Result<FrameData, DecodeError> {
    let mut args = serde_json::from_str::<Vec<Value>>(payload)?.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => {
            return Err(DecodeError::InvalidPayload(
                "event payload must start with the event name",
            ));
        }
    };
    let mut args: Vec<Value> = args.collect();
    if name == MESSAGE_EVENT && args.len() == 1 {
        if let Some(value) = args.pop() {
            return Ok(match value {
                Value::String(text) => FrameData::Message(Str::from(text)),
                value => FrameData::JsonMessage(value),
            });
        }
    }
    Ok(FrameData::Event { name, args })
}

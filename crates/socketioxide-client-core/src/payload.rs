//! Multi-frame transport payloads.
//!
//! Polling transports batch several frames in a single http body:
//! * 0.9.x: `\u{fffd}<len>\u{fffd}<frame>` repeated. A body that does not start with the
//!   delimiter is a single frame.
//! * 1.0.x: `<len>:<frame>` repeated.
//!
//! Lengths count utf-16 code units, the way the javascript server computes them.
use crate::{ProtocolVersion, Str, errors::PayloadError};

/// The 0.9.x frame delimiter.
pub const FRAME_DELIMITER: char = '\u{fffd}';
const V2_SEPARATOR: char = ':';

/// Split a transport payload into its frames.
///
/// A length prefix that does not match the data is an error, the whole payload
/// should then be discarded.
pub fn decode_payload(version: ProtocolVersion, data: &Str) -> Result<Vec<Str>, PayloadError> {
    match version {
        ProtocolVersion::V1 if !data.starts_with(FRAME_DELIMITER) => Ok(vec![data.clone()]),
        ProtocolVersion::V1 => split_frames(data, FRAME_DELIMITER, Some(FRAME_DELIMITER)),
        ProtocolVersion::V2 => split_frames(data, V2_SEPARATOR, None),
    }
}

/// Join frames into a single transport payload.
///
/// With 0.9.x a single frame is sent as is.
pub fn encode_payload(version: ProtocolVersion, frames: &[Str]) -> Str {
    match (version, frames) {
        (ProtocolVersion::V1, [frame]) => frame.clone(),
        (ProtocolVersion::V1, frames) => {
            let mut out = String::new();
            for frame in frames {
                out.push(FRAME_DELIMITER);
                out.push_str(itoa::Buffer::new().format(utf16_len(frame)));
                out.push(FRAME_DELIMITER);
                out.push_str(frame);
            }
            Str::from(out)
        }
        (ProtocolVersion::V2, frames) => {
            let mut out = String::new();
            for frame in frames {
                out.push_str(itoa::Buffer::new().format(utf16_len(frame)));
                out.push(V2_SEPARATOR);
                out.push_str(frame);
            }
            Str::from(out)
        }
    }
}

/// Length of a string in utf-16 code units.
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Parse `[prefix]<len><separator><frame>` records until the end of `data`.
fn split_frames(
    data: &Str,
    separator: char,
    prefix: Option<char>,
) -> Result<Vec<Str>, PayloadError> {
    let mut frames = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let start = i;
        if let Some(prefix) = prefix {
            if !data[i..].starts_with(prefix) {
                return Err(PayloadError::InvalidLength(start));
            }
            i += prefix.len_utf8();
        }
        let len_end = data[i..]
            .find(separator)
            .map(|p| i + p)
            .ok_or(PayloadError::InvalidLength(start))?;
        let expected: usize = data[i..len_end]
            .parse()
            .map_err(|_| PayloadError::InvalidLength(start))?;
        i = len_end + separator.len_utf8();

        let end = advance_utf16(&data[i..], expected)
            .map(|n| i + n)
            .ok_or(PayloadError::LengthMismatch {
                offset: start,
                expected,
            })?;
        frames.push(data.slice(i..end));
        i = end;
    }
    Ok(frames)
}

/// Byte length of the first `units` utf-16 code units of `s`.
///
/// Returns `None` when `s` is too short or the boundary splits a surrogate pair.
fn advance_utf16(s: &str, units: usize) -> Option<usize> {
    let mut count = 0;
    for (idx, c) in s.char_indices() {
        if count == units {
            return Some(idx);
        }
        count += c.len_utf16();
        if count > units {
            return None;
        }
    }
    (count == units).then_some(s.len())
}

//! Event stream codec.
//!
//! A stream is a sequence of `version-token || json-body` pairs with no
//! delimiter. The parser is a single string-aware brace scanner: anything
//! outside a top-level object (version tokens, whitespace, signature
//! attachments, the brackets and commas of a JSON array) is framing and is
//! skipped. A trailing object that never closes is reported, not fatal.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

use crate::canonical::{canonical_json, version_of};
use crate::error::CoreError;
use crate::event::KeyEvent;
use crate::tel_event::TelEvent;

/// A balanced object that is not valid JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedBody {
    /// Byte offset of the opening brace.
    pub offset: usize,
    pub reason: String,
}

/// Result of parsing a stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedStream {
    /// Complete bodies, in stream order.
    pub bodies: Vec<Value>,
    /// The stream ended inside an unbalanced object.
    pub trailing_incomplete: bool,
    /// Scanning stopped at a balanced but unparseable object.
    pub malformed: Option<MalformedBody>,
}

impl ParsedStream {
    /// True if every byte of the input was accounted for.
    pub fn is_complete(&self) -> bool {
        !self.trailing_incomplete && self.malformed.is_none()
    }
}

/// Parse a stream (or a JSON array of bodies) into bodies.
pub fn parse_stream(input: &[u8]) -> ParsedStream {
    let mut parsed = ParsedStream::default();
    let mut pos = 0;

    while pos < input.len() {
        let Some(rel) = input[pos..].iter().position(|b| *b == b'{') else {
            break;
        };
        let start = pos + rel;

        match scan_object(&input[start..]) {
            Some(len) => {
                let slice = &input[start..start + len];
                match serde_json::from_slice::<Value>(slice) {
                    Ok(value) => parsed.bodies.push(value),
                    Err(e) => {
                        parsed.malformed = Some(MalformedBody {
                            offset: start,
                            reason: e.to_string(),
                        });
                        return parsed;
                    }
                }
                pos = start + len;
            }
            None => {
                parsed.trailing_incomplete = true;
                break;
            }
        }
    }

    parsed
}

/// Length of the balanced object at the start of `input`, if it closes.
fn scan_object(input: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in input.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Serialize bodies as `version-token || canonical body` each.
pub fn serialize_stream(bodies: &[Value]) -> Result<Bytes, CoreError> {
    let mut buf = BytesMut::new();
    for body in bodies {
        let version = version_of(body)?;
        buf.put_slice(version.to_string().as_bytes());
        buf.put_slice(&canonical_json(body)?);
    }
    Ok(buf.freeze())
}

/// Serialize bodies as a compact JSON array of canonical bodies.
pub fn to_json_array(bodies: &[Value]) -> Result<Vec<u8>, CoreError> {
    let mut buf = vec![b'['];
    for (i, body) in bodies.iter().enumerate() {
        if i > 0 {
            buf.push(b',');
        }
        buf.extend_from_slice(&canonical_json(body)?);
    }
    buf.push(b']');
    Ok(buf)
}

/// An event of either log kind, as found in a mixed stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    Key(KeyEvent),
    Transaction(TelEvent),
}

impl LogEvent {
    /// Decode a body, dispatching on `t`.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value.get("t").and_then(Value::as_str) {
            Some("icp" | "rot" | "ixn") => KeyEvent::from_value(value).map(LogEvent::Key),
            Some("vcp" | "iss" | "rev") => TelEvent::from_value(value).map(LogEvent::Transaction),
            Some(other) => Err(CoreError::invalid("t", format!("unknown event type {other}"))),
            None => Err(CoreError::MissingField("t".into())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            LogEvent::Key(e) => e.to_value(),
            LogEvent::Transaction(e) => e.to_value(),
        }
    }
}

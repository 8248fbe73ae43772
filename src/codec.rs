//! Frame Codec — encode/decode for the two wire dialects sharing the
//! transport: NUL-terminated XML session messages, and `%xt%…%` extension
//! frames.
//!
//! Parsing is hand-rolled rather than built on a general XML/parsing crate:
//! both grammars are small and fixed, and a full parser buys nothing a
//! handful of string splits don't already give us.

use serde_json::Value;

use crate::error::{ClientError, Result};

/// Which of the two wire dialects a [`Packet`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Xml,
    Extension,
}

/// A decoded wire unit. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub dialect: Dialect,
    /// `action` for XML frames, `<command>` for extension frames — the
    /// single naming space waiters and subscriptions key on.
    pub command: String,
    /// Extension frames only.
    pub zone: Option<String>,
    pub seq: Option<String>,
    /// XML frames only — the `r` attribute on `<body>`.
    pub r: Option<String>,
    /// 0 = ok. Always 0 for XML frames unless the body states otherwise.
    pub error_code: i64,
    /// Parsed JSON body (extension, object/array shape), a positional
    /// array of strings (extension, non-JSON shape), or the raw inner
    /// `<body>` text as a string (XML).
    pub payload: Value,
}

impl Packet {
    /// Look up a field in a JSON-object payload. Returns `None` for
    /// non-object payloads or a missing key.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one complete wire frame (a single WebSocket text message) into a
/// [`Packet`]. Malformed frames return `Err` — the caller (Connection) is
/// responsible for counting and discarding rather than aborting the reader
/// loop.
pub fn decode(frame: &str) -> Result<Packet> {
    let trimmed = frame.trim_end_matches('\u{0}');
    let trimmed = trimmed.trim();
    if trimmed.starts_with("%xt%") {
        decode_extension(trimmed)
    } else if trimmed.starts_with("<msg") {
        decode_xml(trimmed)
    } else {
        Err(ClientError::DecodeError(format!(
            "unrecognized frame shape: {:.40}",
            trimmed
        )))
    }
}

fn decode_xml(frame: &str) -> Result<Packet> {
    let body_start = frame
        .find("<body")
        .ok_or_else(|| ClientError::DecodeError("xml frame missing <body>".into()))?;
    let tag_end = frame[body_start..]
        .find('>')
        .ok_or_else(|| ClientError::DecodeError("xml <body> tag unterminated".into()))?
        + body_start;
    let open_tag = &frame[body_start..=tag_end];

    let action = extract_attr(open_tag, "action")
        .ok_or_else(|| ClientError::DecodeError("xml <body> missing action attr".into()))?;
    let r = extract_attr(open_tag, "r");

    // Self-closing `<body .../>` has no separate closing tag.
    let inner = if open_tag.ends_with("/>") {
        String::new()
    } else {
        let close_pos = frame.rfind("</body>").unwrap_or(frame.len());
        frame
            .get(tag_end + 1..close_pos)
            .unwrap_or("")
            .trim()
            .to_string()
    };

    Ok(Packet {
        dialect: Dialect::Xml,
        command: action,
        zone: None,
        seq: None,
        r,
        error_code: 0,
        payload: Value::String(inner),
    })
}

fn decode_extension(frame: &str) -> Result<Packet> {
    let rest = frame
        .strip_prefix("%xt%")
        .ok_or_else(|| ClientError::DecodeError("extension frame missing %xt% prefix".into()))?;

    // Split only the first three delimiters so an embedded '%' inside a
    // JSON body never gets mistaken for a frame boundary.
    let mut parts = rest.splitn(4, '%');
    let zone = parts
        .next()
        .ok_or_else(|| ClientError::DecodeError("extension frame missing zone".into()))?;
    let command = parts
        .next()
        .ok_or_else(|| ClientError::DecodeError("extension frame missing command".into()))?;
    let seq = parts
        .next()
        .ok_or_else(|| ClientError::DecodeError("extension frame missing seq".into()))?;
    let remainder = parts.next().unwrap_or("");
    let body_str = remainder.strip_suffix('%').unwrap_or(remainder);

    let first_non_ws = body_str.trim_start().chars().next();
    let (payload, error_code) = if matches!(first_non_ws, Some('{') | Some('[')) {
        let value: Value = serde_json::from_str(body_str)
            .map_err(|e| ClientError::DecodeError(format!("invalid json body: {e}")))?;
        let code = value.get("error_code").and_then(|v| v.as_i64()).unwrap_or(0);
        (value, code)
    } else {
        let tokens: Vec<Value> = body_str
            .split('%')
            .map(|t| Value::String(t.to_string()))
            .collect();
        let code = body_str
            .split('%')
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .unwrap_or(0);
        (Value::Array(tokens), code)
    };

    Ok(Packet {
        dialect: Dialect::Extension,
        command: command.to_string(),
        zone: Some(zone.to_string()),
        seq: Some(seq.to_string()),
        r: None,
        error_code,
        payload,
    })
}

fn extract_attr(tag: &str, name: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        let needle = format!("{name}={quote}");
        if let Some(start) = tag.find(&needle) {
            let value_start = start + needle.len();
            if let Some(end) = tag[value_start..].find(quote) {
                return Some(tag[value_start..value_start + end].to_string());
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a [`Packet`] back into its wire form. The inverse of [`decode`],
/// modulo incidental whitespace inside XML bodies.
pub fn encode(packet: &Packet) -> String {
    match packet.dialect {
        Dialect::Xml => {
            let inner = packet.payload.as_str().unwrap_or("");
            let r = packet.r.as_deref().unwrap_or("0");
            if inner.is_empty() {
                format!(
                    "<msg t='sys'><body action='{}' r='{}'></body></msg>",
                    packet.command, r
                )
            } else {
                format!(
                    "<msg t='sys'><body action='{}' r='{}'>{}</body></msg>",
                    packet.command, r, inner
                )
            }
        }
        Dialect::Extension => encode_extension(
            packet.zone.as_deref().unwrap_or(""),
            &packet.command,
            packet.seq.as_deref().unwrap_or("1"),
            &packet.payload,
        ),
    }
}

/// Build an extension-dialect frame directly from a zone/command/seq and a
/// JSON body. Used by the Request API to construct outbound requests
/// without round-tripping through a decoded [`Packet`].
pub fn encode_extension(zone: &str, command: &str, seq: &str, body: &Value) -> String {
    let body_str = match body {
        Value::Object(_) => body.to_string(),
        Value::Array(items) => {
            let mut s = String::new();
            for item in items {
                match item {
                    Value::String(v) => s.push_str(v),
                    other => s.push_str(&other.to_string()),
                }
                s.push('%');
            }
            s
        }
        Value::Null => String::new(),
        other => other.to_string(),
    };
    format!("%xt%{zone}%{command}%{seq}%{body_str}%")
}

/// Escape a free-text field per the chat encoding rule. Must NEVER be
/// applied to structural characters, command/zone tokens, or JSON keys —
/// only to user-authored text fields such as chat messages.
pub fn escape_chat_text(text: &str) -> String {
    text.replace('%', "&percnt;")
        .replace('"', "&quot;")
        .replace('\'', "&145;")
        .replace('\n', "<br />")
        .replace('\\', "%5C")
}

/// Inverse of [`escape_chat_text`].
pub fn unescape_chat_text(text: &str) -> String {
    text.replace("%5C", "\\")
        .replace("<br />", "\n")
        .replace("&145;", "'")
        .replace("&quot;", "\"")
        .replace("&percnt;", "%")
}

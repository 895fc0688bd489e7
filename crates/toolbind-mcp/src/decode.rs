//! Result decoding — turns a `tools/call` response into a usable value.
//!
//! The decode order is an ordered chain of pure attempts and must be
//! preserved exactly: a structured payload first, then a single text block
//! parsed as JSON, then the raw text, and finally the whole response
//! envelope. Callers rely on getting a usable value even when a tool
//! violates its own schema.

use crate::protocol::CallToolResult;
use serde_json::Value;

type DecodeAttempt = fn(&CallToolResult) -> Option<Value>;

const DECODE_CHAIN: &[DecodeAttempt] = &[structured_payload, parsed_text, raw_text];

/// Decodes a tool result through the attempt chain, falling back to the
/// unmodified envelope when no attempt matches.
pub fn decode_result(result: &CallToolResult) -> Value {
    for attempt in DECODE_CHAIN {
        if let Some(value) = attempt(result) {
            return value;
        }
    }
    envelope(result)
}

/// Tier 1a: the host returned a native structured payload.
fn structured_payload(result: &CallToolResult) -> Option<Value> {
    result.structured_content.clone()
}

/// Tier 1b: a single text block whose content parses as JSON.
fn parsed_text(result: &CallToolResult) -> Option<Value> {
    let text = single_text(result)?;
    serde_json::from_str(text).ok()
}

/// Tier 2: a single text block that does not parse — returned literally.
fn raw_text(result: &CallToolResult) -> Option<Value> {
    single_text(result).map(|t| Value::String(t.to_string()))
}

/// Tier 3: the response envelope, unmodified.
fn envelope(result: &CallToolResult) -> Value {
    serde_json::to_value(result).unwrap_or(Value::Null)
}

fn single_text(result: &CallToolResult) -> Option<&str> {
    match result.content.as_slice() {
        [only] => only.as_text(),
        _ => None,
    }
}

//! C2S envelope shapes (§3 "C2S Envelope", §6 "TCP wire protocol (client)")
//! and the response-side ANSI stripping pass (§9 "ANSI stripping").

use chrono::Utc;
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// An inbound client request: `{ id, type, data, meta? }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub meta: Value,
}

impl Request {
    /// `meta.idempotency_key`, if present and a string (§4.6 step 5).
    pub fn idempotency_key(&self) -> Option<&str> {
        self.meta.get("idempotency_key").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
    Refused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

/// `{ id, reply_to, ts, status, type, data, error, meta }` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub reply_to: String,
    pub ts: String,
    pub status: Status,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub meta: Value,
}

/// Hands out the server-assigned `srv-<n>` response ids (§6).
#[derive(Default)]
pub struct ResponseIds {
    next: AtomicU64,
}

impl ResponseIds {
    pub fn new() -> ResponseIds {
        ResponseIds { next: AtomicU64::new(1) }
    }

    pub fn next_id(&self) -> String {
        format!("srv-{}", self.next.fetch_add(1, Ordering::Relaxed))
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

pub fn ok(ids: &ResponseIds, req: &Request, data: Value) -> Response {
    let mut response = Response {
        id: ids.next_id(),
        reply_to: req.id.clone(),
        ts: now_iso8601(),
        status: Status::Ok,
        kind: req.kind.clone(),
        data: Some(data),
        error: None,
        meta: default_meta(),
    };
    strip_ansi_value(response.data.as_mut().unwrap());
    response
}

pub fn error(ids: &ResponseIds, req: &Request, code: i64, message: impl Into<String>, details: Value) -> Response {
    let mut response = Response {
        id: ids.next_id(),
        reply_to: req.id.clone(),
        ts: now_iso8601(),
        status: Status::Error,
        kind: req.kind.clone(),
        data: None,
        error: Some(ErrorBody { code, message: message.into(), details }),
        meta: default_meta(),
    };
    if let Some(err) = response.error.as_mut() {
        strip_ansi_value(&mut err.details);
    }
    response
}

pub fn refused(ids: &ResponseIds, req: &Request, code: i64, reason: impl Into<String>) -> Response {
    error(ids, req, code, reason, Value::Null)
}

fn default_meta() -> Value {
    serde_json::json!({ "rate_limit": { "limit": 60, "remaining": 60, "reset": 60 } })
}

/// Strips ANSI escape sequences (`ESC [ ... letter`) from every string leaf
/// of a JSON value, in place. Applied to every outgoing response except the
/// schema-describe command's payload (§9 "ANSI stripping").
pub fn strip_ansi_value(value: &mut Value) {
    match value {
        Value::String(s) => {
            if let Some(stripped) = strip_ansi_str(s) {
                *s = stripped;
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_ansi_value(item);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                strip_ansi_value(v);
            }
        }
        _ => {}
    }
}

fn strip_ansi_str(input: &str) -> Option<String> {
    if !input.contains('\u{1b}') {
        return None;
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            out.push(c);
            continue;
        }
        if chars.peek() != Some(&'[') {
            continue;
        }
        chars.next();
        while let Some(&next) = chars.peek() {
            chars.next();
            if next.is_ascii_alphabetic() {
                break;
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_ansi_color_codes() {
        let mut value = json!({"message": "\u{1b}[31mred\u{1b}[0m text"});
        strip_ansi_value(&mut value);
        assert_eq!(value["message"], "red text");
    }

    #[test]
    fn leaves_plain_strings_untouched() {
        let mut value = json!({"message": "no escapes here"});
        strip_ansi_value(&mut value);
        assert_eq!(value["message"], "no escapes here");
    }

    #[test]
    fn response_ids_increase_monotonically() {
        let ids = ResponseIds::new();
        assert_eq!(ids.next_id(), "srv-1");
        assert_eq!(ids.next_id(), "srv-2");
    }
}

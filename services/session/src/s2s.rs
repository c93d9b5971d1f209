//! The Session Server's S2S listener (§4.2, §4.5). Accepts Engine (and any
//! other authenticated peer) connections on the inter-process port and
//! dispatches `s2s.health`, `s2s.broadcast.sweep`, and `s2s.command.push`
//! envelopes.

use crate::core::AppContext;
use crate::response::strip_ansi_value;
use serde_json::{json, Value};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use transport::schema::s2s as s2s_schema;
use transport::server::{accept_with_deadline, S2SConnection};
use transport::Envelope;

use crate::codes::UNKNOWN_COMMAND;

/// Accepts connections until `running` is cleared, spawning one thread per
/// connection (§5 "one task per active ... connection").
pub fn serve(ctx: Arc<AppContext>, listener: TcpListener, max_frame_bytes: u32, running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        match accept_with_deadline(&listener, Duration::from_millis(500)) {
            Ok(Some(stream)) => {
                let ctx = ctx.clone();
                std::thread::spawn(move || handle_connection(ctx, stream, max_frame_bytes));
            }
            Ok(None) => continue,
            Err(e) => {
                slog::warn!(ctx.log, "s2s accept failed"; "error" => %e);
            }
        }
    }
}

fn handle_connection(ctx: Arc<AppContext>, stream: TcpStream, max_frame_bytes: u32) {
    let mut conn = S2SConnection::new(stream).with_max_frame_bytes(max_frame_bytes);
    loop {
        let envelope = match conn.recv_authenticated(&ctx.keys, &ctx.peers) {
            Ok(envelope) => envelope,
            Err(e) => {
                slog::debug!(ctx.log, "s2s connection closed"; "error" => %e);
                return;
            }
        };

        let mut reply = dispatch(&ctx, &envelope);
        if let Err(e) = conn.send(&mut reply, &ctx.keys) {
            slog::warn!(ctx.log, "s2s reply failed"; "error" => %e);
            return;
        }
    }
}

fn dispatch(ctx: &AppContext, envelope: &Envelope) -> Envelope {
    match envelope.kind.as_str() {
        "s2s.health" => match s2s_schema::validate_health(&envelope.payload) {
            Ok(()) => envelope.ack("session", json!({ "status": "ok" })),
            Err(reason) => envelope.error_reply("session", UNKNOWN_COMMAND, reason, Value::Null),
        },
        "s2s.broadcast.sweep" => handle_broadcast_sweep(ctx, envelope),
        "s2s.command.push" => handle_command_push(ctx, envelope),
        other => {
            slog::warn!(ctx.log, "unknown s2s command"; "type" => other, "src" => %envelope.src);
            envelope.error_reply("session", UNKNOWN_COMMAND, format!("unknown s2s command: {}", other), Value::Null)
        }
    }
}

fn handle_broadcast_sweep(ctx: &AppContext, envelope: &Envelope) -> Envelope {
    if let Err(reason) = s2s_schema::validate_broadcast_sweep(&envelope.payload) {
        return envelope.error_reply("session", UNKNOWN_COMMAND, reason, Value::Null);
    }

    let mut data = envelope.payload["data"].clone();
    strip_ansi_value(&mut data);
    let event_type = envelope.payload["event_type"].as_str().unwrap_or("broadcast");

    let line = json!({ "type": event_type, "data": data }).to_string();
    ctx.broadcast(&line);

    envelope.ack("session", json!({ "broadcast": true }))
}

fn handle_command_push(ctx: &AppContext, envelope: &Envelope) -> Envelope {
    if let Err(reason) = s2s_schema::validate_command_push(&envelope.payload) {
        return envelope.error_reply("session", UNKNOWN_COMMAND, reason, Value::Null);
    }

    let idem_key = envelope.payload.get("idem_key").and_then(Value::as_str);
    if let Some(key) = idem_key {
        if ctx.cached_response(key).is_some() {
            slog::debug!(ctx.log, "duplicate s2s command push dropped"; "idem_key" => key);
            return envelope.ack("session", json!({ "duplicate": true }));
        }
    }

    let cmd_type = envelope.payload["cmd_type"].as_str().unwrap_or("");
    let mut data = envelope.payload["data"].clone();

    match cmd_type {
        "notice.publish" => {
            strip_ansi_value(&mut data);
            let line = json!({ "type": "system.notice", "data": data }).to_string();
            ctx.broadcast(&line);
        }
        other => {
            slog::warn!(ctx.log, "unhandled command push type"; "type" => other);
        }
    }

    if let Some(key) = idem_key {
        ctx.cache_response(key.to_owned(), Value::Bool(true));
    }

    envelope.ack("session", json!({ "applied": true, "duplicate": false }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use repository::InMemoryRepository;
    use transport::Envelope;

    fn ctx() -> AppContext {
        AppContext::new(InMemoryRepository::new(), keyring::Keyring::new(), flux::logging::test_logger())
    }

    #[test]
    fn health_check_is_acked() {
        let ctx = ctx();
        let env = Envelope::new("s2s.health", "engine", "session", json!({}));
        let reply = dispatch(&ctx, &env);
        assert_eq!(reply.kind, "s2s.health.ack");
        assert!(reply.error.is_none());
    }

    #[test]
    fn unknown_kind_is_errored() {
        let ctx = ctx();
        let env = Envelope::new("s2s.made.up", "engine", "session", json!({}));
        let reply = dispatch(&ctx, &env);
        assert_eq!(reply.error.as_ref().unwrap().code, UNKNOWN_COMMAND);
    }

    #[test]
    fn command_push_broadcasts_notice() {
        let ctx = ctx();
        let env = Envelope::new(
            "s2s.command.push",
            "engine",
            "session",
            json!({ "cmd_type": "notice.publish", "idem_key": "n-1", "data": { "message": "hi" } }),
        );
        let reply = dispatch(&ctx, &env);
        assert!(reply.error.is_none());
        assert_eq!(reply.payload["applied"], true);
        assert_eq!(reply.payload["duplicate"], false);
    }

    #[test]
    fn command_push_is_idempotent_on_repeat_idem_key() {
        let ctx = ctx();
        let env = Envelope::new(
            "s2s.command.push",
            "engine",
            "session",
            json!({ "cmd_type": "notice.publish", "idem_key": "n-2", "data": { "message": "hi" } }),
        );
        let first = dispatch(&ctx, &env);
        assert_eq!(first.payload["duplicate"], false);
        let reply = dispatch(&ctx, &env);
        assert_eq!(reply.payload["duplicate"], true);
    }

    #[test]
    fn broadcast_sweep_strips_ansi_from_data() {
        let ctx = ctx();
        let env = Envelope::new(
            "s2s.broadcast.sweep",
            "engine",
            "session",
            json!({ "event_type": "world.alert", "data": { "message": "\u{1b}[31malert\u{1b}[0m" } }),
        );
        let reply = dispatch(&ctx, &env);
        assert!(reply.error.is_none());
    }
}

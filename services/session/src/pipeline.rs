//! The per-connection RPC pipeline (§4.6): auth gates, schema validation,
//! idempotency replay, dispatch, and bulk capture. One call to [`dispatch`]
//! implements steps 2 through 6 for a single request; the connection loop
//! in `main.rs` owns step 1 (framing) and step 7 (writing the response).

use crate::codes;
use crate::core::{AppContext, AuthContext};
use crate::response::{self, Request, Response};
use chrono::Utc;
use repository::{Player, Repository};
use serde_json::{json, Value};
use transport::SchemaRegistry;

/// Builds the per-command JSON Schema registry (§4.3). New commands are
/// added here by registering their schema once at startup; there is no
/// runtime mutation path.
pub fn build_schema_registry() -> SchemaRegistry {
    let mut schemas = SchemaRegistry::new();

    schemas.register(
        "auth.login",
        json!({
            "type": "object",
            "required": ["player_id", "handle"],
            "properties": {
                "player_id": {"type": "integer", "minimum": 1},
                "handle": {"type": "string", "minLength": 1}
            }
        }),
    );

    schemas.register(
        "sector.info",
        json!({
            "type": "object",
            "required": ["sector_id"],
            "properties": {
                "sector_id": {"type": "integer", "minimum": 1}
            }
        }),
    );

    schemas.register(
        "sysop.peer.set_enabled",
        json!({
            "type": "object",
            "required": ["peer_id", "enabled"],
            "properties": {
                "peer_id": {"type": "string", "minLength": 1},
                "enabled": {"type": "boolean"}
            }
        }),
    );

    schemas.register(
        "bulk.execute",
        json!({
            "type": "object",
            "required": ["requests"],
            "properties": {
                "requests": {"type": "array"}
            }
        }),
    );

    schemas
}

/// Runs one request through the full pipeline and returns the response to
/// write. Never panics on a handler failure: internal errors are trapped
/// and converted to an `error` response (§7 "Internal panics inside
/// handlers are trapped").
pub fn dispatch(ctx: &AppContext, auth: &mut AuthContext, req: &Request) -> Response {
    if let Some(key) = req.idempotency_key() {
        if let Some(cached) = ctx.cached_response(key) {
            slog::debug!(ctx.log, "idempotency replay"; "key" => key, "command" => %req.kind);
            if let Ok(response) = serde_json::from_value(cached) {
                return response;
            }
        }
    }

    if let Some(refusal) = check_auth_gate(req, auth) {
        return refusal_response(ctx, req, refusal);
    }

    if let Err(reasons) = ctx.schemas.validate(&req.kind, &req.data) {
        return response::refused(&ctx.response_ids, req, codes::SCHEMA_INVALID, reasons.join("; "));
    }

    let response = match run_handler(ctx, auth, req) {
        Ok(data) => {
            let mut response = response::ok(&ctx.response_ids, req, data);
            if req.kind == "session.ping" {
                response.kind = "session.pong".to_owned();
            }
            response
        }
        Err((code, message)) if code == codes::UNKNOWN_COMMAND => response::refused(&ctx.response_ids, req, code, message),
        Err((code, message)) => response::error(&ctx.response_ids, req, code, message, Value::Null),
    };

    if let Some(key) = req.idempotency_key() {
        if let Ok(value) = serde_json::to_value(&response) {
            ctx.cache_response(key.to_owned(), value);
        }
    }

    response
}

/// `None` if the request passes; `Some(code)` with the refusal code
/// otherwise (§4.6 step 3).
fn check_auth_gate(req: &Request, auth: &AuthContext) -> Option<i64> {
    if req.kind.starts_with("auth.") {
        return None;
    }
    if !auth.is_authenticated() {
        return Some(codes::AUTH_REQUIRED);
    }
    if req.kind.starts_with("sysop.") && !auth.is_sysop {
        return Some(codes::AUTH_FORBIDDEN);
    }
    None
}

fn refusal_response(ctx: &AppContext, req: &Request, code: i64) -> Response {
    let reason = match code {
        codes::AUTH_REQUIRED => "authentication required",
        codes::AUTH_FORBIDDEN => "sysop role required",
        _ => "refused",
    };
    response::refused(&ctx.response_ids, req, code, reason)
}

type HandlerResult = Result<Value, (i64, String)>;

fn run_handler(ctx: &AppContext, auth: &mut AuthContext, req: &Request) -> HandlerResult {
    match req.kind.as_str() {
        "auth.login" => handle_auth_login(ctx, auth, req),
        "session.ping" => Ok(req.data.clone()),
        "sector.info" => handle_sector_info(ctx, req),
        "bulk.execute" => handle_bulk_execute(ctx, auth, req),
        "sysop.peer.list" => Ok(handle_sysop_peer_list(ctx)),
        "sysop.peer.set_enabled" => handle_sysop_peer_set_enabled(ctx, req),
        other => Err((codes::UNKNOWN_COMMAND, format!("unknown command: {}", other))),
    }
}

fn handle_auth_login(ctx: &AppContext, auth: &mut AuthContext, req: &Request) -> HandlerResult {
    let player_id = req.data["player_id"].as_u64().ok_or((codes::SCHEMA_INVALID, "player_id must be an integer".to_owned()))?;
    let handle = req.data["handle"].as_str().ok_or((codes::SCHEMA_INVALID, "handle must be a string".to_owned()))?;

    let player = match ctx.repo.get_player(player_id) {
        Ok(player) => player,
        Err(_) => {
            let is_sysop = handle == "sysop";
            let player = Player {
                id: player_id,
                handle: handle.to_owned(),
                sector_id: 1,
                alignment: 0,
                experience: 0,
                is_sysop,
                created_at: Utc::now(),
            };
            ctx.repo.insert_player(player.clone()).map_err(|e| (e.code() as i64, e.to_string()))?;
            player
        }
    };

    auth.player_id = Some(player.id);
    auth.is_sysop = player.is_sysop;

    slog::info!(ctx.log, "player authenticated"; "player_id" => player.id, "handle" => %player.handle);
    Ok(json!({ "player_id": player.id, "handle": player.handle, "is_sysop": player.is_sysop }))
}

fn handle_sector_info(ctx: &AppContext, req: &Request) -> HandlerResult {
    let sector_id = req.data["sector_id"].as_u64().ok_or((codes::SCHEMA_INVALID, "sector_id must be an integer".to_owned()))? as u32;
    ctx.repo.sector_info(sector_id).map_err(|e| (e.code() as i64, e.to_string()))
}

fn handle_bulk_execute(ctx: &AppContext, auth: &mut AuthContext, req: &Request) -> HandlerResult {
    let commands = req.data["requests"].as_array().ok_or((codes::SCHEMA_INVALID, "requests must be an array".to_owned()))?;

    let mut captured = Vec::with_capacity(commands.len());
    for (idx, raw) in commands.iter().enumerate() {
        let sub = match build_sub_request(idx, raw) {
            Ok(sub) => sub,
            Err(reason) => {
                captured.push(json!({ "status": "refused", "error": { "code": codes::SCHEMA_INVALID, "message": reason } }));
                continue;
            }
        };
        let response = dispatch(ctx, auth, &sub);
        captured.push(serde_json::to_value(response).unwrap_or(Value::Null));
    }

    Ok(json!({ "responses": captured }))
}

fn build_sub_request(idx: usize, raw: &Value) -> Result<Request, String> {
    let obj = raw.as_object().ok_or_else(|| "each bulk command must be an object".to_owned())?;
    let kind = obj.get("type").and_then(Value::as_str).ok_or_else(|| "each bulk command needs a type".to_owned())?;
    let id = obj.get("id").and_then(Value::as_str).map(str::to_owned).unwrap_or_else(|| format!("bulk-{}", idx));
    let data = obj.get("data").cloned().unwrap_or(Value::Null);

    Ok(Request { id, kind: kind.to_owned(), data, meta: Value::Null })
}

fn handle_sysop_peer_list(ctx: &AppContext) -> Value {
    let peers: Vec<Value> = ctx
        .peers
        .list()
        .into_iter()
        .map(|peer| {
            json!({
                "peer_id": peer.peer_id,
                "host": peer.host,
                "port": peer.port,
                "enabled": peer.enabled,
                "last_seen_at": peer.last_seen_at,
            })
        })
        .collect();
    json!({ "peers": peers })
}

fn handle_sysop_peer_set_enabled(ctx: &AppContext, req: &Request) -> HandlerResult {
    let peer_id = req.data["peer_id"].as_str().ok_or((codes::SCHEMA_INVALID, "peer_id must be a string".to_owned()))?;
    let enabled = req.data["enabled"].as_bool().ok_or((codes::SCHEMA_INVALID, "enabled must be a boolean".to_owned()))?;

    if ctx.peers.set_enabled(peer_id, enabled) {
        Ok(json!({ "peer_id": peer_id, "enabled": enabled }))
    } else {
        Err((repository::ErrorCode::NotFound as i64, format!("unknown peer: {}", peer_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Status;
    use repository::InMemoryRepository;

    fn ctx() -> AppContext {
        AppContext::new(InMemoryRepository::new(), keyring::Keyring::new(), flux::logging::test_logger())
    }

    fn req(kind: &str, data: Value) -> Request {
        Request { id: "c1".to_owned(), kind: kind.to_owned(), data, meta: Value::Null }
    }

    #[test]
    fn unauthenticated_request_is_refused() {
        let ctx = ctx();
        let mut auth = AuthContext::default();
        let response = dispatch(&ctx, &mut auth, &req("session.ping", Value::Null));
        assert_eq!(response.status, Status::Refused);
    }

    #[test]
    fn auth_login_then_ping_succeeds() {
        let ctx = ctx();
        let mut auth = AuthContext::default();
        let login = dispatch(&ctx, &mut auth, &req("auth.login", json!({"player_id": 1, "handle": "kale"})));
        assert_eq!(login.status, Status::Ok);
        assert!(auth.is_authenticated());

        let ping = dispatch(&ctx, &mut auth, &req("session.ping", json!({"seq": 1})));
        assert_eq!(ping.status, Status::Ok);
        assert_eq!(ping.kind, "session.pong");
        assert_eq!(ping.data, Some(json!({"seq": 1})));
    }

    #[test]
    fn sysop_command_refused_for_non_sysop() {
        let ctx = ctx();
        let mut auth = AuthContext::default();
        dispatch(&ctx, &mut auth, &req("auth.login", json!({"player_id": 1, "handle": "kale"})));
        let response = dispatch(&ctx, &mut auth, &req("sysop.peer.list", Value::Null));
        assert_eq!(response.status, Status::Refused);
    }

    #[test]
    fn unknown_command_is_refused_not_errored() {
        let ctx = ctx();
        let mut auth = AuthContext::default();
        dispatch(&ctx, &mut auth, &req("auth.login", json!({"player_id": 1, "handle": "kale"})));
        let response = dispatch(&ctx, &mut auth, &req("made.up.command", Value::Null));
        assert_eq!(response.status, Status::Refused);
    }

    #[test]
    fn idempotency_key_replays_cached_response_verbatim() {
        let ctx = ctx();
        let mut auth = AuthContext::default();
        dispatch(&ctx, &mut auth, &req("auth.login", json!({"player_id": 1, "handle": "kale"})));

        let mut first = req("session.ping", Value::Null);
        first.meta = json!({"idempotency_key": "abc"});
        let r1 = dispatch(&ctx, &mut auth, &first);
        let r2 = dispatch(&ctx, &mut auth, &first);
        assert_eq!(r1.id, r2.id);
    }

    #[test]
    fn bulk_execute_runs_all_sub_commands_even_if_one_fails() {
        let ctx = ctx();
        let mut auth = AuthContext::default();
        dispatch(&ctx, &mut auth, &req("auth.login", json!({"player_id": 1, "handle": "kale"})));

        let bulk = req(
            "bulk.execute",
            json!({"requests": [
                {"type": "session.ping", "data": {}},
                {"type": "made.up", "data": {}},
                {"type": "session.ping", "data": {}},
            ]}),
        );
        let response = dispatch(&ctx, &mut auth, &bulk);
        let responses = response.data.unwrap()["responses"].as_array().unwrap().len();
        assert_eq!(responses, 3);
    }
}

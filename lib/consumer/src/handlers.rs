//! Reference event handlers (§4.4 "Example handlers"), grounded on
//! `original_source/src/engine_consumer.c`'s `handle_event` switch.
//!
//! `ship.self_destruct.initiated` resolves the actor's ship, destroys it,
//! and emits a follow-up `ship.destroyed` event; `player.trade.v1` advances
//! XP/alignment from the trade payload. Both quarantine the row on a
//! malformed payload before any handler-specific logic runs, matching the
//! original's `json_loads` failing ahead of the type switch — this resolves
//! the open question of whether `player.trade.v1` should update the
//! watermark on malformed input: yes, it quarantines like any other poison
//! event (see DESIGN.md).

use crate::{HandlerResult, Store};
use repository::{EventRow, Repository};
use serde_json::Value;

/// `ship.self_destruct.initiated`: resolve the actor's ship, destroy it, and
/// append `ship.destroyed` carrying `{player_id, ship_id, ship_name}`.
pub fn ship_self_destruct_initiated(store: &dyn Store, row: &EventRow) -> HandlerResult {
    let player_id = row.actor_player_id.ok_or_else(|| "missing actor_player_id".to_owned())?;

    let ship = store
        .ship_for_player(player_id)
        .map_err(|e| format!("no active ship for player {}: {}", player_id, e))?;

    store
        .delete_ship(ship.id)
        .map_err(|e| format!("failed destroying ship {}: {}", ship.id, e))?;

    store.append_event(
        "ship.destroyed",
        Some(player_id),
        row.sector_id,
        serde_json::json!({
            "player_id": player_id,
            "ship_id": ship.id,
            "ship_name": ship.name,
        }),
    );

    Ok(())
}

/// `player.trade.v1`: advances the actor's XP/alignment by the deltas named
/// in the payload. A payload missing either field, or carrying a non-integer
/// value, quarantines the row.
pub fn player_trade_v1(store: &dyn Store, row: &EventRow) -> HandlerResult {
    let player_id = row.actor_player_id.ok_or_else(|| "missing actor_player_id".to_owned())?;
    let xp_delta = require_i64(&row.payload, "xp_delta")?;
    let alignment_delta = require_i64(&row.payload, "alignment_delta")?;

    let mut player = store.get_player(player_id).map_err(|e| e.to_string())?;
    player.experience += xp_delta;
    player.alignment += alignment_delta;
    store.update_player(player).map_err(|e| e.to_string())
}

/// `s2s.broadcast.sweep`: no-op placeholder, as in the original — broadcast
/// side effects live in the Session Server's connection fan-out, not here.
pub fn broadcast_sweep(_store: &dyn Store, _row: &EventRow) -> HandlerResult {
    Ok(())
}

fn require_i64(payload: &Value, field: &str) -> Result<i64, String> {
    payload
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| format!("payload missing integer field `{}`", field))
}

/// Registers the reference handlers on a freshly built consumer. The Engine
/// binary calls this once at startup; game-content handlers (trade,
/// combat, chat, mail, planet ops per §1 Non-goals) register themselves
/// separately and are out of scope here.
pub fn register_defaults(consumer: &mut crate::EventConsumer) {
    consumer.register_handler("ship.self_destruct.initiated", Box::new(ship_self_destruct_initiated));
    consumer.register_handler("player.trade.v1", Box::new(player_trade_v1));
    consumer.register_handler("s2s.broadcast.sweep", Box::new(broadcast_sweep));
}

#[cfg(test)]
mod tests {
    use super::*;
    use repository::InMemoryRepository;
    use repository::{Player, Ship};
    use serde_json::json;

    fn seed_player(repo: &InMemoryRepository, id: u64) {
        repo.insert_player(Player {
            id,
            handle: "captain".to_owned(),
            sector_id: 1,
            alignment: 0,
            experience: 0,
            is_sysop: false,
            created_at: chrono::Utc::now(),
        })
        .unwrap();
    }

    fn row(kind: &str, actor: Option<u64>, payload: Value) -> EventRow {
        EventRow {
            id: 1,
            ts: 100,
            kind: kind.to_owned(),
            actor_player_id: actor,
            sector_id: Some(7),
            payload,
        }
    }

    #[test]
    fn self_destruct_removes_ship_and_emits_follow_up() {
        let repo = InMemoryRepository::new();
        seed_player(&repo, 42);
        repo.insert_ship(Ship {
            id: 9,
            owner_player_id: Some(42),
            name: "Imperial StarShip".to_owned(),
            sector_id: 7,
            hull_points: 100,
            npc_locked: false,
        })
        .unwrap();

        let ev = row("ship.self_destruct.initiated", Some(42), json!({}));
        ship_self_destruct_initiated(&repo, &ev).unwrap();

        assert!(repo.get_ship(9).is_err());
        let follow_ups = repo.events_after(0, 10, None);
        assert_eq!(follow_ups.len(), 1);
        assert_eq!(follow_ups[0].kind, "ship.destroyed");
        assert_eq!(follow_ups[0].payload["ship_name"], "Imperial StarShip");
    }

    #[test]
    fn self_destruct_quarantines_when_player_has_no_ship() {
        let repo = InMemoryRepository::new();
        seed_player(&repo, 42);

        let ev = row("ship.self_destruct.initiated", Some(42), json!({}));
        assert!(ship_self_destruct_initiated(&repo, &ev).is_err());
    }

    #[test]
    fn trade_v1_advances_xp_and_alignment() {
        let repo = InMemoryRepository::new();
        seed_player(&repo, 7);

        let ev = row("player.trade.v1", Some(7), json!({"xp_delta": 50, "alignment_delta": -5}));
        player_trade_v1(&repo, &ev).unwrap();

        let player = repo.get_player(7).unwrap();
        assert_eq!(player.experience, 50);
        assert_eq!(player.alignment, -5);
    }

    #[test]
    fn trade_v1_quarantines_malformed_payload() {
        let repo = InMemoryRepository::new();
        seed_player(&repo, 7);

        let ev = row("player.trade.v1", Some(7), json!({"xp_delta": "not-a-number"}));
        assert!(player_trade_v1(&repo, &ev).is_err());
    }
}

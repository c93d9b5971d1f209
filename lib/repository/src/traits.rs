//! Typed persistence abstraction (§4.9). Handlers reach persistence only
//! through these traits; no caller constructs SQL strings (there is none to
//! construct — dialect differences are the out-of-scope SQL layer's
//! problem, not this crate's).

use crate::error::Result;
use crate::model::*;
use serde_json::Value;

/// Domain object lookups and mutations.
pub trait Repository: Send + Sync {
    fn get_sector(&self, id: SectorId) -> Result<Sector>;
    fn insert_sector(&self, sector: Sector) -> Result<()>;
    fn all_sector_ids(&self) -> Vec<SectorId>;

    fn list_warps_from(&self, id: SectorId) -> Vec<Warp>;
    fn list_all_warps(&self) -> Vec<Warp>;
    fn insert_warp(&self, warp: Warp) -> Result<()>;
    fn remove_warp(&self, warp: Warp) -> Result<()>;
    fn warp_exists(&self, warp: Warp) -> bool;

    fn mark_used_sector(&self, id: SectorId);
    fn is_used_sector(&self, id: SectorId) -> bool;

    fn get_port(&self, id: PortId) -> Result<Port>;
    fn insert_port(&self, port: Port) -> Result<()>;
    fn list_ports(&self) -> Vec<Port>;
    fn port_info(&self, id: PortId) -> Result<Value>;

    fn get_planet(&self, id: PlanetId) -> Result<Planet>;
    fn insert_planet(&self, planet: Planet) -> Result<()>;
    fn list_planets(&self) -> Vec<Planet>;
    fn planet_info(&self, id: PlanetId) -> Result<Value>;

    fn get_player(&self, id: PlayerId) -> Result<Player>;
    fn insert_player(&self, player: Player) -> Result<()>;
    fn update_player(&self, player: Player) -> Result<()>;

    fn get_ship(&self, id: ShipId) -> Result<Ship>;
    fn insert_ship(&self, ship: Ship) -> Result<()>;
    fn update_ship(&self, ship: Ship) -> Result<()>;
    fn delete_ship(&self, id: ShipId) -> Result<()>;
    fn ship_for_player(&self, player_id: PlayerId) -> Result<Ship>;

    fn get_bank_account(&self, id: AccountId) -> Result<BankAccount>;
    fn insert_bank_account(&self, account: BankAccount) -> Result<()>;
    fn adjust_bank_balance(&self, id: AccountId, delta: i64) -> Result<()>;

    fn get_commodity_order(&self, id: OrderId) -> Result<CommodityOrder>;
    fn insert_commodity_order(&self, order: CommodityOrder) -> Result<()>;
    fn update_commodity_order(&self, order: CommodityOrder) -> Result<()>;

    fn sector_info(&self, id: SectorId) -> Result<Value>;
}

pub type EventId = u64;

#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: EventId,
    pub ts: i64,
    pub kind: String,
    pub actor_player_id: Option<PlayerId>,
    pub sector_id: Option<SectorId>,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct DeadLetterRow {
    pub event: EventRow,
    pub error: String,
    pub moved_at: i64,
}

/// The append-only event log plus per-consumer offsets and the dead-letter
/// table (§3 "Event"/"Consumer offset"/"Dead letter", §6 "Persisted
/// state").
pub trait EventLog: Send + Sync {
    /// Appends an immutable event, returning its assigned id. Ids strictly
    /// increase; gaps are acceptable.
    fn append_event(&self, kind: &str, actor_player_id: Option<PlayerId>, sector_id: Option<SectorId>, payload: Value) -> EventId;

    fn max_event_id(&self) -> EventId;

    /// Rows with `id > last_id`, ascending, optionally filtered to
    /// `type ∈ allowed_types`, capped at `limit`.
    fn events_after(&self, last_id: EventId, limit: usize, allowed_types: Option<&[String]>) -> Vec<EventRow>;

    fn get_offset(&self, consumer_key: &str) -> (EventId, i64);
    fn set_offset(&self, consumer_key: &str, last_id: EventId, last_ts: i64);

    /// Upsert on id: a retried poison event replaces its prior dead-letter
    /// row rather than duplicating it.
    fn insert_deadletter(&self, row: EventRow, error: String, moved_at: i64);
    fn list_deadletter(&self) -> Vec<DeadLetterRow>;
}

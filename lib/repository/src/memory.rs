//! In-memory reference implementation of [`Repository`] and [`EventLog`].
//! The real relational schema and SQL stored procedures are out of scope
//! (§1); this is the one concrete implementation the rest of the workspace
//! runs tests against. Wrapped internally in `Mutex`-guarded collections
//! rather than a literal thread-local connection pool, per §5's note that
//! the policy (no shared lock held across I/O) is load-bearing, not the
//! mechanism.

use crate::error::{Error, Result};
use crate::model::*;
use crate::traits::{DeadLetterRow, EventId, EventLog, EventRow, Repository};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    sectors: HashMap<SectorId, Sector>,
    warps: HashSet<Warp>,
    used_sectors: HashSet<SectorId>,
    ports: HashMap<PortId, Port>,
    planets: HashMap<PlanetId, Planet>,
    players: HashMap<PlayerId, Player>,
    ships: HashMap<ShipId, Ship>,
    bank_accounts: HashMap<AccountId, BankAccount>,
    commodity_orders: HashMap<OrderId, CommodityOrder>,
}

#[derive(Default)]
struct EventTables {
    events: Vec<EventRow>,
    offsets: HashMap<String, (EventId, i64)>,
    deadletter: HashMap<EventId, DeadLetterRow>,
}

pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    events: Mutex<EventTables>,
    next_event_id: AtomicU64,
}

impl InMemoryRepository {
    pub fn new() -> InMemoryRepository {
        InMemoryRepository {
            tables: Mutex::new(Tables::default()),
            events: Mutex::new(EventTables::default()),
            next_event_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> InMemoryRepository {
        InMemoryRepository::new()
    }
}

impl Repository for InMemoryRepository {
    fn get_sector(&self, id: SectorId) -> Result<Sector> {
        self.tables
            .lock()
            .unwrap()
            .sectors
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound { what: "sector", id: id.to_string() })
    }

    fn insert_sector(&self, sector: Sector) -> Result<()> {
        self.tables.lock().unwrap().sectors.insert(sector.id, sector);
        Ok(())
    }

    fn all_sector_ids(&self) -> Vec<SectorId> {
        self.tables.lock().unwrap().sectors.keys().copied().collect()
    }

    fn list_warps_from(&self, id: SectorId) -> Vec<Warp> {
        self.tables.lock().unwrap().warps.iter().filter(|w| w.from == id).copied().collect()
    }

    fn list_all_warps(&self) -> Vec<Warp> {
        self.tables.lock().unwrap().warps.iter().copied().collect()
    }

    fn insert_warp(&self, warp: Warp) -> Result<()> {
        self.tables.lock().unwrap().warps.insert(warp);
        Ok(())
    }

    fn remove_warp(&self, warp: Warp) -> Result<()> {
        self.tables.lock().unwrap().warps.remove(&warp);
        Ok(())
    }

    fn warp_exists(&self, warp: Warp) -> bool {
        self.tables.lock().unwrap().warps.contains(&warp)
    }

    fn mark_used_sector(&self, id: SectorId) {
        self.tables.lock().unwrap().used_sectors.insert(id);
    }

    fn is_used_sector(&self, id: SectorId) -> bool {
        self.tables.lock().unwrap().used_sectors.contains(&id)
    }

    fn get_port(&self, id: PortId) -> Result<Port> {
        self.tables
            .lock()
            .unwrap()
            .ports
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound { what: "port", id: id.to_string() })
    }

    fn insert_port(&self, port: Port) -> Result<()> {
        self.tables.lock().unwrap().ports.insert(port.id, port);
        Ok(())
    }

    fn list_ports(&self) -> Vec<Port> {
        self.tables.lock().unwrap().ports.values().cloned().collect()
    }

    fn port_info(&self, id: PortId) -> Result<serde_json::Value> {
        let port = self.get_port(id)?;
        Ok(json!({
            "id": port.id,
            "sector_id": port.sector_id,
            "stock": port.stock,
            "bank_account": port.bank_account,
        }))
    }

    fn get_planet(&self, id: PlanetId) -> Result<Planet> {
        self.tables
            .lock()
            .unwrap()
            .planets
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound { what: "planet", id: id.to_string() })
    }

    fn insert_planet(&self, planet: Planet) -> Result<()> {
        self.tables.lock().unwrap().planets.insert(planet.id, planet);
        Ok(())
    }

    fn list_planets(&self) -> Vec<Planet> {
        self.tables.lock().unwrap().planets.values().cloned().collect()
    }

    fn planet_info(&self, id: PlanetId) -> Result<serde_json::Value> {
        let planet = self.get_planet(id)?;
        Ok(json!({
            "id": planet.id,
            "sector_id": planet.sector_id,
            "name": planet.name,
            "owner_player_id": planet.owner_player_id,
        }))
    }

    fn get_player(&self, id: PlayerId) -> Result<Player> {
        self.tables
            .lock()
            .unwrap()
            .players
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound { what: "player", id: id.to_string() })
    }

    fn insert_player(&self, player: Player) -> Result<()> {
        self.tables.lock().unwrap().players.insert(player.id, player);
        Ok(())
    }

    fn update_player(&self, player: Player) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.players.contains_key(&player.id) {
            return Err(Error::NotFound { what: "player", id: player.id.to_string() });
        }
        tables.players.insert(player.id, player);
        Ok(())
    }

    fn get_ship(&self, id: ShipId) -> Result<Ship> {
        self.tables
            .lock()
            .unwrap()
            .ships
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound { what: "ship", id: id.to_string() })
    }

    fn insert_ship(&self, ship: Ship) -> Result<()> {
        self.tables.lock().unwrap().ships.insert(ship.id, ship);
        Ok(())
    }

    fn update_ship(&self, ship: Ship) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.ships.contains_key(&ship.id) {
            return Err(Error::NotFound { what: "ship", id: ship.id.to_string() });
        }
        tables.ships.insert(ship.id, ship);
        Ok(())
    }

    fn delete_ship(&self, id: ShipId) -> Result<()> {
        self.tables
            .lock()
            .unwrap()
            .ships
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound { what: "ship", id: id.to_string() })
    }

    fn ship_for_player(&self, player_id: PlayerId) -> Result<Ship> {
        self.tables
            .lock()
            .unwrap()
            .ships
            .values()
            .find(|s| s.owner_player_id == Some(player_id))
            .cloned()
            .ok_or_else(|| Error::NotFound { what: "ship", id: player_id.to_string() })
    }

    fn get_bank_account(&self, id: AccountId) -> Result<BankAccount> {
        self.tables
            .lock()
            .unwrap()
            .bank_accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound { what: "bank_account", id: id.to_string() })
    }

    fn insert_bank_account(&self, account: BankAccount) -> Result<()> {
        self.tables.lock().unwrap().bank_accounts.insert(account.id, account);
        Ok(())
    }

    fn adjust_bank_balance(&self, id: AccountId, delta: i64) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let account = tables
            .bank_accounts
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound { what: "bank_account", id: id.to_string() })?;

        let new_balance = account.credits + delta;
        if new_balance < 0 {
            return Err(Error::Conflict {
                what: "bank_account",
                reason: "balance would go negative".to_owned(),
            });
        }
        account.credits = new_balance;
        Ok(())
    }

    fn get_commodity_order(&self, id: OrderId) -> Result<CommodityOrder> {
        self.tables
            .lock()
            .unwrap()
            .commodity_orders
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound { what: "commodity_order", id: id.to_string() })
    }

    fn insert_commodity_order(&self, order: CommodityOrder) -> Result<()> {
        self.tables.lock().unwrap().commodity_orders.insert(order.id, order);
        Ok(())
    }

    fn update_commodity_order(&self, order: CommodityOrder) -> Result<()> {
        if !order.is_valid() {
            return Err(Error::Conflict {
                what: "commodity_order",
                reason: "filled_quantity exceeds quantity".to_owned(),
            });
        }
        let mut tables = self.tables.lock().unwrap();
        if !tables.commodity_orders.contains_key(&order.id) {
            return Err(Error::NotFound { what: "commodity_order", id: order.id.to_string() });
        }
        tables.commodity_orders.insert(order.id, order);
        Ok(())
    }

    fn sector_info(&self, id: SectorId) -> Result<serde_json::Value> {
        let sector = self.get_sector(id)?;
        let warps = self.list_warps_from(id);
        Ok(json!({
            "id": sector.id,
            "name": sector.name,
            "has_beacon": sector.has_beacon,
            "warps": warps.into_iter().map(|w| w.to).collect::<Vec<_>>(),
        }))
    }
}

impl EventLog for InMemoryRepository {
    fn append_event(&self, kind: &str, actor_player_id: Option<PlayerId>, sector_id: Option<SectorId>, payload: serde_json::Value) -> EventId {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let row = EventRow {
            id,
            ts: flux::time::timestamp_secs() as i64,
            kind: kind.to_owned(),
            actor_player_id,
            sector_id,
            payload,
        };
        self.events.lock().unwrap().events.push(row);
        id
    }

    fn max_event_id(&self) -> EventId {
        self.events.lock().unwrap().events.last().map(|e| e.id).unwrap_or(0)
    }

    fn events_after(&self, last_id: EventId, limit: usize, allowed_types: Option<&[String]>) -> Vec<EventRow> {
        self.events
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.id > last_id)
            .filter(|e| allowed_types.map_or(true, |types| types.iter().any(|t| t == &e.kind)))
            .take(limit)
            .cloned()
            .collect()
    }

    fn get_offset(&self, consumer_key: &str) -> (EventId, i64) {
        self.events.lock().unwrap().offsets.get(consumer_key).copied().unwrap_or((0, 0))
    }

    fn set_offset(&self, consumer_key: &str, last_id: EventId, last_ts: i64) {
        self.events.lock().unwrap().offsets.insert(consumer_key.to_owned(), (last_id, last_ts));
    }

    fn insert_deadletter(&self, row: EventRow, error: String, moved_at: i64) {
        let id = row.id;
        self.events.lock().unwrap().deadletter.insert(id, DeadLetterRow { event: row, error, moved_at });
    }

    fn list_deadletter(&self) -> Vec<DeadLetterRow> {
        self.events.lock().unwrap().deadletter.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_on_missing_sector() {
        let repo = InMemoryRepository::new();
        assert!(matches!(repo.get_sector(42), Err(Error::NotFound { .. })));
    }

    #[test]
    fn bank_balance_cannot_go_negative() {
        let repo = InMemoryRepository::new();
        repo.insert_bank_account(BankAccount { id: 1, owner_player_id: None, credits: 100 }).unwrap();
        assert!(repo.adjust_bank_balance(1, -50).is_ok());
        assert!(matches!(repo.adjust_bank_balance(1, -1000), Err(Error::Conflict { .. })));
    }

    #[test]
    fn events_after_respects_limit_and_type_filter() {
        let repo = InMemoryRepository::new();
        repo.append_event("a", None, None, json!({}));
        repo.append_event("b", None, None, json!({}));
        repo.append_event("a", None, None, json!({}));

        let filtered = repo.events_after(0, 10, Some(&["a".to_owned()]));
        assert_eq!(filtered.len(), 2);

        let limited = repo.events_after(0, 1, None);
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, 1);
    }

    #[test]
    fn offset_defaults_to_zero() {
        let repo = InMemoryRepository::new();
        assert_eq!(repo.get_offset("engine"), (0, 0));
        repo.set_offset("engine", 5, 100);
        assert_eq!(repo.get_offset("engine"), (5, 100));
    }
}

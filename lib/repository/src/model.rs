//! Minimal in-memory value types for the objects the Repository Interface
//! must expose lookups for (§3.1). These carry no business logic; they
//! exist so handlers and tests have something concrete to look up and
//! mutate.

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

pub type SectorId = u32;
pub type PortId = u32;
pub type PlanetId = u32;
pub type PlayerId = u64;
pub type ShipId = u64;
pub type OrderId = u64;
pub type AccountId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sector {
    pub id: SectorId,
    pub name: String,
    pub has_beacon: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Warp {
    pub from: SectorId,
    pub to: SectorId,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PortType {
    Ordinary(u8),
    Stardock,
    BlackMarket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub sector_id: SectorId,
    pub port_type: PortType,
    pub stock: [i64; 3],
    pub bank_account: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Planet {
    pub id: PlanetId,
    pub sector_id: SectorId,
    pub name: String,
    pub owner_player_id: Option<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub handle: String,
    pub sector_id: SectorId,
    pub alignment: i64,
    pub experience: i64,
    pub is_sysop: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ship {
    pub id: ShipId,
    pub owner_player_id: Option<PlayerId>,
    pub name: String,
    pub sector_id: SectorId,
    pub hull_points: i64,
    pub npc_locked: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommodityOrder {
    pub id: OrderId,
    pub port_id: PortId,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub quantity: i64,
    pub filled_quantity: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CommodityOrder {
    pub fn is_valid(&self) -> bool {
        self.filled_quantity <= self.quantity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: AccountId,
    pub owner_player_id: Option<PlayerId>,
    pub credits: i64,
}

//! Universe generation parameters (§4.7). Defaults mirror
//! `original_source/src/server_bigbang.c`'s constants where the distilled
//! spec only names a parameter without a default.

use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseConfig {
    pub num_sectors: u32,
    /// Maximum out-degree a random warp insertion may push a sector past.
    pub density: u32,
    pub port_ratio: f64,
    pub planet_ratio: f64,
    pub min_tunnels: u32,
    pub min_tunnel_len: u32,
    pub max_ports: u32,
    pub max_planets: u32,
    pub port_credits: i64,
    /// Probability a non-tunnel sector > 10 gets *no* random warps at all.
    pub p_deadend: f64,
    /// Probability a forward random warp does *not* get a reverse edge.
    pub p_oneway: f64,
    /// Lower bound of the sector range random warps and FedSpace exits may
    /// target (§3 "FedSpace exit").
    pub outer_min: u32,
}

impl UniverseConfig {
    /// Upper bound of the outer sector range: the last sector id.
    pub fn outer_max(&self) -> u32 {
        self.num_sectors
    }
}

impl Default for UniverseConfig {
    fn default() -> UniverseConfig {
        UniverseConfig {
            num_sectors: 500,
            density: 4,
            port_ratio: 0.1,
            planet_ratio: 0.02,
            min_tunnels: 3,
            min_tunnel_len: 4,
            max_ports: 50,
            max_planets: 20,
            port_credits: 100_000,
            p_deadend: 0.05,
            p_oneway: 0.05,
            outer_min: 11,
        }
    }
}

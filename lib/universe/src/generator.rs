//! The universe generation algorithm (§4.7). Builds the initial sector
//! graph, tunnels, ports, planets, and NPC ships against the `Repository`
//! trait, so the pipeline runs identically whether `repo` is the in-memory
//! reference implementation or (eventually) a real database-backed one.
//!
//! Order dependencies are strict, per §4.7's closing paragraph: tunnels
//! after the random graph (so tunnel nodes start unspoiled), FedSpace-exit
//! enforcement after tunnel pruning (so pruning cannot silently eat an exit
//! edge), connectivity validation after that, trap repair next, and ports
//! and planets last (so faction home sectors are already fixed).

use crate::config::UniverseConfig;
use crate::namegen::random_sector_name;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use repository::{BankAccount, Planet, Port, PortType, Repository, Sector, Ship, Warp};
use slog::Logger;
use std::collections::{HashSet, VecDeque};

/// Attempt cap for the various "insert N edges or give up" loops (§4.7 step
/// 2: "attempt up to 200 insertions").
const ATTEMPT_CAP: usize = 200;

/// FedSpace as used by the exit-enforcement and trap-repair steps: `{2..10}`
/// per §3's invariant text, not `1..10` — §9's Open Question on this exact
/// ambiguity is resolved here in favor of the invariant wording (see
/// DESIGN.md).
const FEDSPACE_MIN: u32 = 2;
const FEDSPACE_MAX: u32 = 10;

/// Minimum required FedSpace exit edges (§3, §8 property 7b).
const FEDSPACE_EXIT_MIN: usize = 3;

#[derive(Debug, Eq, PartialEq)]
pub enum UniverseError {
    /// Connectivity validation (step 6) exhausted its ten repair attempts
    /// and this sector still has zero outgoing warps.
    Unreachable { sector_id: u32 },
}

impl std::fmt::Display for UniverseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniverseError::Unreachable { sector_id } => {
                write!(f, "sector {} has no outgoing warp after repair attempts", sector_id)
            }
        }
    }
}

impl std::error::Error for UniverseError {}

#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    pub num_sectors: u32,
    pub tunnels_built: usize,
    pub orphans_repaired: usize,
    pub traps_repaired: usize,
    pub ports_created: usize,
    pub planets_created: usize,
}

/// Runs the full generation pipeline against `repo`, seeded by `seed` so
/// runs are reproducible (§4.7 expansion note).
pub fn generate(repo: &dyn Repository, config: &UniverseConfig, seed: u64, log: &Logger) -> Result<GenerationReport, UniverseError> {
    let mut rng = StdRng::seed_from_u64(seed);

    create_sectors(repo, config, &mut rng);
    random_warps(repo, config, &mut rng);
    let tunnels = build_tunnels(repo, config, &mut rng);
    prune_tunnel_leaks(repo);
    enforce_fedspace_exit(repo, config, &mut rng);
    let orphans_repaired = validate_connectivity(repo, config, &mut rng)?;
    let traps_repaired = repair_traps(repo, &mut rng);
    let ports_created = place_ports(repo, config, &tunnels, &mut rng);
    let planets_created = place_planets(repo, config, &tunnels, &mut rng);
    place_npc_ships(repo);

    slog::info!(log, "universe generated";
        "num_sectors" => config.num_sectors,
        "tunnels" => tunnels.len(),
        "orphans_repaired" => orphans_repaired,
        "traps_repaired" => traps_repaired,
        "ports" => ports_created,
        "planets" => planets_created);

    Ok(GenerationReport {
        num_sectors: config.num_sectors,
        tunnels_built: tunnels.len(),
        orphans_repaired,
        traps_repaired,
        ports_created,
        planets_created,
    })
}

fn out_degree(repo: &dyn Repository, id: u32) -> u32 {
    repo.list_warps_from(id).len() as u32
}

/// Step 1: every sector with a random name; every 64th carries a beacon.
fn create_sectors(repo: &dyn Repository, config: &UniverseConfig, rng: &mut StdRng) {
    for id in 1..=config.num_sectors {
        repo.insert_sector(Sector {
            id,
            name: random_sector_name(rng),
            has_beacon: id % 64 == 0,
        })
        .expect("fresh sector id cannot conflict");
    }
}

/// Step 2: random warps out of every non-tunnel sector beyond FedSpace.
fn random_warps(repo: &dyn Repository, config: &UniverseConfig, rng: &mut StdRng) {
    for s in config.outer_min..=config.num_sectors {
        if rng.gen_bool(config.p_deadend) {
            continue;
        }

        let target_degree = rng.gen_range(1..=config.density);
        let mut placed = 0u32;

        for _ in 0..ATTEMPT_CAP {
            if placed >= target_degree {
                break;
            }
            let t = rng.gen_range(config.outer_min..=config.num_sectors);
            if t == s || out_degree(repo, s) >= config.density || out_degree(repo, t) >= config.density {
                continue;
            }
            let forward = Warp { from: s, to: t };
            if repo.warp_exists(forward) {
                continue;
            }
            repo.insert_warp(forward).expect("warp insert");
            placed += 1;

            if !rng.gen_bool(config.p_oneway) {
                let reverse = Warp { from: t, to: s };
                if out_degree(repo, t) < config.density && out_degree(repo, s) < config.density && !repo.warp_exists(reverse) {
                    repo.insert_warp(reverse).expect("reverse warp insert");
                }
            }
        }

        if placed == 0 {
            // Force one edge unconditionally to prevent an orphan sector.
            let t = loop {
                let candidate = rng.gen_range(config.outer_min..=config.num_sectors);
                if candidate != s {
                    break candidate;
                }
            };
            repo.insert_warp(Warp { from: s, to: t }).expect("forced warp insert");
        }
    }
}

/// Step 4: `min_tunnels` disjoint linear paths built from sectors untouched
/// by the random graph pass so far. Each path's edges are only installed
/// once the whole chain is assembled, mirroring the source's nested
/// savepoint that rolls the path back on any conflict.
fn build_tunnels(repo: &dyn Repository, config: &UniverseConfig, rng: &mut StdRng) -> Vec<Vec<u32>> {
    let mut pool: Vec<u32> = (config.outer_min..=config.num_sectors)
        .filter(|id| !repo.is_used_sector(*id))
        .collect();
    pool.shuffle(rng);

    let mut tunnels = Vec::new();
    let mut cursor = 0usize;
    let len = config.min_tunnel_len as usize;

    for _ in 0..config.min_tunnels {
        if cursor + len > pool.len() {
            break;
        }
        let path: Vec<u32> = pool[cursor..cursor + len].to_vec();
        cursor += len;

        for window in path.windows(2) {
            repo.insert_warp(Warp { from: window[0], to: window[1] }).expect("tunnel warp insert");
            repo.insert_warp(Warp { from: window[1], to: window[0] }).expect("tunnel warp insert");
        }
        for id in &path {
            repo.mark_used_sector(*id);
        }
        tunnels.push(path);
    }

    tunnels
}

/// Step 5: tunnels must not leak into the general graph.
fn prune_tunnel_leaks(repo: &dyn Repository) {
    for warp in repo.list_all_warps() {
        if repo.is_used_sector(warp.from) != repo.is_used_sector(warp.to) {
            repo.remove_warp(warp).expect("leaking warp removal");
        }
    }
}

/// Step 3 (enforced here, after tunnels are pruned, per the order-dependency
/// note): at least three edges from `{2..10}` into the outer range.
fn enforce_fedspace_exit(repo: &dyn Repository, config: &UniverseConfig, rng: &mut StdRng) {
    let mut attempts = 0;
    while count_fedspace_exits(repo, config) < FEDSPACE_EXIT_MIN && attempts < ATTEMPT_CAP {
        attempts += 1;
        let s = rng.gen_range(FEDSPACE_MIN..=FEDSPACE_MAX);
        let t = rng.gen_range(config.outer_min..=config.num_sectors);
        if repo.is_used_sector(t) {
            continue;
        }

        let forward = Warp { from: s, to: t };
        if !repo.warp_exists(forward) {
            repo.insert_warp(forward).expect("fedspace exit insert");
        }
        let reverse = Warp { from: t, to: s };
        if !repo.warp_exists(reverse) {
            repo.insert_warp(reverse).expect("fedspace return insert");
        }
    }
}

fn count_fedspace_exits(repo: &dyn Repository, config: &UniverseConfig) -> usize {
    (FEDSPACE_MIN..=FEDSPACE_MAX)
        .flat_map(|s| repo.list_warps_from(s))
        .filter(|w| w.to >= config.outer_min && w.to <= config.num_sectors)
        .count()
}

/// Step 6: non-tunnel sectors beyond FedSpace must have at least one
/// outgoing warp.
fn validate_connectivity(repo: &dyn Repository, config: &UniverseConfig, rng: &mut StdRng) -> Result<usize, UniverseError> {
    let mut repaired = 0usize;
    let candidates: Vec<u32> = repo
        .all_sector_ids()
        .into_iter()
        .filter(|id| *id > 10 && !repo.is_used_sector(*id))
        .collect();

    for id in candidates {
        if !repo.list_warps_from(id).is_empty() {
            continue;
        }

        let mut fixed = false;
        for _ in 0..10 {
            let t = rng.gen_range(config.outer_min..=config.num_sectors);
            if t == id || repo.is_used_sector(t) || out_degree(repo, id) >= config.density || out_degree(repo, t) >= config.density {
                continue;
            }
            repo.insert_warp(Warp { from: id, to: t }).expect("orphan repair warp insert");
            fixed = true;
            repaired += 1;
            break;
        }

        if !fixed && repo.list_warps_from(id).is_empty() {
            return Err(UniverseError::Unreachable { sector_id: id });
        }
    }

    Ok(repaired)
}

/// Step 7: any non-tunnel sector with no directed path back to sector 1
/// gets an edge into a random FedSpace sector.
fn repair_traps(repo: &dyn Repository, rng: &mut StdRng) -> usize {
    let mut repaired = 0usize;
    let candidates: Vec<u32> = repo
        .all_sector_ids()
        .into_iter()
        .filter(|id| *id != 1 && !repo.is_used_sector(*id))
        .collect();

    for id in candidates {
        if can_reach(repo, id, 1) {
            continue;
        }
        let target = rng.gen_range(FEDSPACE_MIN..=FEDSPACE_MAX);
        repo.insert_warp(Warp { from: id, to: target }).expect("trap repair warp insert");
        repaired += 1;
    }

    repaired
}

fn can_reach(repo: &dyn Repository, from: u32, to: u32) -> bool {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(from);
    visited.insert(from);

    while let Some(cur) = queue.pop_front() {
        if cur == to {
            return true;
        }
        for warp in repo.list_warps_from(cur) {
            if visited.insert(warp.to) {
                queue.push_back(warp.to);
            }
        }
    }
    false
}

/// Step 8: a Stardock, `max_ports` ordinary ports, and a Black Market in
/// the Orion cluster (taken here as the first tunnel built, since that's
/// the cluster Orion Hideout is later seeded into).
fn place_ports(repo: &dyn Repository, config: &UniverseConfig, tunnels: &[Vec<u32>], rng: &mut StdRng) -> usize {
    let mut next_port_id = 1u32;
    let mut next_account_id = 1u64;
    let non_tunnel: Vec<u32> = repo.all_sector_ids().into_iter().filter(|id| !repo.is_used_sector(*id)).collect();
    let outer: Vec<u32> = non_tunnel.iter().copied().filter(|id| *id >= config.outer_min).collect();

    let mut created = 0usize;

    if let Some(&stardock_sector) = outer.choose(rng) {
        create_port(repo, &mut next_port_id, &mut next_account_id, stardock_sector, PortType::Stardock, config.port_credits);
        created += 1;
    }

    for _ in 0..config.max_ports {
        if let Some(&sector) = non_tunnel.choose(rng) {
            let kind = PortType::Ordinary(rng.gen_range(1..=8));
            create_port(repo, &mut next_port_id, &mut next_account_id, sector, kind, config.port_credits);
            created += 1;
        }
    }

    if let Some(&sector) = tunnels.first().and_then(|t| t.first()) {
        create_port(repo, &mut next_port_id, &mut next_account_id, sector, PortType::BlackMarket, config.port_credits);
        created += 1;
    }

    created
}

fn create_port(repo: &dyn Repository, next_port_id: &mut u32, next_account_id: &mut u64, sector: u32, kind: PortType, credits: i64) {
    let account_id = *next_account_id;
    *next_account_id += 1;
    repo.insert_bank_account(BankAccount { id: account_id, owner_player_id: None, credits })
        .expect("port bank account insert");

    let port_id = *next_port_id;
    *next_port_id += 1;
    repo.insert_port(Port {
        id: port_id,
        sector_id: sector,
        port_type: kind,
        stock: [credits / 10, credits / 10, credits / 10],
        bank_account: account_id,
    })
    .expect("port insert");
}

/// Step 9: Terra/Ferringhi Homeworld/Orion Hideout seeded into the two
/// longest tunnels (falling back to fixed sectors if tunnels were scarce),
/// then further planets up to `max_planets`.
fn place_planets(repo: &dyn Repository, config: &UniverseConfig, tunnels: &[Vec<u32>], rng: &mut StdRng) -> usize {
    let mut by_length: Vec<&Vec<u32>> = tunnels.iter().collect();
    by_length.sort_by_key(|t| std::cmp::Reverse(t.len()));

    let ferringhi_sector = by_length.first().and_then(|t| t.first()).copied().unwrap_or(2);
    let orion_sector = by_length.get(1).and_then(|t| t.first()).copied().unwrap_or(3);

    repo.insert_planet(Planet { id: 1, sector_id: 1, name: "Terra".to_owned(), owner_player_id: None })
        .expect("terra insert");
    repo.insert_planet(Planet {
        id: 2,
        sector_id: ferringhi_sector,
        name: "Ferringhi Homeworld".to_owned(),
        owner_player_id: None,
    })
    .expect("ferringhi insert");
    repo.insert_planet(Planet { id: 3, sector_id: orion_sector, name: "Orion Hideout".to_owned(), owner_player_id: None })
        .expect("orion insert");

    let mut created = 3usize;
    let non_tunnel: Vec<u32> = repo.all_sector_ids().into_iter().filter(|id| !repo.is_used_sector(*id)).collect();
    let mut next_id = 4u32;

    while created < config.max_planets as usize {
        match non_tunnel.choose(rng) {
            Some(&sector) => {
                repo.insert_planet(Planet { id: next_id, sector_id: sector, name: random_sector_name(rng), owner_player_id: None })
                    .expect("planet insert");
                next_id += 1;
                created += 1;
            }
            None => break,
        }
    }

    created
}

/// Step 10: NPC traders and warships at the three faction homeworlds.
fn place_npc_ships(repo: &dyn Repository) {
    const HOMEWORLDS: [(u32, &str, &str); 3] = [
        (1, "Terran Trader", "Terran Warship"),
        (2, "Ferringhi Trader", "Ferringhi Warship"),
        (3, "Orion Trader", "Orion Warship"),
    ];

    let mut next_ship_id = 1u64;
    let mut next_account_id = 1_000_000u64;

    for (planet_id, trader_name, warship_name) in HOMEWORLDS {
        let sector = repo.get_planet(planet_id).map(|p| p.sector_id).unwrap_or(1);
        for name in [trader_name, warship_name] {
            let account_id = next_account_id;
            next_account_id += 1;
            repo.insert_bank_account(BankAccount { id: account_id, owner_player_id: None, credits: 0 })
                .expect("npc bank account insert");

            let ship_id = next_ship_id;
            next_ship_id += 1;
            repo.insert_ship(Ship {
                id: ship_id,
                owner_player_id: None,
                name: name.to_owned(),
                sector_id: sector,
                hull_points: 100,
                npc_locked: true,
            })
            .expect("npc ship insert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repository::InMemoryRepository;

    fn log() -> Logger {
        flux::logging::test_logger()
    }

    fn small_config() -> UniverseConfig {
        UniverseConfig {
            num_sectors: 150,
            ..UniverseConfig::default()
        }
    }

    #[test]
    fn invariants_hold_for_a_representative_universe() {
        let repo = InMemoryRepository::new();
        let config = UniverseConfig { num_sectors: 500, density: 4, ..UniverseConfig::default() };
        generate(&repo, &config, 1, &log()).unwrap();

        // (a) every non-tunnel sector id > 10 has >= 1 outgoing warp.
        for id in repo.all_sector_ids() {
            if id > 10 && !repo.is_used_sector(id) {
                assert!(!repo.list_warps_from(id).is_empty(), "sector {} has no outgoing warp", id);
            }
        }

        // (b) >= 3 edges from {2..10} into [11..500].
        assert!(count_fedspace_exits(&repo, &config) >= FEDSPACE_EXIT_MIN);

        // (c) no edge has equal endpoints.
        for warp in repo.list_all_warps() {
            assert_ne!(warp.from, warp.to);
        }

        // (d) no edge crosses the tunnel boundary.
        for warp in repo.list_all_warps() {
            assert_eq!(repo.is_used_sector(warp.from), repo.is_used_sector(warp.to));
        }

        // (e) at least `min_tunnels` tunnels of length >= `min_tunnel_len`.
        let used: Vec<u32> = repo.all_sector_ids().into_iter().filter(|id| repo.is_used_sector(*id)).collect();
        assert!(used.len() as u32 >= config.min_tunnels * config.min_tunnel_len);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let repo_a = InMemoryRepository::new();
        let repo_b = InMemoryRepository::new();
        let config = small_config();

        generate(&repo_a, &config, 42, &log()).unwrap();
        generate(&repo_b, &config, 42, &log()).unwrap();

        let mut warps_a: Vec<Warp> = repo_a.list_all_warps();
        let mut warps_b: Vec<Warp> = repo_b.list_all_warps();
        warps_a.sort_by_key(|w| (w.from, w.to));
        warps_b.sort_by_key(|w| (w.from, w.to));
        assert_eq!(warps_a, warps_b);
    }

    #[test]
    fn seeds_terra_ferringhi_orion_planets() {
        let repo = InMemoryRepository::new();
        generate(&repo, &small_config(), 7, &log()).unwrap();

        assert_eq!(repo.get_planet(1).unwrap().name, "Terra");
        assert_eq!(repo.get_planet(1).unwrap().sector_id, 1);
        assert_eq!(repo.get_planet(2).unwrap().name, "Ferringhi Homeworld");
        assert_eq!(repo.get_planet(3).unwrap().name, "Orion Hideout");
    }

    #[test]
    fn creates_a_stardock_and_ordinary_ports() {
        let repo = InMemoryRepository::new();
        generate(&repo, &small_config(), 3, &log()).unwrap();

        let ports = repo.list_ports();
        assert!(ports.iter().any(|p| matches!(p.port_type, PortType::Stardock)));
        assert!(ports.iter().any(|p| matches!(p.port_type, PortType::Ordinary(_))));
    }

    #[test]
    fn npc_ships_are_locked_and_ownerless() {
        let repo = InMemoryRepository::new();
        generate(&repo, &small_config(), 11, &log()).unwrap();

        for id in 1..=6u64 {
            let ship = repo.get_ship(id).unwrap();
            assert!(ship.npc_locked);
            assert_eq!(ship.owner_player_id, None);
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use repository::InMemoryRepository;

    proptest! {
        #[test]
        fn no_self_loops_or_tunnel_leaks_for_any_seed(seed in 0u64..1000) {
            let repo = InMemoryRepository::new();
            let config = UniverseConfig { num_sectors: 120, density: 3, min_tunnels: 2, min_tunnel_len: 3, ..UniverseConfig::default() };
            let log = flux::logging::test_logger();

            generate(&repo, &config, seed, &log).unwrap();

            for warp in repo.list_all_warps() {
                prop_assert_ne!(warp.from, warp.to);
                prop_assert_eq!(repo.is_used_sector(warp.from), repo.is_used_sector(warp.to));
            }
        }
    }
}

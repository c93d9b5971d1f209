//! Peer registry and replay-nonce cache (§4.5). Grounded on
//! `original_source/src/db/repo/repo_s2s_peers.c`'s lookup-by-`peer_id`
//! pattern, here backed by a `HashMap` guarded by a mutex rather than a
//! prepared statement, per §5's "writes serialise on a mutex, reads are
//! allowed to race" policy.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct Peer {
    pub peer_id: String,
    pub host: String,
    pub port: u16,
    pub enabled: bool,
    pub shared_key_id: String,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Peer {
    pub fn new(peer_id: impl Into<String>, host: impl Into<String>, port: u16, shared_key_id: impl Into<String>) -> Peer {
        Peer {
            peer_id: peer_id.into(),
            host: host.into(),
            port,
            enabled: true,
            shared_key_id: shared_key_id.into(),
            last_seen_at: None,
            notes: String::new(),
            created_at: Utc::now(),
        }
    }
}

pub struct PeerRegistry {
    peers: Mutex<HashMap<String, Peer>>,
    /// `(peer_id, nonce) -> msg_ts`, the replay-defense cache.
    nonces: Mutex<HashMap<(String, String), i64>>,
}

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        PeerRegistry {
            peers: Mutex::new(HashMap::new()),
            nonces: Mutex::new(HashMap::new()),
        }
    }

    pub fn list(&self) -> Vec<Peer> {
        self.peers.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, peer_id: &str) -> Option<Peer> {
        self.peers.lock().unwrap().get(peer_id).cloned()
    }

    /// Created by SysOp action; deleted only by SysOp (the registry itself
    /// places no further restriction, per §3 "Lifecycles").
    pub fn upsert(&self, peer: Peer) {
        self.peers.lock().unwrap().insert(peer.peer_id.clone(), peer);
    }

    pub fn set_enabled(&self, peer_id: &str, flag: bool) -> bool {
        match self.peers.lock().unwrap().get_mut(peer_id) {
            Some(peer) => {
                peer.enabled = flag;
                true
            }
            None => false,
        }
    }

    pub fn touch_last_seen(&self, peer_id: &str) -> bool {
        match self.peers.lock().unwrap().get_mut(peer_id) {
            Some(peer) => {
                peer.last_seen_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Succeeds (returns `true`) exactly once per `(peer_id, nonce)` within
    /// the retention window; any subsequent insert signals replay and
    /// returns `false`.
    pub fn nonce_check_and_insert(&self, peer_id: &str, nonce: &str, msg_ts: i64) -> bool {
        let key = (peer_id.to_owned(), nonce.to_owned());
        let mut nonces = self.nonces.lock().unwrap();
        if nonces.contains_key(&key) {
            return false;
        }
        nonces.insert(key, msg_ts);
        true
    }

    /// Sweeps nonces older than `age_seconds` relative to `now_secs`.
    pub fn nonce_cleanup(&self, age_seconds: i64, now_secs: i64) {
        self.nonces
            .lock()
            .unwrap()
            .retain(|_, msg_ts| now_secs - *msg_ts < age_seconds);
    }
}

impl Default for PeerRegistry {
    fn default() -> PeerRegistry {
        PeerRegistry::new()
    }
}

/// Default nonce retention window: one hour (§4.5 "default one hour").
pub const DEFAULT_NONCE_WINDOW_SECS: i64 = 3600;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_check_succeeds_exactly_once() {
        let registry = PeerRegistry::new();
        assert!(registry.nonce_check_and_insert("peer-a", "nonce-1", 1000));
        assert!(!registry.nonce_check_and_insert("peer-a", "nonce-1", 1000));
    }

    #[test]
    fn distinct_peers_get_distinct_nonce_space() {
        let registry = PeerRegistry::new();
        assert!(registry.nonce_check_and_insert("peer-a", "nonce-1", 1000));
        assert!(registry.nonce_check_and_insert("peer-b", "nonce-1", 1000));
    }

    #[test]
    fn cleanup_removes_entries_outside_window() {
        let registry = PeerRegistry::new();
        registry.nonce_check_and_insert("peer-a", "old", 0);
        registry.nonce_check_and_insert("peer-a", "fresh", 3500);

        registry.nonce_cleanup(DEFAULT_NONCE_WINDOW_SECS, 3600);

        assert!(registry.nonce_check_and_insert("peer-a", "old", 3600));
        assert!(!registry.nonce_check_and_insert("peer-a", "fresh", 3600));
    }

    #[test]
    fn disabled_peer_is_tracked() {
        let registry = PeerRegistry::new();
        registry.upsert(Peer::new("peer-a", "127.0.0.1", 4321, "k1"));
        assert!(registry.set_enabled("peer-a", false));
        assert!(!registry.get("peer-a").unwrap().enabled);
    }
}

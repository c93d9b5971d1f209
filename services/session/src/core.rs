//! Shared server-wide state: the connection set, the idempotency cache,
//! and the schema registry (§4.3, §4.6). One `AppContext` is built in
//! `main` and `Arc`-cloned into every connection task and the S2S
//! listener, replacing any global/`static mut` state (§9 "Global process
//! state").

use repository::InMemoryRepository;
use serde_json::Value;
use slog::Logger;
use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use transport::{PeerRegistry, SchemaRegistry};

use crate::response::ResponseIds;

/// A connected client's socket handle, kept around only so `broadcast` can
/// reach every open connection (§4.6 "Broadcasts").
pub struct ConnectionHandle {
    writer: Mutex<TcpStream>,
}

impl ConnectionHandle {
    pub fn new(stream: TcpStream) -> ConnectionHandle {
        ConnectionHandle { writer: Mutex::new(stream) }
    }

    pub fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

pub struct AppContext {
    pub repo: Arc<InMemoryRepository>,
    pub keys: Arc<keyring::Keyring>,
    pub peers: Arc<PeerRegistry>,
    pub schemas: Arc<SchemaRegistry>,
    pub idempotency: Mutex<HashMap<String, Value>>,
    pub response_ids: ResponseIds,
    pub connections: Mutex<HashMap<u64, Arc<ConnectionHandle>>>,
    next_conn_id: AtomicU64,
    pub log: Logger,
}

impl AppContext {
    pub fn new(repo: InMemoryRepository, keys: keyring::Keyring, log: Logger) -> AppContext {
        AppContext {
            repo: Arc::new(repo),
            keys: Arc::new(keys),
            peers: Arc::new(PeerRegistry::new()),
            schemas: Arc::new(crate::pipeline::build_schema_registry()),
            idempotency: Mutex::new(HashMap::new()),
            response_ids: ResponseIds::new(),
            connections: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            log,
        }
    }

    pub fn register_connection(&self, stream: TcpStream) -> (u64, Arc<ConnectionHandle>) {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(ConnectionHandle::new(stream));
        self.connections.lock().unwrap().insert(id, handle.clone());
        (id, handle)
    }

    pub fn deregister_connection(&self, id: u64) {
        self.connections.lock().unwrap().remove(&id);
    }

    /// Iterates current connections and writes `line` to each; mutation of
    /// the connection set is guarded by the same mutex used for lookups, so
    /// `broadcast` never races a concurrent register/deregister (§4.6).
    pub fn broadcast(&self, line: &str) {
        let conns: Vec<Arc<ConnectionHandle>> = self.connections.lock().unwrap().values().cloned().collect();
        for conn in conns {
            if let Err(e) = conn.write_line(line) {
                slog::debug!(self.log, "broadcast write failed"; "error" => %e);
            }
        }
    }

    pub fn cached_response(&self, idempotency_key: &str) -> Option<Value> {
        self.idempotency.lock().unwrap().get(idempotency_key).cloned()
    }

    pub fn cache_response(&self, idempotency_key: String, response: Value) {
        self.idempotency.lock().unwrap().insert(idempotency_key, response);
    }
}

/// What authentication gate a connection has passed (§4.6 step 3).
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub player_id: Option<u64>,
    pub is_sysop: bool,
}

impl AuthContext {
    pub fn is_authenticated(&self) -> bool {
        self.player_id.is_some()
    }
}

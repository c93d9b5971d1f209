//! In-memory HMAC keyring for the S2S link (§4.1).
//!
//! Holds up to [`Keyring::MAX_KEYS`] named keys. `install_default_from_db`
//! seeds the ring from whatever the repository persisted; `install_from_env`
//! lets `S2S_KEY_ID`/`S2S_KEY_B64` override it, which is how operators roll
//! a key without a database migration. If neither source yields an active
//! key, `install_default_from_db` falls back to a one-shot placeholder so a
//! fresh install still boots.

use chrono::{DateTime, Utc};
use flux::crypto::{self, KeyDecodeError};
use slog::Logger;
use std::collections::HashMap;
use std::env;
use std::sync::RwLock;

/// A single named HMAC key as held in memory.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    pub key_id: String,
    pub key: Vec<u8>,
    pub installed_at: DateTime<Utc>,
    pub active: bool,
}

/// A row as read back from the repository's key table: `(key_id, key_b64,
/// active)`. The keyring crate takes these as plain tuples rather than
/// depending on the repository crate directly, since installing keys is
/// orthogonal to how they were persisted.
pub type DbKeyRow = (String, String, bool);

#[derive(Debug, Eq, PartialEq)]
pub enum KeyringError {
    /// Neither the database rows nor the environment yielded an active key,
    /// and the one-shot placeholder generator's retry also failed. Fatal to
    /// any component that needs the transport.
    NoKeyAvailable,
    /// `S2S_KEY_B64` was set but did not decode as strict base64.
    BadEnvKey(KeyDecodeError),
}

pub struct Keyring {
    entries: RwLock<HashMap<String, KeyEntry>>,
    default_key_id: RwLock<Option<String>>,
}

impl Keyring {
    /// Maximum number of named keys the ring holds at once (§3 "Keyring
    /// entry").
    pub const MAX_KEYS: usize = 8;

    /// Fixed placeholder key id inserted when no other key is available,
    /// matching `s2s_keyring.c`'s one-shot generator so a fresh database
    /// boots with the exact same bytes the reference implementation does.
    pub const GENERATED_PLACEHOLDER_KEY_ID: &'static str = "default_auto_gen_1";
    pub const GENERATED_PLACEHOLDER_KEY_B64: &'static str =
        "MTIzNDU2Nzg5MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTI=";

    pub fn new() -> Keyring {
        Keyring {
            entries: RwLock::new(HashMap::with_capacity(Self::MAX_KEYS)),
            default_key_id: RwLock::new(None),
        }
    }

    /// Seeds the ring from repository rows. The first row marked `active`
    /// becomes the default sender key. If no row is active (including the
    /// case of an empty `rows`), generates the fixed placeholder key,
    /// retries once, and fails fatally if that too comes up empty.
    pub fn install_default_from_db(
        &self,
        rows: impl IntoIterator<Item = DbKeyRow>,
        log: &Logger,
    ) -> Result<(), KeyringError> {
        for (key_id, key_b64, active) in rows {
            match crypto::decode_key_b64(&key_b64) {
                Ok(key) => self.insert(key_id, key, active),
                Err(e) => {
                    slog::warn!(log, "discarding malformed keyring row"; "key_id" => %key_id, "error" => ?e);
                }
            }
        }

        if self.default_key_id.read().unwrap().is_some() {
            return Ok(());
        }

        // One-shot retry: insert the placeholder and check again.
        self.insert(
            Self::GENERATED_PLACEHOLDER_KEY_ID.to_owned(),
            crypto::decode_key_b64(Self::GENERATED_PLACEHOLDER_KEY_B64)
                .expect("placeholder literal is valid base64"),
            true,
        );

        if self.default_key_id.read().unwrap().is_some() {
            slog::warn!(log, "no active keyring entry found, installed generated placeholder";
                "key_id" => Self::GENERATED_PLACEHOLDER_KEY_ID);
            Ok(())
        } else {
            Err(KeyringError::NoKeyAvailable)
        }
    }

    /// Overrides (or adds) a key from `S2S_KEY_ID`/`S2S_KEY_B64`, making it
    /// the default sender key. A no-op if neither variable is set.
    pub fn install_from_env(&self, log: &Logger) -> Result<(), KeyringError> {
        let key_id = match env::var("S2S_KEY_ID") {
            Ok(v) => v,
            Err(_) => return Ok(()),
        };
        let key_b64 = env::var("S2S_KEY_B64").unwrap_or_default();

        let key = crypto::decode_key_b64(&key_b64).map_err(KeyringError::BadEnvKey)?;

        slog::info!(log, "installing keyring entry from environment"; "key_id" => %key_id);
        self.insert(key_id, key, true);
        Ok(())
    }

    /// Looks up a key by id, for verifying an inbound envelope's signature.
    pub fn lookup(&self, key_id: &str) -> Option<Vec<u8>> {
        self.entries.read().unwrap().get(key_id).map(|e| e.key.clone())
    }

    /// Returns the `(key_id, key)` this process should sign outbound
    /// envelopes with.
    pub fn default_sender_key(&self) -> Option<(String, Vec<u8>)> {
        let default_id = self.default_key_id.read().unwrap().clone()?;
        self.lookup(&default_id).map(|key| (default_id, key))
    }

    fn insert(&self, key_id: String, key: Vec<u8>, active: bool) {
        let mut entries = self.entries.write().unwrap();
        if entries.len() >= Self::MAX_KEYS && !entries.contains_key(&key_id) {
            return;
        }

        entries.insert(
            key_id.clone(),
            KeyEntry {
                key_id: key_id.clone(),
                key,
                installed_at: Utc::now(),
                active,
            },
        );
        drop(entries);

        if active {
            *self.default_key_id.write().unwrap() = Some(key_id);
        }
    }
}

impl Default for Keyring {
    fn default() -> Keyring {
        Keyring::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> Logger {
        flux::logging::test_logger()
    }

    #[test]
    fn installs_first_active_db_row_as_default() {
        let ring = Keyring::new();
        let rows = vec![
            ("k1".to_owned(), base64::encode(b"0123456789012345"), false),
            ("k2".to_owned(), base64::encode(b"9876543210987654"), true),
        ];
        ring.install_default_from_db(rows, &log()).unwrap();

        let (key_id, _) = ring.default_sender_key().unwrap();
        assert_eq!(key_id, "k2");
        assert!(ring.lookup("k1").is_some());
    }

    #[test]
    fn falls_back_to_generated_placeholder_when_db_empty() {
        let ring = Keyring::new();
        ring.install_default_from_db(Vec::new(), &log()).unwrap();

        let (key_id, key) = ring.default_sender_key().unwrap();
        assert_eq!(key_id, Keyring::GENERATED_PLACEHOLDER_KEY_ID);
        assert_eq!(
            key,
            crypto::decode_key_b64(Keyring::GENERATED_PLACEHOLDER_KEY_B64).unwrap()
        );
    }

    #[test]
    fn env_override_wins_over_db_default() {
        let ring = Keyring::new();
        ring.install_default_from_db(
            vec![("db-key".to_owned(), base64::encode(b"0123456789012345"), true)],
            &log(),
        )
        .unwrap();

        std::env::set_var("S2S_KEY_ID", "env-key");
        std::env::set_var("S2S_KEY_B64", base64::encode(b"abcdefghijklmnop"));
        ring.install_from_env(&log()).unwrap();
        std::env::remove_var("S2S_KEY_ID");
        std::env::remove_var("S2S_KEY_B64");

        let (key_id, _) = ring.default_sender_key().unwrap();
        assert_eq!(key_id, "env-key");
        assert!(ring.lookup("db-key").is_some());
    }

    #[test]
    fn caps_at_max_keys() {
        let ring = Keyring::new();
        let rows = (0..Keyring::MAX_KEYS + 3).map(|i| {
            (
                format!("k{}", i),
                base64::encode(format!("{:016}", i).as_bytes()),
                i == 0,
            )
        });
        ring.install_default_from_db(rows, &log()).unwrap();

        assert_eq!(ring.entries.read().unwrap().len(), Keyring::MAX_KEYS);
    }
}

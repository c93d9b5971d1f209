//! `[engine]`/`[server]` sections of `twclone.toml` as seen by the Engine
//! process (§6.1). Mirrors `gamecore::config::GameConfig`'s `Default` +
//! `load<P: AsRef<Path>>` pattern; only the sections this binary reads are
//! declared here; unrecognised top-level keys (e.g. the Session Server's own
//! `[server.client_address]`) are ignored by `serde`, not rejected, since
//! both binaries parse the same file.

use consumer::ConsumerConfig;
use serde_derive::{Deserialize, Serialize};
use serdeconv;
use std::path::Path;
use universe::UniverseConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    pub tick_interval_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for EngineSection {
    fn default() -> EngineSection {
        EngineSection { tick_interval_ms: 250, shutdown_grace_ms: 2000 }
    }
}

/// The address the Engine dials to reach the Session Server's S2S listener
/// (§4.2 "Client connect", §6 "default port 4321 on loopback").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_s2s_address")]
    pub s2s_address: String,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: u32,
}

fn default_s2s_address() -> String {
    "127.0.0.1:4321".to_owned()
}

fn default_max_frame_bytes() -> u32 {
    transport::frame::DEFAULT_MAX_FRAME_BYTES
}

impl Default for ServerSection {
    fn default() -> ServerSection {
        ServerSection { s2s_address: default_s2s_address(), max_frame_bytes: default_max_frame_bytes() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub universe: UniverseConfig,
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> EngineConfig {
        serdeconv::from_toml_file(path).expect("Error loading engine configuration file")
    }
}

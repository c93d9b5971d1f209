//! `[server]` section of `twclone.toml` as seen by the Session Server
//! (§6.1). Mirrors `gamecore::config::GameConfig`'s `Default` + `load`
//! pattern; the Engine process parses the same file and reads only the
//! sub-fields it needs, `serde` ignoring the rest.

use serde_derive::{Deserialize, Serialize};
use serdeconv;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_client_address")]
    pub client_address: String,
    #[serde(default = "default_s2s_address")]
    pub s2s_address: String,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: u32,
}

fn default_client_address() -> String {
    "0.0.0.0:2002".to_owned()
}

fn default_s2s_address() -> String {
    "127.0.0.1:4321".to_owned()
}

fn default_max_frame_bytes() -> u32 {
    transport::frame::DEFAULT_MAX_FRAME_BYTES
}

impl Default for ServerSection {
    fn default() -> ServerSection {
        ServerSection {
            client_address: default_client_address(),
            s2s_address: default_s2s_address(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

/// Not part of `twclone.toml` in §6.1 (which only specifies the runtime's
/// own address/port/key/tick surface); this section is this binary's
/// own concern of how to find and launch its Engine child, the same way
/// `gamerunner` needs a config path on its own command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSpawnSection {
    #[serde(default = "default_engine_binary")]
    pub binary_path: String,
    #[serde(default = "default_engine_config")]
    pub config_path: String,
}

fn default_engine_binary() -> String {
    "engine-runner".to_owned()
}

fn default_engine_config() -> String {
    "./twclone.toml".to_owned()
}

impl Default for EngineSpawnSection {
    fn default() -> EngineSpawnSection {
        EngineSpawnSection {
            binary_path: default_engine_binary(),
            config_path: default_engine_config(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub engine_spawn: EngineSpawnSection,
}

impl SessionConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> SessionConfig {
        serdeconv::from_toml_file(path).expect("Error loading session configuration file")
    }
}

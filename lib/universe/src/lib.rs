//! Universe generation (§4.7): builds an initial sector graph, tunnels,
//! ports, planets, and NPC ships against the Repository Interface.

pub mod config;
pub mod generator;
pub mod namegen;

pub use config::UniverseConfig;
pub use generator::{generate, GenerationReport, UniverseError};

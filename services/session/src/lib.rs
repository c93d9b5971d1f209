//! The Session Server's library half (§2, §4.6): shared application state,
//! the RPC pipeline, response shaping, and the S2S listener. `main.rs` is
//! the thin entry point that wires this to a config file and a spawned
//! Engine child process.

pub mod codes;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod response;
pub mod s2s;

pub use config::SessionConfig;
pub use core::{AppContext, AuthContext};

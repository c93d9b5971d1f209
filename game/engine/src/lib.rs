//! The Engine process's library half (§2, §4.8): configuration, the cron
//! table, and the tick scheduler that ties the event consumer to an
//! outbound S2S client. The `engine-runner` binary (`game/runner`) is the
//! thin `main.rs` that wires this up to a config file, a shutdown pipe, and
//! process exit codes — mirroring the teacher's `gamecore`/`gamerunner`
//! split.

pub mod config;
pub mod cron;
pub mod scheduler;

pub use config::EngineConfig;
pub use cron::{CronJob, CronTable};
pub use scheduler::{ExitReason, Scheduler, Store, TickReport, S2STarget};

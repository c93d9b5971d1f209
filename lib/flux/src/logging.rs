//! Structured logging shared by every binary in the workspace.
//!
//! Callers write `logging::info!(log, "message"; "key" => value)` exactly as
//! they would with `slog` directly; this module centralises the choice of
//! backend (terminal vs. discard) behind one `init` entry point, the way
//! `flux::logging` always intended to but never finished wiring up.

pub use slog::{debug, error, info, o, trace, warn, Discard, Drain, Logger};

use sloggers::{Build, Config, LoggerConfig};

/// Build the root logger for a component from a `[logging]` TOML fragment,
/// e.g.
///
/// ```toml
/// type = "terminal"
/// level = "debug"
/// destination = "stderr"
/// ```
///
/// Falls back to a discarding logger if the fragment is absent or malformed,
/// since a process should never fail to start over a bad log config.
pub fn init(toml_fragment: &str, component: &'static str) -> Logger {
    let base = match serdeconv::from_toml_str::<LoggerConfig>(toml_fragment) {
        Ok(cfg) => match cfg.build_logger() {
            Ok(logger) => logger,
            Err(_) => Logger::root(Discard, o!()),
        },
        Err(_) => Logger::root(Discard, o!()),
    };

    base.new(o!("component" => component))
}

/// Default terminal configuration, used when no `[logging]` section is
/// present in the process config file.
pub const DEFAULT_TERMINAL_CONFIG: &str = r#"
type = "terminal"
level = "info"
destination = "stderr"
"#;

/// A logger that discards everything, for tests that don't want to wire up a
/// real sink.
pub fn test_logger() -> Logger {
    Logger::root(Discard, o!())
}

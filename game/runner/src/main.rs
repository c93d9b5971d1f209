//! `engine-runner`: the Engine process's `main.rs` (§2, §4.8). Spawned by
//! the Session Server with its stdin piped; the Session Server dropping
//! that pipe's write end is this process's shutdown signal.
//!
//! *(Expansion note, grounded on `original_source/src/engine_main.c`: that
//! binary takes a config path and a database handle, installs the keyring,
//! opens a self-pipe, and loops until it's readable. We restore the same
//! startup sequence; the self-pipe becomes a dedicated stdin-reader thread
//! feeding an `mpsc` channel, since a literal `pipe(2)` fd has no portable
//! Rust equivalent without an extra platform-specific dependency the
//! teacher's own stack never reaches for.)*

use clap::{App, Arg};
use consumer::{handlers, EventConsumer};
use engine::{CronJob, CronTable, EngineConfig, ExitReason, S2STarget, Scheduler};
use flux::logging;
use repository::{InMemoryRepository, Repository};
use std::io::Read;
use std::sync::mpsc;
use std::time::Duration;

/// How often the heartbeat cron job pushes a `notice.publish` command over
/// S2S (§2 "may open an outbound S2S connection to push commands").
const HEARTBEAT_INTERVAL_SECS: i64 = 30;

fn main() {
    let matches = App::new("Engine Runner")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs the twclone Engine process: event consumer, cron, S2S push.")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Path to twclone.toml")
                .takes_value(true)
                .default_value("./twclone.toml"),
        )
        .get_matches();

    let config_path = matches.value_of("config").unwrap();
    let config = if std::path::Path::new(config_path).exists() {
        EngineConfig::load(config_path)
    } else {
        EngineConfig::default()
    };

    let log = logging::init(logging::DEFAULT_TERMINAL_CONFIG, "engine");
    logging::info!(log, "starting engine"; "config" => config_path);

    let repo = InMemoryRepository::new();
    if repo.all_sector_ids().is_empty() {
        let seed = flux::time::timestamp_secs() ^ (std::process::id() as u64);
        logging::info!(log, "generating universe"; "seed" => seed, "num_sectors" => config.universe.num_sectors);
        if let Err(e) = universe::generate(&repo, &config.universe, seed, &log) {
            logging::error!(log, "universe generation failed"; "error" => %e);
            std::process::exit(2);
        }
    }

    let keys = keyring::Keyring::new();
    if let Err(e) = keys.install_default_from_db(Vec::new(), &log) {
        logging::error!(log, "fatal: no keyring entry available"; "error" => ?e);
        std::process::exit(2);
    }
    if let Err(e) = keys.install_from_env(&log) {
        logging::error!(log, "fatal: S2S_KEY_B64 did not decode"; "error" => ?e);
        std::process::exit(2);
    }

    let mut consumer = EventConsumer::new(config.consumer.clone(), log.new(logging::o!("component" => "consumer")));
    handlers::register_defaults(&mut consumer);

    let now = flux::time::timestamp_secs() as i64;
    let mut cron = CronTable::new();
    cron.register(CronJob::new("world.heartbeat", HEARTBEAT_INTERVAL_SECS, now));

    let target = S2STarget {
        address: config.server.s2s_address.clone(),
        max_frame_bytes: config.server.max_frame_bytes,
        local_id: "engine".to_owned(),
        dst: "session".to_owned(),
        connect_deadline: Duration::from_secs(2),
    };

    let mut scheduler = Scheduler::new(consumer, cron, repo, keys, target, log.new(logging::o!("component" => "scheduler")));

    let (tx, rx) = mpsc::channel::<()>();
    let shutdown_log = log.new(logging::o!("component" => "shutdown-pipe"));
    std::thread::spawn(move || {
        // Blocks until the parent closes its end of our piped stdin (EOF),
        // or any read error occurs; either is the shutdown signal.
        let mut buf = [0u8; 64];
        loop {
            match std::io::stdin().read(&mut buf) {
                Ok(0) => {
                    logging::info!(shutdown_log, "shutdown pipe closed");
                    let _ = tx.send(());
                    return;
                }
                Ok(_) => continue,
                Err(_) => {
                    let _ = tx.send(());
                    return;
                }
            }
        }
    });

    let tick_interval = Duration::from_millis(config.engine.tick_interval_ms);
    match scheduler.run(tick_interval, &rx) {
        ExitReason::Shutdown => {
            logging::info!(log, "engine shutting down");
            std::process::exit(0);
        }
    }
}

//! `session-server`: the Session Server's `main.rs` (§2, §4.6). Spawns the
//! Engine as a child process with a piped stdin — this binary holds the
//! write end of that pipe for the Engine's entire lifetime; it closes
//! (and so signals the Engine to shut down) whenever this process exits.

use clap::{App, Arg};
use flux::logging;
use keyring::Keyring;
use repository::InMemoryRepository;
use session::{pipeline, s2s, AppContext, AuthContext, SessionConfig};
use session::response::Request;
use std::io::BufRead;
use std::net::{TcpListener, TcpStream};
use std::process::{Command, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use transport::Peer;

fn main() {
    let matches = App::new("Session Server")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs the twclone Session Server: client RPC and S2S listeners.")
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
        SessionConfig::load(config_path)
    } else {
        SessionConfig::default()
    };

    let log = logging::init(logging::DEFAULT_TERMINAL_CONFIG, "session");
    logging::info!(log, "starting session server"; "config" => config_path);

    let keys = Keyring::new();
    if let Err(e) = keys.install_default_from_db(Vec::new(), &log) {
        logging::error!(log, "fatal: no keyring entry available"; "error" => ?e);
        std::process::exit(2);
    }
    if let Err(e) = keys.install_from_env(&log) {
        logging::error!(log, "fatal: S2S_KEY_B64 did not decode"; "error" => ?e);
        std::process::exit(2);
    }

    let repo = InMemoryRepository::new();
    let ctx = Arc::new(AppContext::new(repo, keys, log.new(logging::o!("component" => "pipeline"))));

    if let Some((key_id, _)) = ctx.keys.default_sender_key() {
        ctx.peers.upsert(Peer::new("engine", "127.0.0.1", 0, key_id));
    }

    let _engine_child = spawn_engine(&config, &log);

    let running = Arc::new(AtomicBool::new(true));

    let s2s_listener = match TcpListener::bind(&config.server.s2s_address) {
        Ok(listener) => listener,
        Err(e) => {
            logging::error!(log, "fatal: could not bind s2s address"; "address" => %config.server.s2s_address, "error" => %e);
            std::process::exit(2);
        }
    };
    {
        let ctx = ctx.clone();
        let running = running.clone();
        let max_frame_bytes = config.server.max_frame_bytes;
        std::thread::spawn(move || s2s::serve(ctx, s2s_listener, max_frame_bytes, running));
    }

    let client_listener = match TcpListener::bind(&config.server.client_address) {
        Ok(listener) => listener,
        Err(e) => {
            logging::error!(log, "fatal: could not bind client address"; "address" => %config.server.client_address, "error" => %e);
            std::process::exit(2);
        }
    };

    logging::info!(log, "listening for clients"; "address" => %config.server.client_address);
    for stream in client_listener.incoming() {
        match stream {
            Ok(stream) => {
                let ctx = ctx.clone();
                let max_frame_bytes = config.server.max_frame_bytes;
                std::thread::spawn(move || handle_client_connection(ctx, stream, max_frame_bytes));
            }
            Err(e) => {
                logging::warn!(log, "client accept failed"; "error" => %e);
            }
        }
    }
}

fn spawn_engine(config: &SessionConfig, log: &slog::Logger) -> Option<std::process::Child> {
    match Command::new(&config.engine_spawn.binary_path)
        .arg("-c")
        .arg(&config.engine_spawn.config_path)
        .stdin(Stdio::piped())
        .spawn()
    {
        Ok(child) => {
            logging::info!(log, "spawned engine child"; "binary" => %config.engine_spawn.binary_path, "pid" => child.id());
            Some(child)
        }
        Err(e) => {
            logging::warn!(log, "could not spawn engine child, running without it"; "error" => %e);
            None
        }
    }
}

/// Owns one client socket for its lifetime (§4.6, §5 "Each inbound TCP
/// connection owns one task for its lifetime").
fn handle_client_connection(ctx: Arc<AppContext>, stream: TcpStream, max_frame_bytes: u32) {
    let reader_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            slog::warn!(ctx.log, "could not clone client stream"; "error" => %e);
            return;
        }
    };
    let (conn_id, handle) = ctx.register_connection(stream);
    let mut auth = AuthContext::default();
    let mut reader = std::io::BufReader::new(reader_stream);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed.len() as u32 > max_frame_bytes {
                    slog::warn!(ctx.log, "client frame exceeded cap, closing connection"; "conn_id" => conn_id);
                    break;
                }

                let request: Request = match serde_json::from_str(trimmed) {
                    Ok(request) => request,
                    Err(e) => {
                        slog::debug!(ctx.log, "dropping unparseable client line"; "conn_id" => conn_id, "error" => %e);
                        continue;
                    }
                };

                let response = pipeline::dispatch(&ctx, &mut auth, &request);
                match serde_json::to_string(&response) {
                    Ok(line_out) => {
                        if handle.write_line(&line_out).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        slog::warn!(ctx.log, "failed to serialize response"; "error" => %e);
                        break;
                    }
                }
            }
            Err(e) => {
                slog::debug!(ctx.log, "client read failed"; "conn_id" => conn_id, "error" => %e);
                break;
            }
        }
    }

    ctx.deregister_connection(conn_id);
}

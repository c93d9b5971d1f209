//! Generates a fresh HMAC key for the S2S keyring (§4.1), suitable for
//! `S2S_KEY_B64` or for seeding a `s2s_keys` row. Replaces the teacher's
//! game-serial-key generator, which has no counterpart in this workspace.

use clap::{App, Arg};
use flux::crypto;

fn main() {
    let matches = App::new("S2S Key Generator")
        .version("1.0")
        .about("Generates a fresh base64-encoded HMAC-SHA-256 key for the S2S keyring.")
        .arg(
            Arg::with_name("KEY_ID")
                .help("Key id to print alongside the generated key")
                .required(false)
                .default_value("default"),
        )
        .arg(
            Arg::with_name("LENGTH")
                .help("Key length in bytes (<= 64)")
                .short("l")
                .long("length")
                .takes_value(true)
                .default_value("32"),
        )
        .get_matches();

    let key_id = matches.value_of("KEY_ID").unwrap();
    let length: usize = matches
        .value_of("LENGTH")
        .unwrap()
        .parse()
        .expect("length must be a valid integer");

    if length == 0 || length > crypto::MAX_KEY_SIZE {
        eprintln!("length must be in 1..={}", crypto::MAX_KEY_SIZE);
        std::process::exit(2);
    }

    let mut key = vec![0u8; length];
    crypto::random_bytes(&mut key);
    let encoded = base64::encode(&key);

    println!("S2S_KEY_ID={}", key_id);
    println!("S2S_KEY_B64={}", encoded);
}

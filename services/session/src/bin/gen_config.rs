//! Prints a default `twclone.toml`, the config file both `session-server`
//! and `engine-runner` load (§6.1). Grounded on `gamerunner_config`'s own
//! one-liner generator.

use serdeconv;
use session::SessionConfig;

fn main() {
    let config = serdeconv::to_toml_string(&SessionConfig::default()).expect("Failed to generate config file");

    println!("{}", config);
}

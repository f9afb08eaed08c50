//! Log output for the command-line tools
//!
//! Logs go to stderr so stdout only carries the written paths. `RUST_LOG`
//! takes precedence over `--verbose`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// set up tracing for the binary.

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Installs the global subscriber. Errors go to stderr, everything else to stdout.
///
/// `RUST_LOG` wins when set, otherwise production runs log at `info` and
/// everything else at `debug`.
pub fn init(config: &Config) {
    let default_level = if config.is_production() { "info" } else { "debug" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let writer = std::io::stderr
        .with_max_level(Level::ERROR)
        .or_else(std::io::stdout);

    // a second init (tests, embedding) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .try_init();

    tracing::info!("Logging ready at level {default_level} (RUST_LOG overrides).");
}

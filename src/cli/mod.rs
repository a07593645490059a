//! Command-line modes
//!
//! `server` runs the HTTP service; `resolve` performs one resolution and
//! prints what it found.

pub mod resolve;
pub mod server;

use crate::config::{ConfigLoader, Settings};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber
///
/// Precedence: `verbose` (debug), then `RUST_LOG`, then `level`. Logs go to
/// stderr so one-shot output on stdout stays machine readable. Repeated
/// calls keep the first subscriber.
pub fn init_logging(verbose: bool, level: &str) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Load settings from `--config`, `STREAM_PROXY_CONFIG` or the default location
///
/// Runs before logging exists, so problems are reported on stderr and the
/// defaults are used instead.
pub fn load_settings(config: Option<&str>) -> Settings {
    let config_path = match config {
        Some(path) => Some(PathBuf::from(path)),
        None => ConfigLoader::get_config_path(),
    };

    ConfigLoader::new()
        .load(config_path.as_deref())
        .unwrap_or_else(|e| {
            eprintln!(
                "Warning: Failed to load configuration: {}. Using defaults.",
                e
            );
            Settings::default()
        })
}

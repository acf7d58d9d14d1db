//! Logging setup (spec §2a): a single `tracing-subscriber` registry with an
//! `EnvFilter`, built once at startup. Mirrors the teacher's `logging.rs`
//! shape, minus the OTEL layers it wires — this crate's "out of scope"
//! ambient concerns still get real logging, just not a tracing backend.

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins if set; otherwise falls back to `default_level`
/// (normally the config file's `log_level`).
pub fn build_env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Installs the global subscriber. Safe to call once at process start;
/// calling it twice would panic, which is why `main` is the only caller.
pub fn init(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(default_level))
        .with_target(true)
        .init();
}

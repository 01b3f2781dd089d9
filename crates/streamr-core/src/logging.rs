//! Structured logging setup.
//!
//! All crates log through `tracing` macros with structured fields
//! (`session_id`, `channel_id`, `event_id`). The binary installs the global
//! subscriber once at startup.

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` takes precedence over `level` when set. Subsequent calls are
/// no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default is a no-op if already set
    let _ = subscriber.try_init();
}

/// Initialize the global tracing subscriber with JSON lines on stderr.
pub fn init_json_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}

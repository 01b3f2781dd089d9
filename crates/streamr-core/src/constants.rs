//! Protocol defaults and bounds.

/// Package name.
pub const NAME: &str = "streamr";

/// Default number of events retained per session for replay.
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Smallest accepted history size.
pub const MIN_HISTORY_SIZE: usize = 10;

/// Largest accepted history size.
pub const MAX_HISTORY_SIZE: usize = 500;

/// Default client reconnection hint sent in the `retry` field, in milliseconds.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;

/// Default interval between keep-alive comment frames, in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 45_000;

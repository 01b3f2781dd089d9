//! Per-session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HISTORY_SIZE, DEFAULT_RETRY_INTERVAL_MS,
    MAX_HISTORY_SIZE, MIN_HISTORY_SIZE,
};
use crate::errors::{Result, StreamError};
use crate::ids::SessionId;

/// Immutable configuration handed to each session at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Fixed session id; a fresh UUID v7 is generated when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Number of sent events retained for replay (10..=500).
    pub history_size: usize,
    /// Reconnection hint emitted as the `retry` field, in milliseconds.
    pub retry_interval_ms: u64,
    /// Interval between keep-alive comment frames, in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            history_size: DEFAULT_HISTORY_SIZE,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    /// Same configuration bound to a specific session id.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Check every option, returning the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(StreamError::InvalidHeartbeatInterval);
        }
        if self.retry_interval_ms == 0 {
            return Err(StreamError::InvalidRetryInterval);
        }
        if !(MIN_HISTORY_SIZE..=MAX_HISTORY_SIZE).contains(&self.history_size) {
            return Err(StreamError::InvalidHistorySize(self.history_size));
        }
        Ok(())
    }

    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

//! Settings structure.

use serde::{Deserialize, Serialize};
use streamr_core::SessionConfig;
use streamr_core::constants::NAME;

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamrSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Defaults applied to every new event-stream session.
    pub session: SessionConfig,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl Default for StreamrSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: NAME.to_string(),
            server: ServerSettings::default(),
            session: SessionConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl StreamrSettings {
    /// Reject combinations no session could be built from.
    pub fn validate(&self) -> Result<()> {
        self.session
            .validate()
            .map_err(|e| SettingsError::InvalidValue(e.to_string()))?;
        if self.server.outbound_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "outbound buffer must hold at least one frame".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener and per-connection buffering.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` auto-assigns).
    pub port: u16,
    /// Frames buffered per connection before the writer waits for the client to drain.
    pub outbound_buffer: usize,
    /// Closed-session histories retained for reconnects.
    pub archive_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            outbound_buffer: 64,
            archive_capacity: 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

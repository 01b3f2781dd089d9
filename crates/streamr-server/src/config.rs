//! Server configuration.

use serde::{Deserialize, Serialize};
use streamr_core::SessionConfig;
use streamr_settings::StreamrSettings;

/// Configuration for the streamr HTTP server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Frames buffered per connection before delivery waits for the client.
    pub outbound_buffer: usize,
    /// Closed-session histories kept for reconnects.
    pub archive_capacity: usize,
    /// Defaults for every session opened by the server.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            outbound_buffer: 64,
            archive_capacity: 1024,
            session: SessionConfig::default(),
        }
    }
}

impl From<&StreamrSettings> for ServerConfig {
    fn from(settings: &StreamrSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            outbound_buffer: settings.server.outbound_buffer,
            archive_capacity: settings.server.archive_capacity,
            session: settings.session.clone(),
        }
    }
}

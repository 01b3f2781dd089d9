//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server runs.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Channels created so far.
    pub channels: usize,
    /// Sessions registered across all channels.
    pub connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, channels: usize, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        channels,
        connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        assert_eq!(health_check(Instant::now(), 0, 0).status, "ok");
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(start, 0, 0).uptime_secs >= 59);
    }

    #[test]
    fn serializes_counts() {
        let json = serde_json::to_value(health_check(Instant::now(), 2, 7)).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["channels"], 2);
        assert_eq!(json["connections"], 7);
        assert!(json["uptime_secs"].is_u64());
    }
}

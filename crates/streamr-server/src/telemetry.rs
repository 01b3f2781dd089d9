//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder globally.
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Sessions opened (counter).
pub const SSE_SESSIONS_TOTAL: &str = "sse_sessions_total";
/// Sessions currently open (gauge).
pub const SSE_SESSIONS_ACTIVE: &str = "sse_sessions_active";
/// Events accepted for delivery (counter).
pub const SSE_MESSAGES_SENT_TOTAL: &str = "sse_messages_sent_total";
/// Events re-sent from history on resume (counter).
pub const SSE_REPLAYED_EVENTS_TOTAL: &str = "sse_replayed_events_total";
/// Channel broadcasts performed (counter).
pub const SSE_BROADCASTS_TOTAL: &str = "sse_broadcasts_total";
/// Keep-alive frames that could not be written (counter).
pub const SSE_HEARTBEAT_FAILURES_TOTAL: &str = "sse_heartbeat_failures_total";

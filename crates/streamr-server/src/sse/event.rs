//! A single identified event.

use serde::{Deserialize, Serialize};

/// One event emitted by a session.
///
/// Ids are assigned by the owning session and strictly increase for the
/// session's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Position in the session's event sequence.
    pub id: u64,
    /// Payload text, sent as the `data` field.
    pub payload: String,
    /// Optional event type, sent as the `event` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
}

impl Event {
    /// Create an event.
    pub fn new(id: u64, payload: impl Into<String>, event_name: Option<&str>) -> Self {
        Self {
            id,
            payload: payload.into(),
            event_name: event_name.map(str::to_owned),
        }
    }
}

//! Resume hint extraction.
//!
//! A reconnecting client reports the last event id it saw. Browsers send it
//! as the `Last-Event-ID` header; polyfills that cannot set headers use the
//! `evs_last_event_id` or `lastEventId` query parameters. The first non-empty
//! source wins, in that order, and the hint defaults to `"0"`.

use std::collections::HashMap;

use axum::http::HeaderMap;

/// Header carrying the last received event id.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Query parameters consulted when the header is absent.
pub const LAST_EVENT_ID_PARAMS: [&str; 2] = ["evs_last_event_id", "lastEventId"];

/// Resolve the raw resume hint from request headers and query parameters.
pub fn last_event_id(headers: &HeaderMap, query: &HashMap<String, String>) -> String {
    let header = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());
    if let Some(value) = header {
        return value.to_owned();
    }

    LAST_EVENT_ID_PARAMS
        .iter()
        .filter_map(|name| query.get(*name))
        .find(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| "0".to_owned())
}

/// Parse a resume hint as an event id.
///
/// Anything that is not a plain non-negative integer means "no resume".
pub fn parse_resume_id(hint: &str) -> u64 {
    hint.trim().parse().unwrap_or(0)
}

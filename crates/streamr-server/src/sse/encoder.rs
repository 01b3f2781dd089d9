//! Wire frame encoding.
//!
//! A frame is a block of `field:value` lines closed by a blank line. Fields
//! are always written in the order `id`, `event`, `data`, `retry`:
//!
//! ```text
//! id:10
//! event:price-update
//! data:{"symbol":"AAPL","price":245.65}
//! retry:1000
//!
//! ```
//!
//! `event` is omitted when no name (or an empty name) is given and `retry`
//! when no interval is configured.
//!
//! The payload is trimmed first. What is left normally fits one `data`
//! line. A payload that still contains line breaks (`\n`, `\r\n` or `\r`)
//! would end the field early if written raw, so it is split and written as
//! one `data` line per payload line:
//!
//! ```text
//! id:4
//! data:first
//! data:second
//!
//! ```
//!
//! An `EventSource` joins consecutive `data` lines with `\n`, so the client
//! sees the payload with its line breaks normalized to `\n`. Event names get
//! no such treatment; their line breaks are removed.

use std::fmt::Write;

use super::event::Event;

/// Keep-alive frame: a single comment line with no fields.
pub const HEARTBEAT_FRAME: &str = ":\n\n";

/// Encode one event into its wire frame.
pub fn encode_event(event: &Event, retry_ms: Option<u64>) -> String {
    let data = event.payload.trim();
    let mut frame = String::with_capacity(data.len() + 48);

    let _ = writeln!(frame, "id:{}", event.id);

    if let Some(name) = event.event_name.as_deref().map(strip_line_breaks) {
        if !name.is_empty() {
            let _ = writeln!(frame, "event:{name}");
        }
    }

    if data.contains('\r') {
        let normalized = data.replace("\r\n", "\n").replace('\r', "\n");
        write_data_lines(&mut frame, &normalized);
    } else {
        write_data_lines(&mut frame, data);
    }

    if let Some(retry) = retry_ms {
        let _ = writeln!(frame, "retry:{retry}");
    }

    frame.push('\n');
    frame
}

fn write_data_lines(frame: &mut String, data: &str) {
    for line in data.split('\n') {
        let _ = writeln!(frame, "data:{line}");
    }
}

fn strip_line_breaks(name: &str) -> String {
    name.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

//! Server-Sent Events: sessions, replay history, heartbeat, and channel fan-out.
//!
//! - [`session::Session`]: one client's stream with id sequencing and replay
//! - [`history::EventHistory`]: bounded record of recent events
//! - [`channel::ChannelRegistry`]: broadcast to a set of sessions
//! - [`encoder`]: wire frame formatting
//! - [`transport::Transport`]: the seam to the HTTP response

pub mod channel;
pub mod encoder;
pub mod event;
pub mod heartbeat;
pub mod history;
pub mod notifications;
pub mod resume;
pub mod session;
pub mod transport;

pub use channel::ChannelRegistry;
pub use event::Event;
pub use history::EventHistory;
pub use notifications::{ChannelEvent, SessionEvent};
pub use session::{ConnectionState, Session};
pub use transport::{ChannelTransport, FrameStream, Transport};

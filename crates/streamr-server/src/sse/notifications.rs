//! Lifecycle notifications published by sessions and channels.

use streamr_core::{ChannelId, SessionId};

/// Published by a [`Session`](super::session::Session).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// An event was accepted for delivery.
    MessageSent {
        /// Emitting session.
        session_id: SessionId,
        /// Id assigned to the event.
        event_id: u64,
    },
    /// The session was closed.
    Closed {
        /// Closed session.
        session_id: SessionId,
    },
}

/// Published by a [`ChannelRegistry`](super::channel::ChannelRegistry).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A session joined the channel.
    SessionRegistered {
        /// Channel joined.
        channel_id: ChannelId,
        /// Joining session.
        session_id: SessionId,
    },
    /// A session left the channel.
    SessionDeregistered {
        /// Channel left.
        channel_id: ChannelId,
        /// Leaving session.
        session_id: SessionId,
    },
    /// A broadcast completed.
    BroadcastSuccess {
        /// Channel broadcast on.
        channel_id: ChannelId,
        /// Sessions the message was accepted by.
        recipients: usize,
    },
}

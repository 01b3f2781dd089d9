//! Error taxonomy for sessions and channels.
//!
//! Every failure surfaces synchronously at the offending call and falls into
//! one of three kinds (see [`ErrorKind`]):
//!
//! - **Configuration**: invalid heartbeat/retry/history options at session
//!   construction; no session is created.
//! - **State**: sending on a disconnected session, registering a session that
//!   is not connected.
//! - **Argument**: an empty session subset passed to a subset broadcast.
//!
//! Transport closure is a lifecycle transition, never an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ChannelId, SessionId};

/// Classification of a [`StreamError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid construction options.
    Configuration,
    /// Operation not allowed in the current connection state.
    State,
    /// Invalid argument supplied by the caller.
    Argument,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::State => write!(f, "state"),
            Self::Argument => write!(f, "argument"),
        }
    }
}

/// Errors raised by sessions and channel registries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Heartbeat interval was zero.
    #[error("invalid heartbeat interval provided, value must be greater than 0")]
    InvalidHeartbeatInterval,

    /// Retry interval was zero.
    #[error("invalid retry interval provided, value must be greater than 0")]
    InvalidRetryInterval,

    /// History size outside the accepted bounds.
    #[error("invalid history size {0} provided, value must be between 10 and 500")]
    InvalidHistorySize(usize),

    /// Send attempted on a session that is no longer connected.
    #[error("cannot send message, connection not valid (session {session_id})")]
    ConnectionClosed {
        /// The disconnected session.
        session_id: SessionId,
    },

    /// Registration attempted with a session that is not connected.
    #[error(
        "session {session_id} is not active, only active sessions can be registered on channel {channel_id}"
    )]
    InactiveSession {
        /// The rejected session.
        session_id: SessionId,
        /// The channel it was offered to.
        channel_id: ChannelId,
    },

    /// Subset broadcast called with no sessions.
    #[error(
        "sessions list cannot be empty, use broadcast_all to reach every session on channel {channel_id}"
    )]
    EmptySessionList {
        /// The channel the broadcast targeted.
        channel_id: ChannelId,
    },
}

impl StreamError {
    /// Which kind of failure this is.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidHeartbeatInterval
            | Self::InvalidRetryInterval
            | Self::InvalidHistorySize(_) => ErrorKind::Configuration,
            Self::ConnectionClosed { .. } | Self::InactiveSession { .. } => ErrorKind::State,
            Self::EmptySessionList { .. } => ErrorKind::Argument,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidHeartbeatInterval => "INVALID_HEARTBEAT_INTERVAL",
            Self::InvalidRetryInterval => "INVALID_RETRY_INTERVAL",
            Self::InvalidHistorySize(_) => "INVALID_HISTORY_SIZE",
            Self::ConnectionClosed { .. } => "CONNECTION_CLOSED",
            Self::InactiveSession { .. } => "INACTIVE_SESSION",
            Self::EmptySessionList { .. } => "EMPTY_SESSION_LIST",
        }
    }
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

//! # streamr-core
//!
//! Foundation types shared by every streamr crate:
//!
//! - **Ids**: `SessionId`, `ChannelId` newtypes
//! - **Configuration**: [`SessionConfig`], validated at session construction
//! - **Errors**: [`StreamError`] with a Configuration / State / Argument [`ErrorKind`]
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod config;
pub mod constants;
pub mod errors;
pub mod ids;
pub mod logging;

pub use config::SessionConfig;
pub use errors::{ErrorKind, Result, StreamError};
pub use ids::{ChannelId, SessionId};

//! # streamr-server
//!
//! Server-Sent Events delivery with resume, heartbeat, and channel fan-out,
//! plus the Axum HTTP front end that exposes it.
//!
//! - [`sse`]: sessions, histories, channels, wire encoding
//! - [`directory`]: named channels and archived histories for reconnects
//! - [`server`]: `StreamrServer` router and listener
//! - [`telemetry`]: Prometheus recorder and metric names

#![deny(unsafe_code)]

pub mod config;
pub mod directory;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod sse;
pub mod telemetry;

pub use config::ServerConfig;
pub use directory::{ChannelDirectory, HistoryArchive};
pub use server::StreamrServer;
pub use shutdown::{DrainOutcome, ShutdownCoordinator};

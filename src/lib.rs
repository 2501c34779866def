//! Swarm: a pub/sub subscriber stress harness
//!
//! Opens many concurrent subscriber sessions against a pub/sub server over
//! plaintext TCP, TLS or WebSocket, counts the deltas each session receives
//! and reports the average gap between them. A small stress publisher is
//! bundled so a run can be driven end to end.

pub mod client;
pub mod common;
pub mod config;
pub mod constants;
pub mod errors;
pub mod handler;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod transport;

pub use client::ClientManager;
pub use config::Config;
pub use errors::{Result, SwarmError};
pub use publisher::{PublisherConfig, StressPublisher};

//! Metrics collection and reporting for the swarm harness
//!
//! - Per-session message counting and delta timing
//! - Run-wide counters across all sessions
//! - End-of-run summary

pub mod aggregate;
pub mod client;
pub mod reporting;

pub use aggregate::{RunMetrics, TransportTally};
pub use client::{LatencyReport, MessageTimer};

//! Configuration management for the swarm stress harness
//!
//! This module provides a layered approach to configuration:
//! - Core structures and enums
//! - CLI and config-file parsing
//! - Configuration validation
//! - Default value management

pub mod defaults;
pub mod parser;
pub mod validation;

use crate::constants::*;
use crate::errors::Result;
use crate::transport::TransportKind;

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Transport selection strategy for the session pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Plaintext TCP for every session
    #[serde(alias = "client")]
    Net,
    /// TLS over TCP for every session
    Ssl,
    /// WebSocket for every session
    Ws,
    /// Random transport per session
    Mixed,
}

impl TransportMode {
    /// The single transport used by this mode, `None` for mixed
    pub fn fixed(self) -> Option<TransportKind> {
        match self {
            TransportMode::Net => Some(TransportKind::Net),
            TransportMode::Ssl => Some(TransportKind::Ssl),
            TransportMode::Ws => Some(TransportKind::WebSocket),
            TransportMode::Mixed => None,
        }
    }

    /// Whether sessions in this mode may need the TLS context
    pub fn uses_tls(self) -> bool {
        matches!(self, TransportMode::Ssl | TransportMode::Mixed)
    }
}

/// Server endpoint configuration
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub host: String,
    pub net_port: u16,
    pub ssl_port: u16,
    pub http_port: u16,
    pub tls_ca_file: Option<PathBuf>,
}

/// Session pool configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub count: u32,
    pub transport: TransportMode,
    pub connect_timeout: Duration,
    pub creation_delay: bool,
    pub message_handler: Option<String>,
}

/// Per-session test parameters
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub topic: String,
    /// Message quota per session, 0 runs until stopped
    pub max_messages: u64,
}

/// Sizing hints for inbound dispatch (0 keeps the built-in default)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundPoolConfig {
    pub queue_size: usize,
    pub core_threads: usize,
    pub max_threads: usize,
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub verbose: bool,
}

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    pub target: TargetConfig,
    pub client: ClientConfig,
    pub test: TestConfig,
    pub inbound_pool: InboundPoolConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Parse and validate configuration from command line arguments
    pub fn from_args() -> Result<Self> {
        let raw_config = parser::RawConfig::parse_from_args()?;
        let config = raw_config.try_into()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Port serving the given transport
    pub fn port_for(&self, kind: TransportKind) -> u16 {
        match kind {
            TransportKind::Net => self.target.net_port,
            TransportKind::Ssl => self.target.ssl_port,
            TransportKind::WebSocket => self.target.http_port,
        }
    }

    /// Capacity of each session's inbound message queue
    pub fn inbound_queue_size(&self) -> usize {
        non_zero_or(self.inbound_pool.queue_size, DEFAULT_INBOUND_QUEUE_SIZE)
    }

    /// Runtime worker threads driving session delivery
    pub fn worker_threads(&self) -> usize {
        non_zero_or(self.inbound_pool.core_threads, DEFAULT_INBOUND_CORE_THREADS)
    }

    /// Upper bound on runtime blocking threads
    pub fn max_blocking_threads(&self) -> usize {
        non_zero_or(self.inbound_pool.max_threads, DEFAULT_INBOUND_MAX_THREADS)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("🐝 Swarm Stress Test Configuration:");
        println!("   Server:           {}", self.target.host);
        println!(
            "   Ports:            net {} / ssl {} / ws {}",
            self.target.net_port, self.target.ssl_port, self.target.http_port
        );
        println!("   Clients:          {}", self.client.count);
        println!("   Transport:        {:?}", self.client.transport);
        println!("   Topic:            {}", self.test.topic);
        if self.test.max_messages == 0 {
            println!("   Messages:         unbounded (until stopped)");
        } else {
            println!("   Messages:         {} per client", self.test.max_messages);
        }
        println!(
            "   Connect Timeout:  {}s",
            self.client.connect_timeout.as_secs()
        );
        if self.client.creation_delay {
            println!(
                "   Creation Delay:   {}ms every {} clients",
                CREATION_DELAY.as_millis(),
                CREATION_DELAY_EVERY
            );
        }
        if let Some(handler) = &self.client.message_handler {
            println!("   Message Handler:  {}", handler);
        }
        if let Some(ca_file) = &self.target.tls_ca_file {
            println!("   TLS Roots:        {}", ca_file.display());
        }
        println!(
            "   Inbound Pool:     queue {} / core {} / max {}",
            self.inbound_queue_size(),
            self.worker_threads(),
            self.max_blocking_threads()
        );
        println!();
    }
}

fn non_zero_or(value: usize, default: usize) -> usize {
    if value == 0 { default } else { value }
}

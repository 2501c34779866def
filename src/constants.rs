//! Application-wide constants and configuration values

use std::time::Duration;

// Session limits
pub const MAX_CLIENTS_LIMIT: u32 = 10_000;

// Ramp-up staggering: pause after every Nth session when creation delay is on
pub const CREATION_DELAY_EVERY: u32 = 10;
pub const CREATION_DELAY: Duration = Duration::from_millis(500);

// Transport buffer sizes
pub const INPUT_BUFFER_SIZE: usize = 64 * 1024;
pub const COMMAND_BUFFER_SIZE: usize = 16;

// Inbound dispatch defaults (queue capacity per session, runtime threads)
pub const DEFAULT_INBOUND_QUEUE_SIZE: usize = 20;
pub const DEFAULT_INBOUND_CORE_THREADS: usize = 3;
pub const DEFAULT_INBOUND_MAX_THREADS: usize = 10;

// Publisher defaults
pub const DEFAULT_TOPIC: &str = "Stress";
pub const DEFAULT_PUBLISH_FREQUENCY_MS: u64 = 1_000;
pub const PUBLISHER_FANOUT_CAPACITY: usize = 1_024;
pub const CLIENT_FRAME_BUFFER_SIZE: usize = 64;

// Logging cadence
pub const DEBUG_LOG_INTERVAL: u64 = 100;

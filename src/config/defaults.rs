//! Default values and configuration presets

use super::{
    ClientConfig, Config, InboundPoolConfig, OutputConfig, TargetConfig, TestConfig,
    TransportMode,
};
use crate::constants::*;
use std::time::Duration;

/// Default configuration values
pub struct Defaults;

impl Defaults {
    pub const CLIENT_COUNT: u32 = 10;
    pub const TRANSPORT: TransportMode = TransportMode::Net;
    pub const HOST: &'static str = "localhost";
    pub const NET_PORT: u16 = 8080;
    pub const SSL_PORT: u16 = 8443;
    pub const HTTP_PORT: u16 = 8090;
    pub const TOPIC: &'static str = DEFAULT_TOPIC;
    pub const CONNECT_TIMEOUT_SECONDS: u64 = 30;
    pub const INBOUND_QUEUE_SIZE: usize = DEFAULT_INBOUND_QUEUE_SIZE;
    pub const INBOUND_CORE_THREADS: usize = DEFAULT_INBOUND_CORE_THREADS;
    pub const INBOUND_MAX_THREADS: usize = DEFAULT_INBOUND_MAX_THREADS;
}

impl Config {
    /// Configuration targeting a local server with default ports
    pub fn local(transport: TransportMode, clients: u32, max_messages: u64) -> Self {
        Self {
            target: TargetConfig {
                host: Defaults::HOST.to_string(),
                net_port: Defaults::NET_PORT,
                ssl_port: Defaults::SSL_PORT,
                http_port: Defaults::HTTP_PORT,
                tls_ca_file: None,
            },
            client: ClientConfig {
                count: clients,
                transport,
                connect_timeout: Duration::from_secs(Defaults::CONNECT_TIMEOUT_SECONDS),
                creation_delay: false,
                message_handler: None,
            },
            test: TestConfig {
                topic: Defaults::TOPIC.to_string(),
                max_messages,
            },
            inbound_pool: InboundPoolConfig {
                queue_size: Defaults::INBOUND_QUEUE_SIZE,
                core_threads: Defaults::INBOUND_CORE_THREADS,
                max_threads: Defaults::INBOUND_MAX_THREADS,
            },
            output: OutputConfig { verbose: false },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportKind;

    #[test]
    fn test_local_config() {
        let config = Config::local(TransportMode::Mixed, 30, 5);
        assert_eq!(config.client.count, 30);
        assert_eq!(config.test.max_messages, 5);
        assert_eq!(config.port_for(TransportKind::Net), Defaults::NET_PORT);
        assert_eq!(config.port_for(TransportKind::Ssl), Defaults::SSL_PORT);
        assert_eq!(config.port_for(TransportKind::WebSocket), Defaults::HTTP_PORT);
    }

    #[test]
    fn test_zero_pool_hints_fall_back() {
        let mut config = Config::local(TransportMode::Net, 1, 0);
        config.inbound_pool = InboundPoolConfig {
            queue_size: 0,
            core_threads: 0,
            max_threads: 0,
        };
        assert_eq!(config.inbound_queue_size(), DEFAULT_INBOUND_QUEUE_SIZE);
        assert_eq!(config.worker_threads(), DEFAULT_INBOUND_CORE_THREADS);
        assert_eq!(config.max_blocking_threads(), DEFAULT_INBOUND_MAX_THREADS);
    }
}

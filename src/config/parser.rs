//! Command-line and config-file parsing for swarm configuration
//!
//! Values given on the command line win over values from the `--config`
//! file, which win over the built-in defaults.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::defaults::Defaults;
use super::{
    ClientConfig, Config, InboundPoolConfig, OutputConfig, TargetConfig, TestConfig,
    TransportMode,
};
use crate::errors::{ErrorContext, Result, SwarmError};

/// Transport selection strategy for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportModeArg {
    /// Plaintext TCP sessions
    #[value(alias = "client")]
    Net,
    /// TLS sessions
    Ssl,
    /// WebSocket sessions
    Ws,
    /// Random transport per session
    Mixed,
}

impl From<TransportModeArg> for TransportMode {
    fn from(arg: TransportModeArg) -> Self {
        match arg {
            TransportModeArg::Net => TransportMode::Net,
            TransportModeArg::Ssl => TransportMode::Ssl,
            TransportModeArg::Ws => TransportMode::Ws,
            TransportModeArg::Mixed => TransportMode::Mixed,
        }
    }
}

/// Raw configuration from command line arguments
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "swarm",
    version,
    about = "Opens many concurrent subscriber sessions against a pub/sub server and reports per-session delta latency",
    long_about = None
)]
pub struct RawConfig {
    /// Optional TOML file with the same keys as the flags below
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'c',
        long = "clients",
        value_name = "COUNT",
        help = "Number of sessions to spawn [default: 10]"
    )]
    pub clients: Option<u32>,

    #[arg(
        short = 'T',
        long = "transport",
        value_enum,
        help = "Transport for every session, or 'mixed' to pick one at random per session [default: net]"
    )]
    pub transport: Option<TransportModeArg>,

    #[arg(
        short = 'H',
        long = "host",
        value_name = "HOST",
        help = "Server host [default: localhost]"
    )]
    pub host: Option<String>,

    #[arg(long = "net-port", value_name = "PORT", help = "Plaintext TCP port [default: 8080]")]
    pub net_port: Option<u16>,

    #[arg(long = "ssl-port", value_name = "PORT", help = "TLS port [default: 8443]")]
    pub ssl_port: Option<u16>,

    #[arg(long = "http-port", value_name = "PORT", help = "WebSocket port [default: 8090]")]
    pub http_port: Option<u16>,

    #[arg(
        short = 'n',
        long = "messages",
        value_name = "COUNT",
        help = "Delta messages each session receives before closing (0 = run until stopped) [default: 0]"
    )]
    pub messages: Option<u64>,

    #[arg(
        short = 't',
        long = "topic",
        value_name = "TOPIC",
        help = "Topic every session subscribes to [default: Stress]"
    )]
    pub topic: Option<String>,

    #[arg(
        long = "message-handler",
        value_name = "NAME",
        help = "Message handler attached to every session (log, sequence, payload-size)"
    )]
    pub message_handler: Option<String>,

    #[arg(
        long = "creation-delay",
        help = "Pause briefly after every 10th session to soften the connection storm"
    )]
    pub creation_delay: bool,

    #[arg(
        long = "connect-timeout",
        value_name = "DURATION",
        help = "Bound on connect and subscribe per session (e.g. '30s', '2m') [default: 30s]"
    )]
    pub connect_timeout: Option<String>,

    #[arg(
        long = "tls-ca-file",
        value_name = "PEM",
        help = "PEM file with trusted roots for SSL sessions (defaults to the webpki roots)"
    )]
    pub tls_ca_file: Option<PathBuf>,

    #[arg(long = "inbound-queue-size", value_name = "COUNT")]
    pub inbound_queue_size: Option<usize>,

    #[arg(long = "inbound-core-threads", value_name = "COUNT")]
    pub inbound_core_threads: Option<usize>,

    #[arg(long = "inbound-max-threads", value_name = "COUNT")]
    pub inbound_max_threads: Option<usize>,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose logging")]
    pub verbose: bool,
}

/// Shape of the optional TOML config file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub clients: Option<u32>,
    pub transport: Option<TransportMode>,
    pub host: Option<String>,
    pub net_port: Option<u16>,
    pub ssl_port: Option<u16>,
    pub http_port: Option<u16>,
    pub messages: Option<u64>,
    pub topic: Option<String>,
    pub message_handler: Option<String>,
    pub creation_delay: Option<bool>,
    pub connect_timeout: Option<String>,
    pub tls_ca_file: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub inbound_pool: FileInboundPool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileInboundPool {
    pub queue_size: Option<usize>,
    pub core_threads: Option<usize>,
    pub max_threads: Option<usize>,
}

impl FileConfig {
    /// Load and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_config_context(&format!("Cannot read config file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl RawConfig {
    /// Parse from command line arguments
    pub fn parse_from_args() -> Result<Self> {
        Ok(Self::parse())
    }

    /// Parse duration string with time suffixes (s/m/h)
    fn parse_duration(duration_str: &str) -> Result<Duration> {
        let duration_str = duration_str.trim();
        if duration_str.is_empty() {
            return Err(SwarmError::config("Duration cannot be empty"));
        }

        let (number_part, multiplier) = match duration_str.chars().last() {
            Some('s' | 'S') => (&duration_str[..duration_str.len() - 1], 1),
            Some('m' | 'M') => (&duration_str[..duration_str.len() - 1], 60),
            Some('h' | 'H') => (&duration_str[..duration_str.len() - 1], 3600),
            _ => (duration_str, 1),
        };

        let value = number_part.parse::<u64>().map_err(|_| {
            SwarmError::config(format!(
                "Invalid duration format: '{}' - expected a number with optional s/m/h suffix",
                duration_str
            ))
        })?;
        Ok(Duration::from_secs(value * multiplier))
    }

    /// Merge these CLI values over a parsed config file
    pub fn merge(self, file: FileConfig) -> Result<Config> {
        let connect_timeout = match self.connect_timeout.or(file.connect_timeout) {
            Some(text) => Self::parse_duration(&text)?,
            None => Duration::from_secs(Defaults::CONNECT_TIMEOUT_SECONDS),
        };

        let transport = self
            .transport
            .map(TransportMode::from)
            .or(file.transport)
            .unwrap_or(Defaults::TRANSPORT);

        let message_handler = self
            .message_handler
            .or(file.message_handler)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(Config {
            target: TargetConfig {
                host: self
                    .host
                    .or(file.host)
                    .unwrap_or_else(|| Defaults::HOST.to_string()),
                net_port: self.net_port.or(file.net_port).unwrap_or(Defaults::NET_PORT),
                ssl_port: self.ssl_port.or(file.ssl_port).unwrap_or(Defaults::SSL_PORT),
                http_port: self.http_port.or(file.http_port).unwrap_or(Defaults::HTTP_PORT),
                tls_ca_file: self.tls_ca_file.or(file.tls_ca_file),
            },
            client: ClientConfig {
                count: self.clients.or(file.clients).unwrap_or(Defaults::CLIENT_COUNT),
                transport,
                connect_timeout,
                creation_delay: self.creation_delay || file.creation_delay.unwrap_or(false),
                message_handler,
            },
            test: TestConfig {
                topic: self
                    .topic
                    .or(file.topic)
                    .unwrap_or_else(|| Defaults::TOPIC.to_string()),
                max_messages: self.messages.or(file.messages).unwrap_or(0),
            },
            inbound_pool: InboundPoolConfig {
                queue_size: self
                    .inbound_queue_size
                    .or(file.inbound_pool.queue_size)
                    .unwrap_or(Defaults::INBOUND_QUEUE_SIZE),
                core_threads: self
                    .inbound_core_threads
                    .or(file.inbound_pool.core_threads)
                    .unwrap_or(Defaults::INBOUND_CORE_THREADS),
                max_threads: self
                    .inbound_max_threads
                    .or(file.inbound_pool.max_threads)
                    .unwrap_or(Defaults::INBOUND_MAX_THREADS),
            },
            output: OutputConfig {
                verbose: self.verbose || file.verbose.unwrap_or(false),
            },
        })
    }
}

impl TryFrom<RawConfig> for Config {
    type Error = SwarmError;

    fn try_from(raw: RawConfig) -> Result<Self> {
        let file = match &raw.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        raw.merge(file)
    }
}

//! Domain-specific error types for the swarm stress harness
//!
//! Every failure in the harness is one of a handful of categories. The
//! category decides what the caller does with it: configuration errors abort
//! startup, connection errors release a session slot, transport and handler
//! errors are logged where they happen.

use thiserror::Error;

/// Main error type for the swarm harness
#[derive(Error, Debug)]
pub enum SwarmError {
    /// Malformed or unresolvable startup configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A session failed to connect or subscribe
    #[error("Connection error: {0}")]
    Connection(String),

    /// Failure while sending on or closing an established session
    #[error("Transport error: {0}")]
    Transport(String),

    /// A pluggable message handler rejected a message
    #[error("Handler error: {0}")]
    Handler(String),

    /// A peer sent a frame that does not follow the frame protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// Config file parse errors
    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    /// TLS setup errors
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

/// Result type using SwarmError
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_config_context(self, msg: &str) -> Result<T>;
    fn with_connection_context(self, msg: &str) -> Result<T>;
    fn with_transport_context(self, msg: &str) -> Result<T>;
    fn with_protocol_context(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn with_config_context(self, msg: &str) -> Result<T> {
        self.map_err(|e| SwarmError::Configuration(format!("{}: {}", msg, e)))
    }

    fn with_connection_context(self, msg: &str) -> Result<T> {
        self.map_err(|e| SwarmError::Connection(format!("{}: {}", msg, e)))
    }

    fn with_transport_context(self, msg: &str) -> Result<T> {
        self.map_err(|e| SwarmError::Transport(format!("{}: {}", msg, e)))
    }

    fn with_protocol_context(self, msg: &str) -> Result<T> {
        self.map_err(|e| SwarmError::Protocol(format!("{}: {}", msg, e)))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn with_config_context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| SwarmError::Configuration(msg.to_string()))
    }

    fn with_connection_context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| SwarmError::Connection(msg.to_string()))
    }

    fn with_transport_context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| SwarmError::Transport(msg.to_string()))
    }

    fn with_protocol_context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| SwarmError::Protocol(msg.to_string()))
    }
}

// Convenience constructors
impl SwarmError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        SwarmError::Configuration(msg.into())
    }

    pub fn connection<S: Into<String>>(msg: S) -> Self {
        SwarmError::Connection(msg.into())
    }

    pub fn transport<S: Into<String>>(msg: S) -> Self {
        SwarmError::Transport(msg.into())
    }

    pub fn handler<S: Into<String>>(msg: S) -> Self {
        SwarmError::Handler(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        SwarmError::Protocol(msg.into())
    }

    /// Re-tag any error raised while establishing a session as a connection error
    pub fn into_connection(self) -> Self {
        match self {
            SwarmError::Connection(_) => self,
            other => SwarmError::Connection(other.to_string()),
        }
    }
}

// Custom From implementation for boxed WebSocket errors
impl From<tokio_tungstenite::tungstenite::Error> for SwarmError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SwarmError::WebSocket(Box::new(err))
    }
}

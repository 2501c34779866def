//! Transport capability shared by every session
//!
//! A session talks to the server through a [`Transport`]: open a connection
//! (learning the server-assigned client id), subscribe, send, receive and
//! close. The three implementations differ only in how the byte stream is
//! established:
//! - [`NetTransport`]: plaintext TCP
//! - [`SslTransport`]: TLS over TCP, sharing one lazily built TLS context
//! - [`WebSocketTransport`]: WebSocket upgrade over TCP

pub mod lines;
pub mod net;
pub mod tls;
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

pub use net::NetTransport;
pub use tls::{SslTransport, TlsContext};
pub use websocket::WebSocketTransport;

use crate::common::{ClientIdentifier, SessionId};
use crate::config::Config;
use crate::errors::{Result, SwarmError};
use crate::message::TopicMessage;

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The wire transport a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportKind {
    Net,
    Ssl,
    WebSocket,
}

impl TransportKind {
    pub const ALL: [TransportKind; 3] = [
        TransportKind::Net,
        TransportKind::Ssl,
        TransportKind::WebSocket,
    ];

    /// Label used in logs and statistics lines
    pub fn client_type(self) -> &'static str {
        match self {
            TransportKind::Net => "External Client",
            TransportKind::Ssl => "SSL Client",
            TransportKind::WebSocket => "WebSocket Client",
        }
    }

    /// Uniform pick among all transports
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportKind::Net => "net",
            TransportKind::Ssl => "ssl",
            TransportKind::WebSocket => "ws",
        };
        f.write_str(name)
    }
}

/// Connection-level operations a session needs from the server
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Establish the connection and return the server-assigned client id
    async fn open(&mut self) -> Result<ClientIdentifier>;

    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    async fn unsubscribe(&mut self, topic: &str) -> Result<()>;

    async fn send(&mut self, topic: &str, data: &str) -> Result<()>;

    /// Next inbound message; `Ok(None)` once the server has disconnected.
    /// Must be cancel-safe, the session polls it inside `select!`.
    async fn recv(&mut self) -> Result<Option<TopicMessage>>;

    async fn close(&mut self) -> Result<()>;
}

/// Builds a transport for each session slot
pub trait Connector: Send + Sync {
    fn transport(&self, kind: TransportKind, session_id: SessionId) -> Box<dyn Transport>;
}

/// Production connector building real network transports from the config
pub struct TransportFactory {
    host: String,
    net_port: u16,
    ssl_port: u16,
    http_port: u16,
    inbound_queue_size: usize,
    tls: Arc<TlsContext>,
}

impl TransportFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            host: config.target.host.clone(),
            net_port: config.port_for(TransportKind::Net),
            ssl_port: config.port_for(TransportKind::Ssl),
            http_port: config.port_for(TransportKind::WebSocket),
            inbound_queue_size: config.inbound_queue_size(),
            tls: Arc::new(TlsContext::new(config.target.tls_ca_file.clone())),
        }
    }

    pub fn tls_context(&self) -> &Arc<TlsContext> {
        &self.tls
    }
}

impl Connector for TransportFactory {
    fn transport(&self, kind: TransportKind, _session_id: SessionId) -> Box<dyn Transport> {
        match kind {
            TransportKind::Net => Box::new(NetTransport::new(
                self.host.clone(),
                self.net_port,
                self.inbound_queue_size,
            )),
            TransportKind::Ssl => Box::new(SslTransport::new(
                self.host.clone(),
                self.ssl_port,
                self.inbound_queue_size,
                Arc::clone(&self.tls),
            )),
            TransportKind::WebSocket => Box::new(WebSocketTransport::new(
                self.host.clone(),
                self.http_port,
                self.inbound_queue_size,
            )),
        }
    }
}

/// Bounded queue fed by a transport's reader task
pub(crate) struct Inbound {
    rx: mpsc::Receiver<Result<TopicMessage>>,
    reader: JoinHandle<()>,
}

impl Inbound {
    pub(crate) fn new(rx: mpsc::Receiver<Result<TopicMessage>>, reader: JoinHandle<()>) -> Self {
        Self { rx, reader }
    }

    pub(crate) async fn next(&mut self) -> Result<Option<TopicMessage>> {
        match self.rx.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    pub(crate) fn stop(&self) {
        self.reader.abort();
    }
}

impl Drop for Inbound {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub(crate) fn not_open(kind: TransportKind) -> SwarmError {
    SwarmError::transport(format!("{} connection is not open", kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    #[test]
    fn test_client_type_labels() {
        assert_eq!(TransportKind::Net.client_type(), "External Client");
        assert_eq!(TransportKind::Ssl.client_type(), "SSL Client");
        assert_eq!(TransportKind::WebSocket.client_type(), "WebSocket Client");
    }

    #[test]
    fn test_random_covers_all_kinds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<TransportKind, u32> = HashMap::new();
        for _ in 0..300 {
            *counts.entry(TransportKind::random(&mut rng)).or_default() += 1;
        }
        for kind in TransportKind::ALL {
            let seen = counts.get(&kind).copied().unwrap_or(0);
            assert!(seen > 50, "{kind} picked only {seen} times out of 300");
        }
    }

    #[test]
    fn test_factory_defers_tls_setup() {
        let config = Config::local(crate::config::TransportMode::Mixed, 3, 0);
        let factory = TransportFactory::new(&config);
        for kind in TransportKind::ALL {
            let transport = factory.transport(kind, SessionId::new(0));
            assert_eq!(transport.kind(), kind);
        }
        assert!(!factory.tls_context().is_initialized());
    }
}

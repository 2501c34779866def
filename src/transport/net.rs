//! Plaintext TCP transport

use crate::common::ClientIdentifier;
use crate::errors::Result;
use crate::message::TopicMessage;
use crate::transport::lines::{LineConnection, connect_tcp};
use crate::transport::{Transport, TransportKind};

use async_trait::async_trait;
use tokio::net::TcpStream;

/// Newline-framed session connection over plain TCP
pub struct NetTransport {
    host: String,
    port: u16,
    queue_size: usize,
    lines: LineConnection<TcpStream>,
}

impl NetTransport {
    pub fn new(host: String, port: u16, queue_size: usize) -> Self {
        Self {
            host,
            port,
            queue_size,
            lines: LineConnection::new(TransportKind::Net),
        }
    }
}

#[async_trait]
impl Transport for NetTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Net
    }

    async fn open(&mut self) -> Result<ClientIdentifier> {
        let stream = connect_tcp(&self.host, self.port).await?;
        let peer = format!("net://{}:{}", self.host, self.port);
        self.lines.open(stream, self.queue_size, peer).await
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.lines.subscribe(topic).await
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        self.lines.unsubscribe(topic).await
    }

    async fn send(&mut self, topic: &str, data: &str) -> Result<()> {
        self.lines.send(topic, data).await
    }

    async fn recv(&mut self) -> Result<Option<TopicMessage>> {
        self.lines.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.lines.close().await
    }
}

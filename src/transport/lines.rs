//! Newline-delimited frame connection shared by the Net and SSL transports

use crate::common::ClientIdentifier;
use crate::constants::INPUT_BUFFER_SIZE;
use crate::errors::{ErrorContext, Result, SwarmError};
use crate::message::{self, ClientFrame, ServerFrame, TopicMessage};
use crate::transport::{Inbound, TransportKind, not_open};

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines,
    WriteHalf,
};
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Open a TCP connection with an enlarged receive buffer, trying each resolved address
pub async fn connect_tcp(host: &str, port: u16) -> Result<TcpStream> {
    let addrs = lookup_host((host, port))
        .await
        .with_connection_context(&format!("Cannot resolve {}:{}", host, port))?;

    let mut last_error = None;
    for addr in addrs {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if let Err(e) = socket.set_recv_buffer_size(INPUT_BUFFER_SIZE as u32) {
            debug!("Could not size receive buffer for {}: {}", addr, e);
        }
        match socket.connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => SwarmError::connection(format!("Failed to connect to {}:{}: {}", host, port, e)),
        None => SwarmError::connection(format!("No addresses found for {}:{}", host, port)),
    })
}

/// A framed connection over any byte stream
pub struct FramedLines<S> {
    writer: WriteHalf<S>,
    inbound: Inbound,
}

impl<S> FramedLines<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wait for the server's `connected` frame, then hand reading over to a background task
    pub async fn handshake(
        stream: S,
        queue_size: usize,
        peer: String,
    ) -> Result<(ClientIdentifier, Self)> {
        let (read_half, writer) = tokio::io::split(stream);
        let mut lines = BufReader::with_capacity(INPUT_BUFFER_SIZE, read_half).lines();

        let first = lines
            .next_line()
            .await
            .with_connection_context(&format!("Failed to read handshake from {}", peer))?
            .with_connection_context(&format!("{} closed the connection before handshake", peer))?;

        let client_id = match message::decode::<ServerFrame>(&first)? {
            ServerFrame::Connected { client_id } => client_id,
            other => {
                return Err(SwarmError::protocol(format!(
                    "{} sent {:?} before the connected frame",
                    peer, other
                )));
            }
        };

        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let reader = tokio::spawn(forward_lines(lines, tx, peer));
        Ok((
            client_id,
            Self {
                writer,
                inbound: Inbound::new(rx, reader),
            },
        ))
    }

    pub async fn write_frame(&mut self, frame: &ClientFrame) -> Result<()> {
        let mut line = message::encode(frame)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .with_transport_context("Failed to write frame")?;
        self.writer
            .flush()
            .await
            .with_transport_context("Failed to flush frame")
    }

    pub async fn next(&mut self) -> Result<Option<TopicMessage>> {
        self.inbound.next().await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inbound.stop();
        self.writer
            .shutdown()
            .await
            .with_transport_context("Failed to shut down connection")
    }
}

/// Connection slot of a newline-framed transport, empty until opened
pub struct LineConnection<S> {
    kind: TransportKind,
    framed: Option<FramedLines<S>>,
}

impl<S> LineConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(kind: TransportKind) -> Self {
        Self { kind, framed: None }
    }

    /// Run the handshake over an established stream and keep the connection
    pub async fn open(
        &mut self,
        stream: S,
        queue_size: usize,
        peer: String,
    ) -> Result<ClientIdentifier> {
        let (client_id, framed) = FramedLines::handshake(stream, queue_size, peer).await?;
        self.framed = Some(framed);
        Ok(client_id)
    }

    fn framed(&mut self) -> Result<&mut FramedLines<S>> {
        let kind = self.kind;
        self.framed.as_mut().ok_or_else(|| not_open(kind))
    }

    pub async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let frame = ClientFrame::Subscribe {
            topic: topic.to_string(),
        };
        self.framed()?.write_frame(&frame).await
    }

    pub async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        let frame = ClientFrame::Unsubscribe {
            topic: topic.to_string(),
        };
        self.framed()?.write_frame(&frame).await
    }

    pub async fn send(&mut self, topic: &str, data: &str) -> Result<()> {
        let frame = ClientFrame::Send {
            topic: topic.to_string(),
            data: data.to_string(),
        };
        self.framed()?.write_frame(&frame).await
    }

    pub async fn recv(&mut self) -> Result<Option<TopicMessage>> {
        self.framed()?.next().await
    }

    /// Shut the connection down; a no-op when it was never opened
    pub async fn close(&mut self) -> Result<()> {
        match self.framed.take() {
            Some(mut framed) => framed.shutdown().await,
            None => Ok(()),
        }
    }
}

async fn forward_lines<R>(
    mut lines: Lines<R>,
    tx: mpsc::Sender<Result<TopicMessage>>,
    peer: String,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match message::decode::<ServerFrame>(&line) {
                    Ok(ServerFrame::Message(msg)) => {
                        if tx.send(Ok(msg)).await.is_err() {
                            debug!("{} inbound queue closed", peer);
                            break;
                        }
                    }
                    Ok(ServerFrame::Connected { .. }) => {
                        debug!("{} repeated the connected frame, ignoring", peer);
                    }
                    Err(e) => warn!("{} sent a malformed frame: {}", peer, e),
                }
            }
            Ok(None) => {
                debug!("{} stream ended", peer);
                break;
            }
            Err(e) => {
                let _ = tx
                    .send(Err(SwarmError::transport(format!(
                        "Read from {} failed: {}",
                        peer, e
                    ))))
                    .await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_handshake_and_inbound_order() {
        let (client, mut server) = tokio::io::duplex(1024);
        server
            .write_all(
                b"{\"type\":\"connected\",\"client_id\":\"C7\"}\n\
                  {\"type\":\"message\",\"topic\":\"T\",\"kind\":\"load\",\"data\":\"a\"}\n\
                  garbage\n\
                  {\"type\":\"message\",\"topic\":\"T\",\"kind\":\"delta\",\"headers\":[\"1\"],\"data\":\"b\"}\n",
            )
            .await
            .unwrap();

        let (client_id, mut conn) = FramedLines::handshake(client, 4, "test".into()).await.unwrap();
        assert_eq!(client_id.as_ref(), "C7");

        let load = conn.next().await.unwrap().unwrap();
        assert_eq!(load.kind, MessageKind::Load);
        let delta = conn.next().await.unwrap().unwrap();
        assert_eq!(delta.kind, MessageKind::Delta);
        assert_eq!(delta.sequence(), Some(1));

        drop(server);
        assert!(conn.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_handshake_rejects_message_first() {
        let (client, mut server) = tokio::io::duplex(1024);
        server
            .write_all(b"{\"type\":\"message\",\"topic\":\"T\",\"kind\":\"load\",\"data\":\"a\"}\n")
            .await
            .unwrap();
        let result = FramedLines::handshake(client, 4, "test".into()).await;
        assert!(matches!(result, Err(SwarmError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_write_frame_is_newline_terminated() {
        let (client, mut server) = tokio::io::duplex(1024);
        server
            .write_all(b"{\"type\":\"connected\",\"client_id\":\"C1\"}\n")
            .await
            .unwrap();
        let (_, mut conn) = FramedLines::handshake(client, 4, "test".into()).await.unwrap();
        conn.write_frame(&ClientFrame::Subscribe { topic: "T".into() })
            .await
            .unwrap();
        conn.shutdown().await.unwrap();

        let mut written = String::new();
        server.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "{\"type\":\"subscribe\",\"topic\":\"T\"}\n");
    }

    #[tokio::test]
    async fn test_line_connection_writes_client_frames() {
        let mut lines = LineConnection::new(TransportKind::Net);
        assert!(matches!(
            lines.send("T", "early").await,
            Err(SwarmError::Transport(_))
        ));
        lines.close().await.unwrap();

        let (client, mut server) = tokio::io::duplex(1024);
        server
            .write_all(b"{\"type\":\"connected\",\"client_id\":\"C2\"}\n")
            .await
            .unwrap();
        let client_id = lines.open(client, 4, "test".into()).await.unwrap();
        assert_eq!(client_id.as_ref(), "C2");

        lines.subscribe("T").await.unwrap();
        lines.send("T", "hi").await.unwrap();
        lines.unsubscribe("T").await.unwrap();
        lines.close().await.unwrap();
        // A second close has nothing left to shut down
        lines.close().await.unwrap();

        let mut written = String::new();
        server.read_to_string(&mut written).await.unwrap();
        let frames: Vec<ClientFrame> = written
            .lines()
            .map(|line| message::decode(line).unwrap())
            .collect();
        assert_eq!(
            frames,
            vec![
                ClientFrame::Subscribe { topic: "T".into() },
                ClientFrame::Send {
                    topic: "T".into(),
                    data: "hi".into()
                },
                ClientFrame::Unsubscribe { topic: "T".into() },
            ]
        );
    }
}

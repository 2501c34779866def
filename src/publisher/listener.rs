//! Accept loops and per-connection serving for the stress publisher

use crate::common::ClientIdentifier;
use crate::constants::CLIENT_FRAME_BUFFER_SIZE;
use crate::errors::{ErrorContext, Result};
use crate::message::{self, ClientFrame, ServerFrame};
use crate::publisher::{Published, PublisherState, stopped};
use crate::transport::tls::{crypto_provider, load_certificates, load_private_key};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Server-side TLS acceptor from PEM certificate chain and key files
pub fn tls_acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor> {
    let certs = load_certificates(cert)?;
    let key = load_private_key(key)?;
    let config = ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .with_config_context("Certificate and key do not match")?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

pub(crate) async fn accept_net(
    listener: TcpListener,
    state: Arc<PublisherState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    tokio::spawn(serve_stream(stream, peer, Arc::clone(&state), shutdown.clone()));
                }
                Err(e) => warn!("Net accept failed: {}", e),
            },
            _ = stopped(&mut shutdown) => break,
        }
    }
    debug!("Net listener stopped");
}

pub(crate) async fn accept_tls(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    state: Arc<PublisherState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let acceptor = acceptor.clone();
                    let state = Arc::clone(&state);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => serve_stream(tls_stream, peer, state, shutdown).await,
                            Err(e) => warn!("TLS handshake with {} failed: {}", peer, e),
                        }
                    });
                }
                Err(e) => warn!("SSL accept failed: {}", e),
            },
            _ = stopped(&mut shutdown) => break,
        }
    }
    debug!("SSL listener stopped");
}

pub(crate) async fn accept_websocket(
    listener: TcpListener,
    state: Arc<PublisherState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_websocket(stream, peer, Arc::clone(&state), shutdown.clone()));
                }
                Err(e) => warn!("WebSocket accept failed: {}", e),
            },
            _ = stopped(&mut shutdown) => break,
        }
    }
    debug!("WebSocket listener stopped");
}

/// Writes server frames to one connection
#[async_trait]
trait FrameWriter: Send {
    async fn write_frame(&mut self, frame: &ServerFrame) -> Result<()>;

    async fn close(&mut self);
}

struct LineWriter<W> {
    inner: W,
}

#[async_trait]
impl<W> FrameWriter for LineWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_frame(&mut self, frame: &ServerFrame) -> Result<()> {
        let mut line = message::encode(frame)?;
        line.push('\n');
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}

struct WsWriter {
    sink: SplitSink<WebSocketStream<TcpStream>, Message>,
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn write_frame(&mut self, frame: &ServerFrame) -> Result<()> {
        let text = message::encode(frame)?;
        self.sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

async fn serve_stream<S>(
    stream: S,
    peer: SocketAddr,
    state: Arc<PublisherState>,
    shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel(CLIENT_FRAME_BUFFER_SIZE);
    let reader = tokio::spawn(read_lines(read_half, tx, peer));
    serve_connection(LineWriter { inner: write_half }, rx, state, shutdown, peer).await;
    reader.abort();
}

async fn serve_websocket(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<PublisherState>,
    shutdown: watch::Receiver<bool>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!("WebSocket upgrade from {} failed: {}", peer, e);
            return;
        }
    };
    let (sink, source) = ws_stream.split();
    let (tx, rx) = mpsc::channel(CLIENT_FRAME_BUFFER_SIZE);
    let reader = tokio::spawn(read_websocket(source, tx, peer));
    serve_connection(WsWriter { sink }, rx, state, shutdown, peer).await;
    reader.abort();
}

async fn read_lines<R>(reader: R, tx: mpsc::Sender<ClientFrame>, peer: SocketAddr)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match message::decode::<ClientFrame>(&line) {
                    Ok(frame) => {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{} sent a malformed frame: {}", peer, e),
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Read from {} failed: {}", peer, e);
                break;
            }
        }
    }
}

async fn read_websocket(
    mut source: SplitStream<WebSocketStream<TcpStream>>,
    tx: mpsc::Sender<ClientFrame>,
    peer: SocketAddr,
) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => match message::decode::<ClientFrame>(text.as_str()) {
                Ok(frame) => {
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{} sent a malformed frame: {}", peer, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Read from {} failed: {}", peer, e);
                break;
            }
        }
    }
}

/// Per-connection subscription state
struct Connection {
    client_id: ClientIdentifier,
    subscribed: bool,
}

enum Flow {
    Continue,
    Stop,
}

async fn serve_connection<W: FrameWriter>(
    mut writer: W,
    mut inbound: mpsc::Receiver<ClientFrame>,
    state: Arc<PublisherState>,
    mut shutdown: watch::Receiver<bool>,
    peer: SocketAddr,
) {
    let mut connection = Connection {
        client_id: ClientIdentifier::from(Uuid::new_v4().to_string()),
        subscribed: false,
    };
    let mut updates = state.updates();

    let connected = ServerFrame::Connected {
        client_id: connection.client_id.clone(),
    };
    if let Err(e) = writer.write_frame(&connected).await {
        warn!("Handshake with {} failed: {}", peer, e);
        return;
    }
    debug!("Client {} connected from {}", connection.client_id, peer);

    loop {
        let flow = tokio::select! {
            frame = inbound.recv() => match frame {
                Some(frame) => on_client_frame(&mut writer, &mut connection, &state, frame).await,
                None => Ok(Flow::Stop),
            },
            update = updates.recv() => match update {
                Ok(published) => on_published(&mut writer, &connection, published).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Client {} lagged behind, skipped {} messages", connection.client_id, skipped);
                    Ok(Flow::Continue)
                }
                Err(RecvError::Closed) => Ok(Flow::Stop),
            },
            _ = stopped(&mut shutdown) => Ok(Flow::Stop),
        };

        match flow {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(e) => {
                debug!("Client {} write failed: {}", connection.client_id, e);
                break;
            }
        }
    }

    if connection.subscribed {
        state.unsubscribed();
    }
    writer.close().await;
    debug!("Client {} disconnected", connection.client_id);
}

async fn on_client_frame<W: FrameWriter>(
    writer: &mut W,
    connection: &mut Connection,
    state: &PublisherState,
    frame: ClientFrame,
) -> Result<Flow> {
    match frame {
        ClientFrame::Subscribe { topic } => {
            if topic != state.topic {
                debug!("Client {} asked for unknown topic {}", connection.client_id, topic);
                return Ok(Flow::Continue);
            }
            if connection.subscribed {
                return Ok(Flow::Continue);
            }
            connection.subscribed = true;
            state.subscribed();
            info!("Client {} subscribed to {}", connection.client_id, topic);

            writer
                .write_frame(&ServerFrame::Message(state.load_message()))
                .await?;
            for sequence in 1..=state.burst {
                writer
                    .write_frame(&ServerFrame::Message(state.burst_message(sequence)))
                    .await?;
            }
        }
        ClientFrame::Unsubscribe { topic } => {
            if topic == state.topic && connection.subscribed {
                connection.subscribed = false;
                state.unsubscribed();
                debug!("Client {} unsubscribed from {}", connection.client_id, topic);
            }
        }
        ClientFrame::Send { topic, data } => {
            if topic == state.topic {
                state.publish_from(&connection.client_id, data);
            } else {
                debug!("Client {} sent to unknown topic {}", connection.client_id, topic);
            }
        }
    }
    Ok(Flow::Continue)
}

async fn on_published<W: FrameWriter>(
    writer: &mut W,
    connection: &Connection,
    published: Published,
) -> Result<Flow> {
    if !connection.subscribed || published.exclude.as_ref() == Some(&connection.client_id) {
        return Ok(Flow::Continue);
    }
    writer
        .write_frame(&ServerFrame::Message((*published.message).clone()))
        .await?;
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageKind, TopicMessage};
    use crate::publisher::{PublisherConfig, StressPublisher};
    use std::time::Duration;

    struct LineClient {
        lines: tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
        writer: tokio::net::tcp::OwnedWriteHalf,
    }

    impl LineClient {
        async fn connect(addr: SocketAddr) -> (ClientIdentifier, Self) {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read, writer) = stream.into_split();
            let mut client = Self {
                lines: BufReader::new(read).lines(),
                writer,
            };
            match client.next_frame().await {
                ServerFrame::Connected { client_id } => (client_id, client),
                other => panic!("expected connected frame, got {other:?}"),
            }
        }

        async fn next_frame(&mut self) -> ServerFrame {
            let line = tokio::time::timeout(Duration::from_secs(2), self.lines.next_line())
                .await
                .expect("frame in time")
                .unwrap()
                .expect("connection open");
            message::decode(&line).unwrap()
        }

        async fn next_message(&mut self) -> TopicMessage {
            match self.next_frame().await {
                ServerFrame::Message(msg) => msg,
                other => panic!("expected message, got {other:?}"),
            }
        }

        async fn send(&mut self, frame: ClientFrame) {
            let mut line = message::encode(&frame).unwrap();
            line.push('\n');
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_subscribe_gets_load_then_burst() {
        let publisher = StressPublisher::start(PublisherConfig {
            frequency: Duration::ZERO,
            burst: 3,
            message_size: 16,
            ..PublisherConfig::ephemeral()
        })
        .await
        .unwrap();

        let (_, mut client) = LineClient::connect(publisher.net_addr()).await;
        client
            .send(ClientFrame::Subscribe {
                topic: "Stress".into(),
            })
            .await;

        let load = client.next_message().await;
        assert_eq!(load.kind, MessageKind::Load);
        assert_eq!(load.data.len(), 16);
        for expected in 1..=3 {
            let delta = client.next_message().await;
            assert_eq!(delta.kind, MessageKind::Delta);
            assert_eq!(delta.sequence(), Some(expected));
        }
        assert_eq!(publisher.subscriber_count(), 1);
        publisher.stop().await;
    }

    #[tokio::test]
    async fn test_send_is_relayed_to_everyone_but_sender() {
        let publisher = StressPublisher::start(PublisherConfig {
            frequency: Duration::ZERO,
            ..PublisherConfig::ephemeral()
        })
        .await
        .unwrap();

        let (_, mut sender) = LineClient::connect(publisher.net_addr()).await;
        let (_, mut receiver) = LineClient::connect(publisher.net_addr()).await;
        for client in [&mut sender, &mut receiver] {
            client
                .send(ClientFrame::Subscribe {
                    topic: "Stress".into(),
                })
                .await;
            assert_eq!(client.next_message().await.kind, MessageKind::Load);
        }

        sender
            .send(ClientFrame::Send {
                topic: "Stress".into(),
                data: "hello".into(),
            })
            .await;
        let relayed = receiver.next_message().await;
        assert_eq!(relayed.data, "hello");

        // The sender only sees the next timer-less publish, not its own data
        publisher.publish_now();
        let next = sender.next_message().await;
        assert_eq!(next.sequence(), Some(1));
        publisher.stop().await;
    }

    #[tokio::test]
    async fn test_unsubscribed_transport_stops_receiving() {
        use crate::transport::{NetTransport, Transport};

        let publisher = StressPublisher::start(PublisherConfig {
            frequency: Duration::ZERO,
            ..PublisherConfig::ephemeral()
        })
        .await
        .unwrap();
        let addr = publisher.net_addr();
        let mut transport = NetTransport::new(addr.ip().to_string(), addr.port(), 8);
        transport.open().await.unwrap();
        transport.subscribe("Stress").await.unwrap();
        let load = transport.recv().await.unwrap().unwrap();
        assert_eq!(load.kind, MessageKind::Load);

        publisher.publish_now();
        assert_eq!(transport.recv().await.unwrap().unwrap().sequence(), Some(1));

        transport.unsubscribe("Stress").await.unwrap();
        while publisher.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        publisher.publish_now();
        let quiet = tokio::time::timeout(Duration::from_millis(100), transport.recv()).await;
        assert!(quiet.is_err(), "unsubscribed transport still received a delta");

        transport.close().await.unwrap();
        publisher.stop().await;
    }

    #[tokio::test]
    async fn test_stop_disconnects_clients() {
        let publisher = StressPublisher::start(PublisherConfig::ephemeral())
            .await
            .unwrap();
        let (_, mut client) = LineClient::connect(publisher.net_addr()).await;
        publisher.stop().await;

        let end = tokio::time::timeout(Duration::from_secs(2), client.lines.next_line())
            .await
            .expect("disconnect in time")
            .unwrap();
        assert!(end.is_none());
    }
}

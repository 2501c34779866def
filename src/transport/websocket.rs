//! WebSocket transport

use crate::common::ClientIdentifier;
use crate::constants::INPUT_BUFFER_SIZE;
use crate::errors::{ErrorContext, Result, SwarmError};
use crate::message::{self, ClientFrame, ServerFrame, TopicMessage};
use crate::transport::{Inbound, Transport, TransportKind, not_open};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config, tungstenite::Error as WsError,
    tungstenite::Message, tungstenite::client::IntoClientRequest,
    tungstenite::protocol::WebSocketConfig,
};
use tracing::{debug, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Session connection over a WebSocket, one frame per text message
pub struct WebSocketTransport {
    host: String,
    port: u16,
    queue_size: usize,
    connection: Option<Connection>,
}

struct Connection {
    sink: SplitSink<WsStream, Message>,
    inbound: Inbound,
}

impl WebSocketTransport {
    pub fn new(host: String, port: u16, queue_size: usize) -> Self {
        Self {
            host,
            port,
            queue_size,
            connection: None,
        }
    }

    fn url(&self) -> Result<Url> {
        let raw = format!("ws://{}:{}/", self.host, self.port);
        Url::parse(&raw).with_config_context(&format!("Invalid WebSocket URL '{}'", raw))
    }

    async fn write_frame(&mut self, frame: &ClientFrame) -> Result<()> {
        let text = message::encode(frame)?;
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| not_open(TransportKind::WebSocket))?;
        connection
            .sink
            .send(Message::Text(text.into()))
            .await
            .with_transport_context("Failed to send WebSocket frame")
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn open(&mut self) -> Result<ClientIdentifier> {
        let url = self.url()?;
        let request = url
            .as_str()
            .into_client_request()
            .with_connection_context(&format!("Failed to create WebSocket request for {}", url))?;

        let mut ws_config = WebSocketConfig::default();
        ws_config.read_buffer_size = INPUT_BUFFER_SIZE;
        let (mut ws_stream, _response) = connect_async_with_config(request, Some(ws_config), true)
            .await
            .with_connection_context(&format!("Failed to connect to WebSocket server at {}", url))?;

        let client_id = read_handshake(&mut ws_stream, &url).await?;

        let (sink, stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel(self.queue_size.max(1));
        let reader = tokio::spawn(forward_messages(stream, tx, url.to_string()));
        self.connection = Some(Connection {
            sink,
            inbound: Inbound::new(rx, reader),
        });
        Ok(client_id)
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.write_frame(&ClientFrame::Subscribe {
            topic: topic.to_string(),
        })
        .await
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        self.write_frame(&ClientFrame::Unsubscribe {
            topic: topic.to_string(),
        })
        .await
    }

    async fn send(&mut self, topic: &str, data: &str) -> Result<()> {
        self.write_frame(&ClientFrame::Send {
            topic: topic.to_string(),
            data: data.to_string(),
        })
        .await
    }

    async fn recv(&mut self) -> Result<Option<TopicMessage>> {
        match self.connection.as_mut() {
            Some(connection) => connection.inbound.next().await,
            None => Err(not_open(TransportKind::WebSocket)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };
        connection.inbound.stop();
        // Closing the sink sends the close frame
        match connection.sink.close().await {
            Ok(()) => Ok(()),
            // The server closed first
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(SwarmError::transport(format!("Failed to close WebSocket: {}", e))),
        }
    }
}

async fn read_handshake(ws_stream: &mut WsStream, url: &Url) -> Result<ClientIdentifier> {
    loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return match message::decode::<ServerFrame>(text.as_str())? {
                    ServerFrame::Connected { client_id } => Ok(client_id),
                    other => Err(SwarmError::protocol(format!(
                        "{} sent {:?} before the connected frame",
                        url, other
                    ))),
                };
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(SwarmError::connection(format!(
                    "{} closed the connection before handshake",
                    url
                )));
            }
            Some(Err(e)) => {
                return Err(SwarmError::connection(format!(
                    "Failed to read handshake from {}: {}",
                    url, e
                )));
            }
            _ => {}
        }
    }
}

async fn forward_messages(
    mut stream: SplitStream<WsStream>,
    tx: mpsc::Sender<Result<TopicMessage>>,
    peer: String,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match message::decode::<ServerFrame>(text.as_str()) {
                Ok(ServerFrame::Message(msg)) => {
                    if tx.send(Ok(msg)).await.is_err() {
                        debug!("{} inbound queue closed", peer);
                        return;
                    }
                }
                Ok(ServerFrame::Connected { .. }) => {
                    debug!("{} repeated the connected frame, ignoring", peer);
                }
                Err(e) => warn!("{} sent a malformed frame: {}", peer, e),
            },
            Ok(Message::Close(_)) => {
                debug!("{} sent a close frame", peer);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = tx.send(Err(SwarmError::from(e))).await;
                return;
            }
        }
    }
    debug!("{} stream ended", peer);
}

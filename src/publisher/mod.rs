//! Stress publisher used as the server side of end-to-end runs
//!
//! The publisher owns one topic. Subscribers get a load message with the
//! current payload, optionally followed by a burst of numbered deltas. A timer
//! publishes a delta to every subscriber while anyone is subscribed, and
//! anything a client sends on the topic is re-broadcast to everyone else.

pub mod listener;
pub mod payload;

use crate::common::ClientIdentifier;
use crate::constants::*;
use crate::errors::{ErrorContext, Result, SwarmError};
use crate::message::TopicMessage;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Publisher settings
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub bind: String,
    pub net_port: u16,
    pub http_port: u16,
    pub ssl_port: u16,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub topic: String,
    /// Delta interval, zero disables the timer
    pub frequency: Duration,
    /// Payload size in characters, zero uses the sample data as-is
    pub message_size: usize,
    /// Deltas sent to each new subscriber right after the load message
    pub burst: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            net_port: 8080,
            http_port: 8090,
            ssl_port: 8443,
            tls_cert: None,
            tls_key: None,
            topic: DEFAULT_TOPIC.to_string(),
            frequency: Duration::from_millis(DEFAULT_PUBLISH_FREQUENCY_MS),
            message_size: 0,
            burst: 0,
        }
    }
}

impl PublisherConfig {
    /// Loopback publisher on ephemeral ports
    pub fn ephemeral() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            net_port: 0,
            http_port: 0,
            ssl_port: 0,
            ..Self::default()
        }
    }
}

/// A delta on its way to every subscriber except `exclude`
#[derive(Debug, Clone)]
pub(crate) struct Published {
    pub message: Arc<TopicMessage>,
    pub exclude: Option<ClientIdentifier>,
}

/// State shared by the timer and every connection
pub(crate) struct PublisherState {
    pub topic: String,
    pub payload: String,
    pub burst: u64,
    sequence: AtomicU64,
    subscribers: AtomicUsize,
    fanout: broadcast::Sender<Published>,
}

impl PublisherState {
    fn new(config: &PublisherConfig) -> Self {
        let (fanout, _) = broadcast::channel(PUBLISHER_FANOUT_CAPACITY);
        Self {
            topic: config.topic.clone(),
            payload: payload::sample_payload(config.message_size),
            burst: config.burst,
            sequence: AtomicU64::new(0),
            subscribers: AtomicUsize::new(0),
            fanout,
        }
    }

    pub fn load_message(&self) -> TopicMessage {
        TopicMessage::load(self.topic.clone(), self.payload.clone())
    }

    pub fn burst_message(&self, sequence: u64) -> TopicMessage {
        TopicMessage::delta(self.topic.clone(), self.payload.clone())
            .with_headers([sequence.to_string()])
    }

    pub fn updates(&self) -> broadcast::Receiver<Published> {
        self.fanout.subscribe()
    }

    pub fn subscribed(&self) {
        self.subscribers.fetch_add(1, Ordering::AcqRel);
    }

    pub fn unsubscribed(&self) {
        self.subscribers.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Acquire)
    }

    /// Publish the next numbered delta to all subscribers
    pub fn publish_delta(&self) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let message = TopicMessage::delta(self.topic.clone(), self.payload.clone())
            .with_headers([sequence.to_string()]);
        self.fan_out(message, None);
        sequence
    }

    /// Re-broadcast client data to every subscriber but the sender
    pub fn publish_from(&self, sender: &ClientIdentifier, data: String) {
        let message = TopicMessage::delta(self.topic.clone(), data);
        self.fan_out(message, Some(sender.clone()));
    }

    fn fan_out(&self, message: TopicMessage, exclude: Option<ClientIdentifier>) {
        let published = Published {
            message: Arc::new(message),
            exclude,
        };
        if self.fanout.send(published).is_err() {
            debug!("No connections to publish to");
        }
    }
}

/// Running publisher with its listeners and timer
pub struct StressPublisher {
    state: Arc<PublisherState>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    net_addr: SocketAddr,
    ws_addr: SocketAddr,
    ssl_addr: Option<SocketAddr>,
}

impl StressPublisher {
    /// Bind every listener and start publishing
    pub async fn start(config: PublisherConfig) -> Result<Self> {
        let tls = match (&config.tls_cert, &config.tls_key) {
            (Some(cert), Some(key)) => Some(listener::tls_acceptor(cert, key)?),
            (None, None) => None,
            _ => {
                return Err(SwarmError::config(
                    "TLS certificate and key must be configured together",
                ));
            }
        };

        let state = Arc::new(PublisherState::new(&config));
        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::new();

        let net = bind(&config.bind, config.net_port, "net").await?;
        let net_addr = net.local_addr()?;
        tasks.push(tokio::spawn(listener::accept_net(
            net,
            Arc::clone(&state),
            shutdown.subscribe(),
        )));

        let ws = bind(&config.bind, config.http_port, "websocket").await?;
        let ws_addr = ws.local_addr()?;
        tasks.push(tokio::spawn(listener::accept_websocket(
            ws,
            Arc::clone(&state),
            shutdown.subscribe(),
        )));

        let ssl_addr = match tls {
            Some(acceptor) => {
                let ssl = bind(&config.bind, config.ssl_port, "ssl").await?;
                let addr = ssl.local_addr()?;
                tasks.push(tokio::spawn(listener::accept_tls(
                    ssl,
                    acceptor,
                    Arc::clone(&state),
                    shutdown.subscribe(),
                )));
                Some(addr)
            }
            None => None,
        };

        if !config.frequency.is_zero() {
            tasks.push(tokio::spawn(run_timer(
                Arc::clone(&state),
                config.frequency,
                shutdown.subscribe(),
            )));
        }

        info!(
            "Stress publisher started on topic {}. Message size {} bytes every {} ms",
            state.topic,
            state.payload.len(),
            config.frequency.as_millis()
        );
        info!("Listening: net {} / ws {}", net_addr, ws_addr);
        if let Some(addr) = ssl_addr {
            info!("Listening: ssl {}", addr);
        }

        Ok(Self {
            state,
            shutdown,
            tasks,
            net_addr,
            ws_addr,
            ssl_addr,
        })
    }

    pub fn net_addr(&self) -> SocketAddr {
        self.net_addr
    }

    pub fn ws_addr(&self) -> SocketAddr {
        self.ws_addr
    }

    pub fn ssl_addr(&self) -> Option<SocketAddr> {
        self.ssl_addr
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.subscriber_count()
    }

    /// Publish one delta immediately, outside the timer
    pub fn publish_now(&self) -> u64 {
        self.state.publish_delta()
    }

    /// Stop the timer and listeners and disconnect every client
    pub async fn stop(mut self) {
        self.shutdown.send_replace(true);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                debug!("Publisher task ended abnormally: {}", e);
            }
        }
        info!("Stress publisher stopped");
    }
}

impl Drop for StressPublisher {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Resolves once the publisher is stopping or gone
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn bind(host: &str, port: u16, name: &str) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_config_context(&format!("Cannot bind {} listener on {}:{}", name, host, port))
}

async fn run_timer(state: Arc<PublisherState>, frequency: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(frequency);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if state.subscriber_count() > 0 {
                    let sequence = state.publish_delta();
                    if sequence % DEBUG_LOG_INTERVAL == 0 {
                        debug!("Published delta {}", sequence);
                    }
                }
            }
            _ = stopped(&mut shutdown) => break,
        }
    }
    debug!("Publish timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_sequences_and_exclusion() {
        let state = PublisherState::new(&PublisherConfig::ephemeral());
        let mut updates = state.updates();

        assert_eq!(state.publish_delta(), 1);
        assert_eq!(state.publish_delta(), 2);
        let sender = ClientIdentifier::from("sender");
        state.publish_from(&sender, "hi".to_string());

        let first = updates.recv().await.unwrap();
        assert_eq!(first.message.sequence(), Some(1));
        assert!(first.exclude.is_none());
        let _ = updates.recv().await.unwrap();
        let relayed = updates.recv().await.unwrap();
        assert_eq!(relayed.message.data, "hi");
        assert_eq!(relayed.exclude, Some(sender));
    }

    #[tokio::test]
    async fn test_mismatched_tls_material_is_rejected() {
        let config = PublisherConfig {
            tls_cert: Some(PathBuf::from("cert.pem")),
            ..PublisherConfig::ephemeral()
        };
        assert!(matches!(
            StressPublisher::start(config).await,
            Err(SwarmError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_timer_waits_for_subscribers() {
        let config = PublisherConfig {
            frequency: Duration::from_millis(5),
            ..PublisherConfig::ephemeral()
        };
        let publisher = StressPublisher::start(config).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        // Nobody subscribed, so the sequence has not moved
        assert_eq!(publisher.publish_now(), 1);
        publisher.stop().await;
    }
}

//! Scripted in-memory transport for driving sessions in tests

use crate::common::{ClientIdentifier, SessionId};
use crate::errors::{Result, SwarmError};
use crate::message::TopicMessage;
use crate::transport::{Connector, Transport, TransportKind, not_open};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// What a scripted transport did, readable after the session is gone
#[derive(Debug, Default)]
pub(crate) struct TrackerState {
    pub kind: Option<TransportKind>,
    pub subscribed: Vec<String>,
    pub sent: Vec<(String, String)>,
    pub closes: u32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Tracker(Arc<Mutex<TrackerState>>);

impl Tracker {
    fn update(&self, f: impl FnOnce(&mut TrackerState)) {
        f(&mut self.0.lock().unwrap());
    }

    pub fn closes(&self) -> u32 {
        self.0.lock().unwrap().closes
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.0.lock().unwrap().subscribed.clone()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().sent.clone()
    }

    pub fn kind(&self) -> Option<TransportKind> {
        self.0.lock().unwrap().kind
    }
}

/// Builds `n` numbered delta messages on a topic
pub(crate) fn deltas(topic: &str, n: usize) -> Vec<TopicMessage> {
    (1..=n)
        .map(|i| TopicMessage::delta(topic, format!("payload-{i}")).with_headers([i.to_string()]))
        .collect()
}

pub(crate) struct ScriptedTransport {
    kind: TransportKind,
    session_id: SessionId,
    fail_open: bool,
    open_delay: Option<Duration>,
    preload: VecDeque<TopicMessage>,
    feed: Option<mpsc::UnboundedReceiver<TopicMessage>>,
    disconnect_when_drained: bool,
    tracker: Tracker,
    open: bool,
}

impl ScriptedTransport {
    pub fn new(kind: TransportKind, session_id: SessionId) -> Self {
        let tracker = Tracker::default();
        tracker.update(|s| s.kind = Some(kind));
        Self {
            kind,
            session_id,
            fail_open: false,
            open_delay: None,
            preload: VecDeque::new(),
            feed: None,
            disconnect_when_drained: false,
            tracker,
            open: false,
        }
    }

    pub fn with_messages(mut self, messages: Vec<TopicMessage>) -> Self {
        self.preload.extend(messages);
        self
    }

    pub fn with_feed(mut self, feed: mpsc::UnboundedReceiver<TopicMessage>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn disconnect_when_drained(mut self) -> Self {
        self.disconnect_when_drained = true;
        self
    }

    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&mut self) -> Result<ClientIdentifier> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_open {
            return Err(SwarmError::connection(format!(
                "scripted refusal for slot {}",
                self.session_id
            )));
        }
        self.open = true;
        Ok(ClientIdentifier::from(format!("C{}", self.session_id)))
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        if !self.open {
            return Err(not_open(self.kind));
        }
        self.tracker.update(|s| s.subscribed.push(topic.to_string()));
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        self.tracker.update(|s| s.subscribed.retain(|t| t != topic));
        Ok(())
    }

    async fn send(&mut self, topic: &str, data: &str) -> Result<()> {
        if !self.open {
            return Err(not_open(self.kind));
        }
        self.tracker
            .update(|s| s.sent.push((topic.to_string(), data.to_string())));
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<TopicMessage>> {
        if !self.open {
            return Err(not_open(self.kind));
        }
        if let Some(message) = self.preload.pop_front() {
            return Ok(Some(message));
        }
        match self.feed.as_mut() {
            Some(feed) => Ok(feed.recv().await),
            None if self.disconnect_when_drained => Ok(None),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.tracker.update(|s| s.closes += 1);
        Ok(())
    }
}

/// Connector handing out scripted transports per session slot
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    messages: Vec<TopicMessage>,
    failing: HashSet<u32>,
    disconnect_when_drained: bool,
    open_delay: Option<Duration>,
    feeds: Mutex<HashMap<u32, mpsc::UnboundedReceiver<TopicMessage>>>,
    trackers: Mutex<HashMap<u32, Tracker>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages every session receives right after subscribing
    pub fn with_messages(mut self, messages: Vec<TopicMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Slots whose open is refused
    pub fn failing(mut self, slots: impl IntoIterator<Item = u32>) -> Self {
        self.failing.extend(slots);
        self
    }

    /// Report end-of-stream once the scripted messages are used up
    pub fn disconnect_when_drained(mut self) -> Self {
        self.disconnect_when_drained = true;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Live message source for a slot; dropping the sender disconnects it
    pub fn feed(&self, slot: u32) -> mpsc::UnboundedSender<TopicMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().insert(slot, rx);
        tx
    }

    pub fn tracker(&self, slot: u32) -> Option<Tracker> {
        self.trackers.lock().unwrap().get(&slot).cloned()
    }

    pub fn trackers(&self) -> Vec<Tracker> {
        self.trackers.lock().unwrap().values().cloned().collect()
    }
}

impl Connector for ScriptedConnector {
    fn transport(&self, kind: TransportKind, session_id: SessionId) -> Box<dyn Transport> {
        let slot = session_id.get();
        let mut transport =
            ScriptedTransport::new(kind, session_id).with_messages(self.messages.clone());
        transport.fail_open = self.failing.contains(&slot);
        transport.open_delay = self.open_delay;
        transport.disconnect_when_drained = self.disconnect_when_drained;
        if let Some(feed) = self.feeds.lock().unwrap().remove(&slot) {
            transport = transport.with_feed(feed);
        }
        self.trackers.lock().unwrap().insert(slot, transport.tracker());
        Box::new(transport)
    }
}

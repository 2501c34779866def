//! A single subscriber session and its delivery task
//!
//! A session connects its transport, subscribes to the topic and then runs
//! one delivery task that feeds every inbound message through the optional
//! handler and the [`MessageTimer`]. Whatever ends the session (quota,
//! explicit close, server disconnect or a transport failure) goes through the
//! same exit path, which reports completion exactly once.

use crate::common::{ClientIdentifier, SessionId};
use crate::constants::{COMMAND_BUFFER_SIZE, DEBUG_LOG_INTERVAL};
use crate::errors::{Result, SwarmError};
use crate::handler::MessageHandler;
use crate::message::TopicMessage;
use crate::metrics::client::{LatencyReport, MessageTimer};
use crate::transport::{Transport, TransportKind};

use async_trait::async_trait;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Received more than its quota
    QuotaReached(LatencyReport),
    /// Closed through its handle
    Closed,
    /// The server ended the stream
    ServerDisconnected,
    /// The transport failed while receiving
    Failed(String),
}

/// Final state of a session, handed to the completion callback
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub kind: TransportKind,
    pub client_id: ClientIdentifier,
    pub messages_received: u64,
    pub reason: CloseReason,
}

/// Notified once per session when it terminates
#[async_trait]
pub trait CompletionCallback: Send + Sync {
    async fn session_finished(&self, outcome: SessionOutcome);
}

/// Once-only completion guard shared by a session and its handles
pub struct SessionCompletion {
    finished: AtomicBool,
    callback: Arc<dyn CompletionCallback>,
}

impl SessionCompletion {
    pub fn new(callback: Arc<dyn CompletionCallback>) -> Self {
        Self {
            finished: AtomicBool::new(false),
            callback,
        }
    }

    /// Run the callback unless the session already finished; returns whether it ran
    pub async fn finish(&self, outcome: SessionOutcome) -> bool {
        if self.finished.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.callback.session_finished(outcome).await;
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Per-session parameters taken from the run configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub topic: String,
    pub max_messages: u64,
    pub connect_timeout: Duration,
}

enum SessionCommand {
    Send {
        topic: String,
        data: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Unsubscribe {
        topic: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        reply: oneshot::Sender<Result<()>>,
    },
}

pub struct Session {
    id: SessionId,
    settings: SessionSettings,
    transport: Box<dyn Transport>,
    handler: Option<Box<dyn MessageHandler>>,
    timer: MessageTimer,
    client_id: Option<ClientIdentifier>,
    completion: Arc<SessionCompletion>,
    commands_tx: Option<mpsc::Sender<SessionCommand>>,
    commands: mpsc::Receiver<SessionCommand>,
}

impl Session {
    pub fn new(
        id: SessionId,
        settings: SessionSettings,
        transport: Box<dyn Transport>,
        handler: Option<Box<dyn MessageHandler>>,
        callback: Arc<dyn CompletionCallback>,
    ) -> Self {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER_SIZE);
        Self {
            id,
            timer: MessageTimer::new(settings.max_messages),
            settings,
            transport,
            handler,
            client_id: None,
            completion: Arc::new(SessionCompletion::new(callback)),
            commands_tx: Some(commands_tx),
            commands,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn client_id(&self) -> Option<&ClientIdentifier> {
        self.client_id.as_ref()
    }

    /// Open the transport and subscribe, bounded by the connect timeout.
    ///
    /// Any failure is reported as a connection error; the transport is
    /// closed and the session must not be started.
    pub async fn connect(&mut self) -> Result<ClientIdentifier> {
        let transport = &mut self.transport;
        let topic = self.settings.topic.as_str();
        let attempt = tokio::time::timeout(self.settings.connect_timeout, async move {
            let client_id = transport.open().await?;
            transport.subscribe(topic).await?;
            Ok::<_, SwarmError>(client_id)
        })
        .await;

        let error = match attempt {
            Ok(Ok(client_id)) => {
                debug!(
                    "{} T{} connected as {} and subscribed to {}",
                    self.kind().client_type(),
                    self.id,
                    client_id,
                    self.settings.topic
                );
                self.client_id = Some(client_id.clone());
                return Ok(client_id);
            }
            Ok(Err(e)) => e.into_connection(),
            Err(_) => SwarmError::connection(format!(
                "{} T{} timed out after {}s",
                self.kind().client_type(),
                self.id,
                self.settings.connect_timeout.as_secs_f64()
            )),
        };

        if let Err(e) = self.transport.close().await {
            debug!("Session {} cleanup after failed connect: {}", self.id, e);
        }
        Err(error)
    }

    /// Handle for closing the session or sending and unsubscribing through it.
    ///
    /// Must be taken before [`Session::spawn`].
    pub fn handle(&self) -> Option<SessionHandle> {
        let commands = self.commands_tx.clone()?;
        Some(SessionHandle {
            id: self.id,
            kind: self.kind(),
            client_id: self.client_id.clone()?,
            commands,
            completion: Arc::clone(&self.completion),
        })
    }

    /// Start the delivery task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        // From here on only handles keep the command channel open
        drop(self.commands_tx.take());

        let mut close_reply = None;
        // Dropping every handle only stops command polling
        let mut commands_open = true;
        let reason = loop {
            tokio::select! {
                inbound = self.transport.recv() => match inbound {
                    Ok(Some(message)) => {
                        if let Some(report) = self.on_message(&message) {
                            break CloseReason::QuotaReached(report);
                        }
                    }
                    Ok(None) => break CloseReason::ServerDisconnected,
                    Err(e) => break CloseReason::Failed(e.to_string()),
                },
                command = self.commands.recv(), if commands_open => match command {
                    Some(SessionCommand::Send { topic, data, reply }) => {
                        let result = self.transport.send(&topic, &data).await;
                        if let Err(e) = &result {
                            warn!("Session {} send on {} failed: {}", self.id, topic, e);
                        }
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::Unsubscribe { topic, reply }) => {
                        let result = self.transport.unsubscribe(&topic).await;
                        if let Err(e) = &result {
                            warn!("Session {} unsubscribe from {} failed: {}", self.id, topic, e);
                        }
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::Close { reply }) => {
                        close_reply = Some(reply);
                        break CloseReason::Closed;
                    }
                    None => commands_open = false,
                },
            }
        };

        let client_type = self.kind().client_type();
        let client_id = self.client_id.clone().unwrap_or_else(|| "-".into());
        match &reason {
            CloseReason::QuotaReached(report) => {
                println!("{}", report.stats_line(client_type, self.id.get(), client_id.as_ref()));
            }
            CloseReason::Closed => debug!("{} T{} closed", client_type, self.id),
            CloseReason::ServerDisconnected => {
                info!("{} T{} {} disconnected by server", client_type, self.id, client_id)
            }
            CloseReason::Failed(e) => {
                error!("{} T{} {} failed: {}", client_type, self.id, client_id, e)
            }
        }

        let close_result = self.transport.close().await;
        if let Err(e) = &close_result {
            warn!("Session {} close failed: {}", self.id, e);
        }
        // Handlers may report on drop
        self.handler = None;

        let outcome = SessionOutcome {
            session_id: self.id,
            kind: self.kind(),
            client_id,
            messages_received: self.timer.messages_received(),
            reason,
        };
        self.completion.finish(outcome).await;

        if let Some(reply) = close_reply {
            let _ = reply.send(close_result);
        }
    }

    fn on_message(&mut self, message: &TopicMessage) -> Option<LatencyReport> {
        if let Some(handler) = self.handler.as_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Session {} handler: {}", self.id, e),
                Err(_) => error!("Session {} handler panicked, message still counted", self.id),
            }
        }

        let report = self.timer.record(Instant::now());
        let received = self.timer.messages_received();
        if received % DEBUG_LOG_INTERVAL == 0 {
            debug!("Session {} received {} messages", self.id, received);
        }
        report
    }
}

/// Cloneable control surface of a running session
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    kind: TransportKind,
    client_id: ClientIdentifier,
    commands: mpsc::Sender<SessionCommand>,
    completion: Arc<SessionCompletion>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn client_id(&self) -> &ClientIdentifier {
        &self.client_id
    }

    pub fn is_finished(&self) -> bool {
        self.completion.is_finished()
    }

    /// Close the connection and wait until completion has been reported.
    ///
    /// Closing a session that already finished is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.is_finished() {
            return Ok(());
        }
        let (reply, done) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Close { reply })
            .await
            .is_err()
        {
            return Ok(());
        }
        // A dropped reply means another path finished the session first
        done.await.unwrap_or(Ok(()))
    }

    /// Publish `data` on `topic` through the session's transport
    pub async fn send(&self, topic: &str, data: &str) -> Result<()> {
        let (reply, done) = oneshot::channel();
        let command = SessionCommand::Send {
            topic: topic.to_string(),
            data: data.to_string(),
            reply,
        };
        self.request(command, done).await
    }

    /// Stop receiving `topic`; the session stays open until closed
    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        let (reply, done) = oneshot::channel();
        let command = SessionCommand::Unsubscribe {
            topic: topic.to_string(),
            reply,
        };
        self.request(command, done).await
    }

    async fn request(
        &self,
        command: SessionCommand,
        done: oneshot::Receiver<Result<()>>,
    ) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SwarmError::transport(format!("Session {} is closed", self.id)))?;
        done.await.map_err(|_| {
            SwarmError::transport(format!("Session {} closed before the request ran", self.id))
        })?
    }
}

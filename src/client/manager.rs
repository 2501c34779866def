//! Client manager for spawning and coordinating the session pool

use crate::client::barrier::CompletionBarrier;
use crate::client::pool::SessionPool;
use crate::client::session::{
    CompletionCallback, Session, SessionOutcome, SessionSettings,
};
use crate::common::SessionId;
use crate::config::Config;
use crate::constants::*;
use crate::errors::Result;
use crate::handler::{HandlerFactory, HandlerRegistry};
use crate::metrics::RunMetrics;
use crate::transport::{Connector, TransportFactory, TransportKind};

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Client manager that creates every session slot and waits for all of them to finish
pub struct ClientManager {
    config: Config,
    connector: Arc<dyn Connector>,
    handler_factory: Option<HandlerFactory>,
    pool: SessionPool,
    barrier: Arc<CompletionBarrier>,
    metrics: Arc<RunMetrics>,
    completion: Arc<dyn CompletionCallback>,
    test_start_time: Option<Instant>,
    test_end_time: Option<Instant>,
}

impl ClientManager {
    pub fn new(config: Config) -> Self {
        let connector = Arc::new(TransportFactory::new(&config));
        Self::with_connector(config, connector, &HandlerRegistry::with_builtins())
    }

    /// Manager using a custom connector and handler registry
    pub fn with_connector(
        config: Config,
        connector: Arc<dyn Connector>,
        registry: &HandlerRegistry,
    ) -> Self {
        let handler_factory = match registry.resolve(config.client.message_handler.as_deref()) {
            Ok(factory) => factory,
            Err(e) => {
                error!("{}; continuing without a message handler", e);
                None
            }
        };

        let pool = SessionPool::new();
        let barrier = Arc::new(CompletionBarrier::new(config.client.count as usize));
        let metrics = Arc::new(RunMetrics::new());
        let completion = Arc::new(PoolCompletion {
            pool: pool.clone(),
            barrier: Arc::clone(&barrier),
            metrics: Arc::clone(&metrics),
        });

        Self {
            config,
            connector,
            handler_factory,
            pool,
            barrier,
            metrics,
            completion,
            test_start_time: None,
            test_end_time: None,
        }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn barrier(&self) -> &CompletionBarrier {
        &self.barrier
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.metrics
    }

    pub fn has_message_handler(&self) -> bool {
        self.handler_factory.is_some()
    }

    /// Run the stress test until every session finishes or Ctrl+C is pressed
    pub async fn run_stress_test(&mut self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the stress test, closing every live session if `shutdown` resolves first
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting stress test with {} clients",
            self.config.client.count
        );
        self.test_start_time = Some(Instant::now());
        self.metrics.record_requested(self.config.client.count);

        let completed = tokio::select! {
            _ = self.spawn_and_wait() => true,
            _ = shutdown => false,
        };

        if !completed {
            let closed = self.pool.close_all().await;
            info!("Shutdown closed {} sessions", closed);
        }

        self.test_end_time = Some(Instant::now());
        self.print_final_report().await;
        Ok(())
    }

    async fn spawn_and_wait(&self) {
        self.spawn_all_sessions().await;
        info!(
            "Finished creating clients, {} still running",
            self.barrier.count()
        );
        self.barrier.wait().await;
        info!("All sessions finished");
    }

    /// Create the sessions one after another
    async fn spawn_all_sessions(&self) {
        for slot in 0..self.config.client.count {
            let kind = self.select_transport();
            let connected = self.spawn_session(SessionId::new(slot), kind).await;

            // Failed slots skip the pause
            if connected && self.config.client.creation_delay && slot % CREATION_DELAY_EVERY == 0 {
                tokio::time::sleep(CREATION_DELAY).await;
            }
        }
    }

    fn select_transport(&self) -> TransportKind {
        match self.config.client.transport.fixed() {
            Some(kind) => kind,
            None => TransportKind::random(&mut rand::rng()),
        }
    }

    fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            topic: self.config.test.topic.clone(),
            max_messages: self.config.test.max_messages,
            connect_timeout: self.config.client.connect_timeout,
        }
    }

    /// Connect one session and start its delivery, or release its slot on failure.
    ///
    /// Returns whether the session connected.
    async fn spawn_session(&self, id: SessionId, kind: TransportKind) -> bool {
        debug!("Starting {} T{}", kind.client_type(), id);
        let transport = self.connector.transport(kind, id);
        let handler = self.handler_factory.as_ref().map(|factory| factory());
        let mut session = Session::new(
            id,
            self.session_settings(),
            transport,
            handler,
            Arc::clone(&self.completion),
        );

        match session.connect().await {
            Ok(client_id) => {
                info!("{} T{} connected as {}", kind.client_type(), id, client_id);
                self.metrics.record_connected(kind).await;
                // Registered before delivery starts so completion always finds it
                if let Some(handle) = session.handle() {
                    self.pool.insert(handle).await;
                }
                session.spawn();
                true
            }
            Err(e) => {
                error!("{} T{} failed: {}", kind.client_type(), id, e);
                self.metrics.record_connect_failure(kind).await;
                self.barrier.count_down();
                false
            }
        }
    }

    /// Print the final test report
    async fn print_final_report(&self) {
        let test_duration = match (self.test_start_time, self.test_end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        };
        self.metrics.print_report(test_duration).await;
    }
}

/// Removes finished sessions from the pool and releases their barrier slot
struct PoolCompletion {
    pool: SessionPool,
    barrier: Arc<CompletionBarrier>,
    metrics: Arc<RunMetrics>,
}

#[async_trait]
impl CompletionCallback for PoolCompletion {
    async fn session_finished(&self, outcome: SessionOutcome) {
        debug!(
            "{} T{} finished: {:?}",
            outcome.kind.client_type(),
            outcome.session_id,
            outcome.reason
        );
        self.pool.remove(outcome.session_id).await;
        self.metrics.record_finished(outcome).await;
        self.barrier.count_down();
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("Received Ctrl+C, closing all sessions..."),
        Err(e) => {
            error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

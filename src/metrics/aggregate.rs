//! Run-wide counters across all sessions

use crate::client::session::{CloseReason, SessionOutcome};
use crate::common::SessionId;
use crate::transport::TransportKind;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Per-transport session counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportTally {
    pub connected: u64,
    pub failed: u64,
    pub finished: u64,
}

/// Thread-safe metrics for one harness run
#[derive(Debug, Default)]
pub struct RunMetrics {
    pub sessions_requested: AtomicU64,
    pub sessions_connected: AtomicU64,
    pub connect_failures: AtomicU64,
    pub sessions_finished: AtomicU64,
    pub total_messages_received: AtomicU64,
    transports: Arc<RwLock<BTreeMap<TransportKind, TransportTally>>>,
    outcomes: Arc<RwLock<HashMap<SessionId, SessionOutcome>>>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_requested(&self, count: u32) {
        self.sessions_requested
            .fetch_add(u64::from(count), Ordering::Relaxed);
    }

    pub async fn record_connected(&self, kind: TransportKind) {
        self.sessions_connected.fetch_add(1, Ordering::Relaxed);
        self.transports.write().await.entry(kind).or_default().connected += 1;
    }

    pub async fn record_connect_failure(&self, kind: TransportKind) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
        self.transports.write().await.entry(kind).or_default().failed += 1;
    }

    pub async fn record_finished(&self, outcome: SessionOutcome) {
        self.sessions_finished.fetch_add(1, Ordering::Relaxed);
        self.total_messages_received
            .fetch_add(outcome.messages_received, Ordering::Relaxed);
        self.transports
            .write()
            .await
            .entry(outcome.kind)
            .or_default()
            .finished += 1;
        self.outcomes.write().await.insert(outcome.session_id, outcome);
    }

    /// Counts per transport, in a stable order
    pub async fn transport_tallies(&self) -> Vec<(TransportKind, TransportTally)> {
        self.transports
            .read()
            .await
            .iter()
            .map(|(kind, tally)| (*kind, *tally))
            .collect()
    }

    /// Finished sessions ordered by session id
    pub async fn outcomes(&self) -> Vec<SessionOutcome> {
        let mut outcomes: Vec<_> = self.outcomes.read().await.values().cloned().collect();
        outcomes.sort_by_key(|o| o.session_id);
        outcomes
    }

    /// Mean of the per-session average latencies of sessions that reached their quota
    pub async fn average_latency(&self) -> Option<Duration> {
        let outcomes = self.outcomes.read().await;
        let averages: Vec<Duration> = outcomes
            .values()
            .filter_map(|o| match &o.reason {
                CloseReason::QuotaReached(report) => Some(report.average),
                _ => None,
            })
            .collect();
        if averages.is_empty() {
            return None;
        }
        let count = u32::try_from(averages.len()).unwrap_or(u32::MAX);
        Some(averages.iter().sum::<Duration>() / count)
    }

    pub async fn quota_reached(&self) -> usize {
        self.outcomes
            .read()
            .await
            .values()
            .filter(|o| matches!(o.reason, CloseReason::QuotaReached(_)))
            .count()
    }
}

//! Per-session message counting and delta timing

use std::time::{Duration, Instant};

/// Latency statistics emitted when a session exceeds its quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyReport {
    /// The session's quota
    pub messages: u64,
    /// Time between the second message and the latest one
    pub total: Duration,
    /// `total / messages`
    pub average: Duration,
}

impl LatencyReport {
    /// One statistics line in the `<type> T<n> <id> : <max> in <total> Avg: <avg>` shape
    pub fn stats_line(&self, client_type: &str, thread_number: u32, client_id: &str) -> String {
        format!(
            "{} T{} {} : {} in {} Avg: {}",
            client_type,
            thread_number,
            client_id,
            self.messages,
            self.total.as_millis(),
            self.average.as_millis()
        )
    }
}

/// Message counters and delta timing for one session.
///
/// Only the session's own delivery task calls [`MessageTimer::record`].
#[derive(Debug, Clone, Default)]
pub struct MessageTimer {
    max_messages: u64,
    messages_received: u64,
    first_delta: Option<Instant>,
    last_delta: Option<Instant>,
}

impl MessageTimer {
    pub fn new(max_messages: u64) -> Self {
        Self {
            max_messages,
            ..Default::default()
        }
    }

    /// Count one inbound message received at `now`.
    ///
    /// Returns the report once the count exceeds a non-zero quota, which
    /// happens on message `max + 1`.
    pub fn record(&mut self, now: Instant) -> Option<LatencyReport> {
        self.messages_received += 1;
        if self.messages_received == 2 {
            self.first_delta = Some(now);
        }
        self.last_delta = Some(now);

        if self.max_messages != 0 && self.messages_received > self.max_messages {
            Some(self.report())
        } else {
            None
        }
    }

    fn report(&self) -> LatencyReport {
        let total = match (self.first_delta, self.last_delta) {
            (Some(first), Some(last)) => last.saturating_duration_since(first),
            _ => Duration::ZERO,
        };
        let divisor = u32::try_from(self.max_messages.max(1)).unwrap_or(u32::MAX);
        LatencyReport {
            messages: self.max_messages,
            total,
            average: total / divisor,
        }
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    pub fn max_messages(&self) -> u64 {
        self.max_messages
    }

    pub fn first_delta(&self) -> Option<Instant> {
        self.first_delta
    }

    pub fn last_delta(&self) -> Option<Instant> {
        self.last_delta
    }
}

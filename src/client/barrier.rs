//! Countdown the orchestrator waits on until every session has finished

use tokio::sync::watch;

/// Shared countdown decremented once per session slot
#[derive(Debug)]
pub struct CompletionBarrier {
    remaining: watch::Sender<usize>,
}

impl CompletionBarrier {
    pub fn new(count: usize) -> Self {
        let (remaining, _) = watch::channel(count);
        Self { remaining }
    }

    /// Decrement the count, never below zero
    pub fn count_down(&self) {
        self.remaining.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn count(&self) -> usize {
        *self.remaining.borrow()
    }

    /// Resolve once the count reaches zero
    pub async fn wait(&self) {
        let mut rx = self.remaining.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

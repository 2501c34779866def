//! Run summary output

use crate::client::session::CloseReason;
use crate::metrics::aggregate::RunMetrics;

use std::sync::atomic::Ordering;
use std::time::Duration;

impl RunMetrics {
    /// Print the end-of-run summary to stdout
    pub async fn print_report(&self, test_duration: Option<Duration>) {
        let requested = self.sessions_requested.load(Ordering::Relaxed);
        let connected = self.sessions_connected.load(Ordering::Relaxed);
        let failed = self.connect_failures.load(Ordering::Relaxed);
        let finished = self.sessions_finished.load(Ordering::Relaxed);
        let received = self.total_messages_received.load(Ordering::Relaxed);

        println!("\n📊 Swarm Stress Test Results");
        println!("═══════════════════════════════════════════════════════════════");

        println!("\n📈 Sessions:");
        if let Some(duration) = test_duration {
            println!("   Test Duration:    {:.2}s", duration.as_secs_f64());
        }
        println!("   Requested:        {}", requested);
        println!("   Connected:        {}", connected);
        println!("   Failed:           {}", failed);
        println!("   Finished:         {}", finished);
        println!("   Reached Quota:    {}", self.quota_reached().await);
        println!("   Messages:         {}", received);

        self.print_transport_breakdown().await;
        self.print_latency(test_duration, received).await;
        self.print_unfinished_reasons().await;

        println!("═══════════════════════════════════════════════════════════════");
    }

    async fn print_transport_breakdown(&self) {
        let tallies = self.transport_tallies().await;
        if tallies.is_empty() {
            return;
        }
        println!("\n🔌 Transports:");
        for (kind, tally) in tallies {
            println!(
                "   {:<17} {} connected, {} failed, {} finished",
                format!("{}:", kind.client_type()),
                tally.connected,
                tally.failed,
                tally.finished
            );
        }
    }

    async fn print_latency(&self, test_duration: Option<Duration>, received: u64) {
        println!("\n⚡ Delivery:");
        if let Some(duration) = test_duration {
            let seconds = duration.as_secs_f64();
            if seconds > 0.0 {
                println!("   Messages/sec:     {:.2}", received as f64 / seconds);
            }
        }
        match self.average_latency().await {
            Some(avg) => println!("   Avg Delta Gap:    {}ms", avg.as_millis()),
            None => println!("   Avg Delta Gap:    n/a (no session reached its quota)"),
        }
    }

    async fn print_unfinished_reasons(&self) {
        let outcomes = self.outcomes().await;
        let disconnected = outcomes
            .iter()
            .filter(|o| o.reason == CloseReason::ServerDisconnected)
            .count();
        let failures: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match &o.reason {
                CloseReason::Failed(e) => Some((o, e)),
                _ => None,
            })
            .collect();

        if disconnected == 0 && failures.is_empty() {
            return;
        }
        println!("\n⚠️  Early Terminations:");
        if disconnected > 0 {
            println!("   Server Disconnects: {}", disconnected);
        }
        for (outcome, error) in failures.iter().take(10) {
            println!(
                "   {} T{} {}: {}",
                outcome.kind.client_type(),
                outcome.session_id,
                outcome.client_id,
                error
            );
        }
        if failures.len() > 10 {
            println!("   ... and {} more", failures.len() - 10);
        }
    }
}

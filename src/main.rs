use std::process;
use swarm::client::ClientManager;
use swarm::config::Config;
use swarm::errors::{ErrorContext, Result};
use swarm::logging::init_logging;
use tracing::{error, info};

fn main() {
    // Configuration decides how the runtime is sized, so parse it first
    let config = match Config::from_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(config) {
        error!("Application failed: {}", e);
        process::exit(1);
    }
}

/// Main application logic
fn run(config: Config) -> Result<()> {
    init_logging(config.output.verbose)?;

    info!("🐝 Swarm - Pub/Sub Subscriber Stress Harness");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    config.print_summary();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .max_blocking_threads(config.max_blocking_threads())
        .enable_all()
        .build()
        .with_config_context("Failed to build the async runtime")?;

    runtime.block_on(async move {
        let mut client_manager = ClientManager::new(config);
        client_manager
            .run_stress_test()
            .await
            .map(|_| {
                info!("Stress test completed");
            })
            .map_err(|e| {
                error!("Stress test failed: {}", e);
                e
            })
    })
}

//! Tracing subscriber setup shared by both binaries

use crate::errors::{ErrorContext, Result};

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install the global subscriber: `swarm` at info (debug when verbose),
/// WebSocket and TLS internals capped at warn
pub fn init_logging(verbose: bool) -> Result<()> {
    let swarm_level = if verbose { "debug" } else { "info" };

    let mut filter = EnvFilter::from_default_env();
    for directive in [
        format!("swarm={}", swarm_level),
        "tokio_tungstenite=warn".to_string(),
        "tungstenite=warn".to_string(),
        "rustls=warn".to_string(),
    ] {
        filter = filter.add_directive(
            directive
                .parse()
                .with_config_context(&format!("Invalid filter directive '{}'", directive))?,
        );
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .with_config_context("Failed to set global default subscriber")?;

    if verbose {
        info!("Verbose logging enabled");
    }
    Ok(())
}

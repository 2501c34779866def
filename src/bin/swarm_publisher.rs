use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use swarm::errors::{ErrorContext, Result};
use swarm::logging::init_logging;
use swarm::publisher::{PublisherConfig, StressPublisher};
use tracing::{error, info};

/// Command line for the stress publisher
#[derive(Parser, Debug)]
#[command(
    name = "swarm-publisher",
    version,
    about = "Publishes numbered deltas on one topic over net, ssl and websocket listeners",
    long_about = None
)]
struct PublisherArgs {
    #[arg(long = "bind", value_name = "ADDR", default_value = "0.0.0.0")]
    bind: String,

    #[arg(long = "net-port", value_name = "PORT", default_value_t = 8080)]
    net_port: u16,

    #[arg(long = "http-port", value_name = "PORT", default_value_t = 8090)]
    http_port: u16,

    #[arg(long = "ssl-port", value_name = "PORT", default_value_t = 8443)]
    ssl_port: u16,

    #[arg(
        long = "tls-cert",
        value_name = "PEM",
        requires = "tls_key",
        help = "Certificate chain for the ssl listener"
    )]
    tls_cert: Option<PathBuf>,

    #[arg(
        long = "tls-key",
        value_name = "PEM",
        requires = "tls_cert",
        help = "Private key for the ssl listener"
    )]
    tls_key: Option<PathBuf>,

    #[arg(short = 't', long = "topic", value_name = "TOPIC", default_value = "Stress")]
    topic: String,

    #[arg(
        short = 'f',
        long = "frequency",
        value_name = "MS",
        default_value_t = 1000,
        help = "Milliseconds between deltas (0 disables the timer)"
    )]
    frequency: u64,

    #[arg(
        short = 's',
        long = "message-size",
        value_name = "CHARS",
        default_value_t = 0,
        help = "Payload size (0 sends the sample data unchanged)"
    )]
    message_size: usize,

    #[arg(
        short = 'b',
        long = "burst",
        value_name = "COUNT",
        default_value_t = 0,
        help = "Deltas sent to each subscriber right after the load message"
    )]
    burst: u64,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose logging")]
    verbose: bool,
}

impl From<PublisherArgs> for PublisherConfig {
    fn from(args: PublisherArgs) -> Self {
        Self {
            bind: args.bind,
            net_port: args.net_port,
            http_port: args.http_port,
            ssl_port: args.ssl_port,
            tls_cert: args.tls_cert,
            tls_key: args.tls_key,
            topic: args.topic,
            frequency: Duration::from_millis(args.frequency),
            message_size: args.message_size,
            burst: args.burst,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = PublisherArgs::parse();

    if let Err(e) = run(args).await {
        error!("Publisher failed: {}", e);
        process::exit(1);
    }
}

async fn run(args: PublisherArgs) -> Result<()> {
    init_logging(args.verbose)?;

    let publisher = StressPublisher::start(args.into()).await?;

    tokio::signal::ctrl_c()
        .await
        .with_config_context("Failed to listen for ctrl-c")?;
    info!("Received ctrl-c, stopping publisher...");

    publisher.stop().await;
    Ok(())
}

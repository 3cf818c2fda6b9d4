use std::time::Duration;

use clap::Parser;
use eventgate::prelude::*;
use tracing_subscriber::EnvFilter;

/// Real-time event distribution server.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to accept WebSocket connections on.
    #[arg(long, env = "EVENTS_ADDRESS", default_value = DEFAULT_BIND_ADDR)]
    address: String,

    /// Redis instance the backing application publishes events to.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379/")]
    redis_url: String,

    /// Pub/sub channel carrying domain events.
    #[arg(long, env = "REDIS_CHANNEL", default_value = DEFAULT_CHANNEL)]
    redis_channel: String,

    /// Node id stamped into session ids; unique per running node.
    #[arg(long, env = "NODE_ID", default_value_t = 0)]
    node_id: u16,

    /// Keep-alive interval in milliseconds. Also bounds how long a
    /// dropped session stays resumable.
    #[arg(long, env = "PING_INTERVAL_MS", default_value_t = 45_000)]
    ping_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), EventgateError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let session_config = SessionConfig::with_ping_interval(Duration::from_millis(cli.ping_interval_ms));

    let source = RedisSource::connect(&cli.redis_url, &cli.redis_channel).await?;
    let server = EventgateServer::builder()
        .bind(&cli.address)
        .node_id(cli.node_id)
        .session_config(session_config)
        .build(source)
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
}

use anyhow::Result;
use admission_gate::config::Config;
use admission_gate::server::Server;
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "admission-gate", version, about = "Sliding-window admission control service")]
struct Cli {
    /// Override BIND_ADDR
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Override LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,

    /// Validate configuration, print it and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("admission_gate={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Misconfiguration must stop the service before it binds.
    let limiter = config
        .limiter_config()
        .map_err(|e| anyhow::anyhow!("Invalid rate limit configuration: {}", e))?;
    let redis_url = config
        .redis_url()
        .map_err(|e| anyhow::anyhow!("Invalid rate limit configuration: {}", e))?;

    if cli.check_config {
        println!("bind_addr = {}", config.bind_addr);
        println!("shared_store = {}", redis_url.unwrap_or("(none)"));
        println!("{}", serde_json::to_string_pretty(&limiter)?);
        return Ok(());
    }

    tracing::info!("Starting admission gate");
    tracing::info!(
        "Configuration: bind_addr={}, window={}s, quotas={}, shared_store={}",
        config.bind_addr,
        limiter.window_size.as_secs(),
        limiter.quotas,
        if redis_url.is_some() { "configured" } else { "none" }
    );

    let server = Server::new(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

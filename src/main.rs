use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{ArgAction, Parser};
use convoy_relay::logging::{init_logging, LogFormat};
use convoy_relay::{BroadcastPolicy, ConvoyServer, RegistryConfig, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "convoy-server")]
#[command(about = "Real-time convoy position relay", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Position fan-out: "snapshot" (whole convoy to everyone) or "delta"
    #[arg(long, env = "CONVOY_BROADCAST_POLICY", default_value = "snapshot")]
    broadcast_policy: BroadcastPolicy,

    /// Create the development convoy "test123" at startup
    #[arg(long, env = "CONVOY_SEED_DEFAULT", default_value_t = true, action = ArgAction::Set)]
    seed_default_convoy: bool,

    /// Maximum concurrent WebSocket connections (0 = unlimited)
    #[arg(long, env = "CONVOY_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Frames queued per connection before new ones are dropped
    #[arg(long, env = "CONVOY_OUTBOUND_QUEUE", default_value_t = 256)]
    outbound_queue: usize,

    /// Seconds before a detached member's position is forgotten
    #[arg(long, env = "CONVOY_STALE_POSITION_SECS", default_value_t = 1800)]
    stale_position_secs: u64,

    /// Seconds between cleanup runs
    #[arg(long, env = "CONVOY_CLEANUP_INTERVAL_SECS", default_value_t = 60)]
    cleanup_interval_secs: u64,

    /// Do not send CORS headers
    #[arg(long, env = "CONVOY_DISABLE_CORS")]
    disable_cors: bool,

    /// Log level directive (overridden by RUST_LOG)
    #[arg(long, env = "CONVOY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format: "human" or "json"
    #[arg(long, env = "CONVOY_LOG_FORMAT", default_value = "human")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_logging(args.log_format, &args.log_level)?;

    let mut config = ServerConfig::with_addr(SocketAddr::new(args.host, args.port))
        .max_connections(args.max_connections)
        .outbound_queue_capacity(args.outbound_queue)
        .broadcast_policy(args.broadcast_policy);
    if args.disable_cors {
        config = config.disable_cors();
    }

    let registry_config = RegistryConfig::default()
        .seed_default_convoy(args.seed_default_convoy)
        .stale_position_ttl(Duration::from_secs(args.stale_position_secs))
        .cleanup_interval(Duration::from_secs(args.cleanup_interval_secs));

    let server = ConvoyServer::with_registry_config(config, registry_config);

    tracing::info!(
        addr = %server.bind_addr(),
        policy = %args.broadcast_policy,
        "Starting convoy server"
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

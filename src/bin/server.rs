//! Message keeper server binary
//!
//! Run with: cargo run --bin message-keeper-server -- --help

use anyhow::Result;
use clap::Parser;
use message_keeper::server::{run_server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "message-keeper-server")]
#[command(about = "Serves save/find over gRPC, backed by a SQLite table")]
struct Args {
    /// Port the name registry listens on
    registry_port: u16,

    /// Host name advertised to clients for the message service
    server_host: String,

    /// Port the message service listens on
    server_port: u16,

    /// SQLite database URL
    #[arg(
        long,
        env = "MESSAGE_KEEPER_DATABASE_URL",
        default_value = "sqlite://messages.db"
    )]
    database_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = ServerConfig {
        registry_port: args.registry_port,
        server_host: args.server_host,
        server_port: args.server_port,
        database_url: args.database_url,
    };

    tracing::info!("=== Message Keeper Server Configuration ===");
    tracing::info!("Registry port: {}", config.registry_port);
    tracing::info!("Advertised endpoint: {}", config.advertised_endpoint());
    tracing::info!("Database: {}", config.database_url);
    tracing::info!("===========================================");

    run_server(config).await
}

//! Message keeper client binary
//!
//! Run with: cargo run --bin message-keeper-client -- --help

use anyhow::Result;
use clap::Parser;
use message_keeper::client::{ClientConfig, MessageFeeder, RemoteMessageKeeper};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "message-keeper-client")]
#[command(about = "Sends each line of a file to the message keeper server")]
struct Args {
    /// Host the name registry runs on
    registry_host: String,

    /// Port the name registry listens on
    registry_port: u16,

    /// File whose lines are sent as messages
    messages_file_path: PathBuf,

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

    let config = ClientConfig {
        registry_host: args.registry_host,
        registry_port: args.registry_port,
        ..Default::default()
    };

    let keeper = RemoteMessageKeeper::locate(&config).await?;
    let mut feeder = MessageFeeder::new(keeper, rand::thread_rng());

    let summary = feeder.process_file_lines(&args.messages_file_path).await?;
    tracing::info!("Sent {} messages", summary.lines);

    Ok(())
}

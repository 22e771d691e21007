//! Logging plugin that accepts every call and collects nothing.
//!
//! Useful where the task driver collects output itself, and as a real
//! process for exercising launch, reattach and kill end to end.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use logmon_common::SECRET_ENV;
use logmon_plugin::ipc::PlatformIpc;
use logmon_plugin::server::serve;
use logmon_plugin::NoopLoggingPlugin;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "logmon-noop-plugin", version)]
#[command(about = "Logging plugin that discards task output")]
struct Cli {
    /// Address to listen on, chosen by the agent
    #[arg(long)]
    socket: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let secret =
        std::env::var(SECRET_ENV).with_context(|| format!("{SECRET_ENV} is not set"))?;
    info!(pid = std::process::id(), "noop logging plugin starting");

    // Runs until the agent kills the process.
    serve::<PlatformIpc>(
        &cli.socket,
        Arc::new(NoopLoggingPlugin::new()),
        secret,
        CancellationToken::new(),
    )
    .await
    .with_context(|| format!("serving on {}", cli.socket))
}

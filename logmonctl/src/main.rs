//! logmonctl
//!
//! Launch a logging plugin by hand, or inspect and tear down one a task hook
//! left behind, using the same hook state the task runner persists.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use logmon_common::load_settings;
use logmon_hook::state::{reattach_descriptor_from_state, state_with_descriptor};
use logmon_hook::{HookState, LOGMON_PLUGIN_NAME};
use logmon_manager::{LoggingManager, LoggingPluginHandle, ProcessCatalog};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "logmonctl", version)]
#[command(about = "Manage logging plugin processes")]
struct Cli {
    /// Settings file (or use LOGMON_CONFIG env var)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch a plugin and print hook state that reattaches to it
    Launch {
        #[arg(long, default_value = LOGMON_PLUGIN_NAME)]
        name: String,
    },
    /// Reattach from a hook state file and print the plugin's capabilities
    Capabilities {
        #[arg(long)]
        state: PathBuf,
        #[arg(long, default_value = LOGMON_PLUGIN_NAME)]
        name: String,
    },
    /// Reattach from a hook state file, stop collection and kill the plugin
    Stop {
        #[arg(long)]
        state: PathBuf,
        #[arg(long, default_value = LOGMON_PLUGIN_NAME)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("LOGMON_CONFIG").ok().map(PathBuf::from));
    let settings = load_settings(config_path.as_deref());
    debug!(runtime_dir = %settings.runtime_dir.display(), "loaded settings");

    let manager = LoggingManager::new(Arc::new(ProcessCatalog::new(settings)));
    let outcome = match cli.command {
        Command::Launch { name } => launch(&manager, &name).await,
        Command::Capabilities { state, name } => capabilities(&manager, &state, &name).await,
        Command::Stop { state, name } => stop(&manager, &state, &name).await,
    };
    manager.shutdown();
    outcome
}

async fn launch(manager: &LoggingManager, name: &str) -> Result<()> {
    manager.run();
    let handle = manager
        .dispense(name, None)
        .await
        .with_context(|| format!("launching plugin {name}"))?;

    let descriptor = handle
        .reattach_descriptor()
        .ok_or_else(|| anyhow!("plugin {name} did not report a reattach descriptor"))?;
    info!(plugin = name, pid = descriptor.pid, addr = %descriptor.addr, "plugin running");

    let state = state_with_descriptor(&descriptor)?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

async fn capabilities(manager: &LoggingManager, state_path: &Path, name: &str) -> Result<()> {
    let handle = reattach(manager, state_path, name).await?;
    let caps = handle
        .capabilities()
        .await
        .with_context(|| format!("querying capabilities of plugin {name}"))?;
    println!("{}", serde_json::to_string_pretty(&caps)?);
    Ok(())
}

async fn stop(manager: &LoggingManager, state_path: &Path, name: &str) -> Result<()> {
    let handle = reattach(manager, state_path, name).await?;
    if let Err(err) = handle.stop().await {
        warn!(plugin = name, error = %err, "stop failed; killing anyway");
    }
    handle.kill();
    info!(plugin = name, "plugin stopped");
    Ok(())
}

async fn reattach(
    manager: &LoggingManager,
    state_path: &Path,
    name: &str,
) -> Result<Arc<LoggingPluginHandle>> {
    let raw = std::fs::read_to_string(state_path)
        .with_context(|| format!("reading hook state {}", state_path.display()))?;
    let state: HookState = serde_json::from_str(&raw)
        .with_context(|| format!("parsing hook state {}", state_path.display()))?;

    let descriptor = reattach_descriptor_from_state(Some(&state))?
        .ok_or_else(|| anyhow!("{} holds no reattach descriptor", state_path.display()))?;

    manager
        .dispense(name, Some(&descriptor))
        .await
        .with_context(|| format!("reattaching to plugin {name} (pid {})", descriptor.pid))
}

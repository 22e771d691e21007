use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use logmon_common::ReattachDescriptor;
use logmon_plugin::LoggingPlugin;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginType {
    Logging,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Logging => "logging",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown {plugin_type} plugin '{name}'")]
    UnknownPlugin {
        name: String,
        plugin_type: PluginType,
    },
    #[error("failed to launch plugin '{name}': {reason}")]
    Launch { name: String, reason: String },
    #[error("failed to reattach to plugin '{name}' (pid {pid}): {reason}")]
    Reattach {
        name: String,
        pid: u32,
        reason: String,
    },
    #[error("plugin catalog cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One plugin process as seen by the catalog.
pub trait PluginInstance: Send + Sync {
    /// Proxy for the plugin's capability set.
    fn plugin(&self) -> Arc<dyn LoggingPlugin>;

    /// Terminate the process and release its transport. Idempotent.
    fn kill(&self);

    /// Non-blocking liveness probe. True once the process is gone or killed.
    fn exited(&self) -> bool;

    fn reattach_descriptor(&self) -> Option<ReattachDescriptor>;
}

/// Launches or reattaches plugin processes.
#[async_trait]
pub trait PluginCatalog: Send + Sync {
    /// Names of the plugins of `plugin_type` this catalog can launch.
    fn available(&self, plugin_type: PluginType) -> Vec<String>;

    /// Launch `name` when `reattach` is `None`, otherwise reconnect to the
    /// process it describes. Implementations abandon the attempt once
    /// `cancel` fires.
    async fn dispense(
        &self,
        name: &str,
        plugin_type: PluginType,
        reattach: Option<&ReattachDescriptor>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn PluginInstance>, CatalogError>;
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use logmon_common::{Capabilities, LogConfig, ReattachDescriptor};
use logmon_plugin::{LoggingPlugin, PluginError};
use tracing::debug;

use crate::catalog::PluginInstance;

/// Lifecycle of a hook's plugin slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unlaunched,
    Running,
    Exited,
}

/// A dispensed logging plugin: the RPC proxy plus the process behind it.
///
/// Exclusively owned by one task hook. The manager creates handles but never
/// touches them afterwards.
pub struct LoggingPluginHandle {
    name: String,
    plugin: Arc<dyn LoggingPlugin>,
    instance: Box<dyn PluginInstance>,
    killed: AtomicBool,
}

impl LoggingPluginHandle {
    pub fn new(name: impl Into<String>, instance: Box<dyn PluginInstance>) -> Self {
        Self {
            name: name.into(),
            plugin: instance.plugin(),
            instance,
            killed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn start(&self, cfg: &LogConfig) -> Result<(), PluginError> {
        self.plugin.start(cfg).await
    }

    pub async fn stop(&self) -> Result<(), PluginError> {
        self.plugin.stop().await
    }

    pub async fn capabilities(&self) -> Result<Capabilities, PluginError> {
        self.plugin.capabilities().await
    }

    pub fn exited(&self) -> bool {
        self.killed.load(Ordering::SeqCst) || self.instance.exited()
    }

    pub fn state(&self) -> HandleState {
        if self.exited() {
            HandleState::Exited
        } else {
            HandleState::Running
        }
    }

    /// Terminate the plugin process. The handle reports exited before the
    /// process is torn down; later calls are no-ops.
    pub fn kill(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(plugin = %self.name, "killing logging plugin");
        self.instance.kill();
    }

    pub fn reattach_descriptor(&self) -> Option<ReattachDescriptor> {
        self.instance.reattach_descriptor()
    }
}

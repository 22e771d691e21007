use std::sync::Mutex;

use async_trait::async_trait;
use logmon_common::{Capabilities, LogConfig};
use tracing::debug;

use crate::error::PluginError;

/// Capability set implemented by logging plugins.
///
/// Implemented in-process by the plugin itself and on the agent side by the
/// RPC proxy. `start` is not idempotent; callers issue it once per launch.
#[async_trait]
pub trait LoggingPlugin: Send + Sync {
    /// Begin collecting logs per `cfg`. Returns once collection has started.
    async fn start(&self, cfg: &LogConfig) -> Result<(), PluginError>;

    /// Cease collection. The plugin process keeps running.
    async fn stop(&self) -> Result<(), PluginError>;

    async fn capabilities(&self) -> Result<Capabilities, PluginError>;
}

/// In-process plugin that accepts every call and remembers the active config.
#[derive(Debug, Default)]
pub struct NoopLoggingPlugin {
    active: Mutex<Option<LogConfig>>,
}

impl NoopLoggingPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config passed to the last `start`, cleared by `stop`.
    pub fn active_config(&self) -> Option<LogConfig> {
        self.active.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl LoggingPlugin for NoopLoggingPlugin {
    async fn start(&self, cfg: &LogConfig) -> Result<(), PluginError> {
        debug!(log_dir = %cfg.log_dir, "noop logging plugin started");
        let mut active = self
            .active
            .lock()
            .map_err(|_| PluginError::Transport("plugin state poisoned".into()))?;
        *active = Some(cfg.clone());
        Ok(())
    }

    async fn stop(&self) -> Result<(), PluginError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| PluginError::Transport("plugin state poisoned".into()))?;
        *active = None;
        Ok(())
    }

    async fn capabilities(&self) -> Result<Capabilities, PluginError> {
        Ok(Capabilities::default())
    }
}

use std::sync::Arc;

use logmon_common::ReattachDescriptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, PluginCatalog, PluginType};
use crate::handle::LoggingPluginHandle;

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("logging plugin manager is shut down")]
    ShutDown,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Node-wide dispenser of logging plugins.
///
/// Unlike device or driver plugins, a logging plugin is not monitored after
/// launch. If the agent exits it keeps running next to its task and a later
/// agent reattaches to it.
///
/// Shared by every task hook on the node. Dispense calls are independent of
/// each other; there is no node-wide lock around launches.
pub struct LoggingManager {
    catalog: Arc<dyn PluginCatalog>,
    cancel: CancellationToken,
}

impl LoggingManager {
    pub fn new(catalog: Arc<dyn PluginCatalog>) -> Self {
        Self {
            catalog,
            cancel: CancellationToken::new(),
        }
    }

    pub fn plugin_type(&self) -> PluginType {
        PluginType::Logging
    }

    /// Check that the catalog can serve logging plugins at all. With none
    /// available the manager shuts itself down so hooks fail fast.
    pub fn run(&self) {
        let plugins = self.catalog.available(self.plugin_type());
        if plugins.is_empty() {
            warn!("there are no logging plugins");
            self.shutdown();
            return;
        }
        info!(plugins = ?plugins, "logging plugin manager ready");
    }

    /// Cancel in-flight launches and refuse further dispensing.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Launch `name`, or reattach to the process `reattach` describes.
    ///
    /// Catalog errors are returned untouched; retry policy belongs to the
    /// caller. Shutdown during a launch is observed by the catalog, which
    /// reaps the half-started process before reporting it as cancelled.
    pub async fn dispense(
        &self,
        name: &str,
        reattach: Option<&ReattachDescriptor>,
    ) -> Result<Arc<LoggingPluginHandle>, ManagerError> {
        if self.cancel.is_cancelled() {
            return Err(ManagerError::ShutDown);
        }

        debug!(
            plugin = name,
            reattach = reattach.is_some(),
            "dispensing logging plugin"
        );
        let instance = match self
            .catalog
            .dispense(name, self.plugin_type(), reattach, &self.cancel)
            .await
        {
            Ok(instance) => instance,
            Err(CatalogError::Cancelled) => return Err(ManagerError::ShutDown),
            Err(err) => return Err(err.into()),
        };

        Ok(Arc::new(LoggingPluginHandle::new(name, instance)))
    }
}

impl Drop for LoggingManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

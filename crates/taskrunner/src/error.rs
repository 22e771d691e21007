use logmon_common::DescriptorError;
use logmon_manager::ManagerError;
use logmon_plugin::PluginError;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// No plugin could be launched. The plugin may have crashed on start, so
    /// the task runner retries the whole hook.
    #[error("failed to launch logging plugin: {0}")]
    Launch(#[source] ManagerError),
    #[error("failed to reattach to logging plugin: {0}")]
    Reattach(#[source] ManagerError),
    #[error(transparent)]
    Plugin(PluginError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

impl HookError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HookError::Launch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logmon_manager::CatalogError;

    #[test]
    fn test_only_launch_failures_are_recoverable() {
        let launch = HookError::Launch(ManagerError::Catalog(CatalogError::Launch {
            name: "logmon".into(),
            reason: "exec format error".into(),
        }));
        assert!(launch.is_recoverable());
        assert!(launch.to_string().contains("exec format error"));

        assert!(!HookError::Plugin(PluginError::PluginShutdown).is_recoverable());
        assert!(!HookError::Reattach(ManagerError::ShutDown).is_recoverable());
    }

    #[test]
    fn test_plugin_errors_surface_verbatim() {
        let err = HookError::Plugin(PluginError::Unavailable("connection refused".into()));
        assert_eq!(
            err.to_string(),
            PluginError::Unavailable("connection refused".into()).to_string()
        );
    }
}

/// Behaviour a driver reports about itself to the task runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InternalCapabilities {
    /// The driver collects task output itself; no logging plugin is needed.
    pub disable_log_collection: bool,
}

/// The slice of a task driver the logging hook consults.
pub trait TaskDriver: Send + Sync {
    /// Drivers without internal capabilities keep the default.
    fn internal_capabilities(&self) -> Option<InternalCapabilities> {
        None
    }
}

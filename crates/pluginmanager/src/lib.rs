//! Logging plugin manager
//!
//! Hands out [`LoggingPluginHandle`]s to task hooks. A handle wraps one plugin
//! process, either freshly launched or reattached from a descriptor persisted
//! by a previous agent run. The [`PluginCatalog`] seam performs the OS-level
//! launch and reattach; [`ProcessCatalog`] is the implementation backed by
//! plugin binaries declared in settings.

pub mod catalog;
pub mod handle;
pub mod manager;
pub mod process;

pub use catalog::{CatalogError, PluginCatalog, PluginInstance, PluginType};
pub use handle::{HandleState, LoggingPluginHandle};
pub use manager::{LoggingManager, ManagerError};
pub use process::ProcessCatalog;

// # -----------------------------
// # crates/common/src/lib.rs
// # -----------------------------
pub mod config;
pub mod descriptor;
pub mod log_config;
pub mod process_utils;

pub use config::{
    load_settings, LogmonSettings, PluginBinaryConfig, RetrySettings, SettingsError, SECRET_ENV,
    SOCKET_FLAG,
};
pub use descriptor::{DescriptorError, Network, ReattachDescriptor, PLUGIN_PROTOCOL_VERSION};
pub use log_config::{Capabilities, LogConfig, CAPABILITIES_VERSION};

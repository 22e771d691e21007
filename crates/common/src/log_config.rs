use serde::{Deserialize, Serialize};

/// Current revision of the capability contract.
pub const CAPABILITIES_VERSION: u32 = 1;

/// Per-task instructions handed to a logging plugin on `Start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    /// Host path where logs are written.
    pub log_dir: String,
    /// File name, relative to `log_dir`, receiving stdout.
    pub stdout_file_name: String,
    /// File name, relative to `log_dir`, receiving stderr.
    pub stderr_file_name: String,
    /// Host path of the stdout pipe.
    pub stdout_fifo: String,
    /// Host path of the stderr pipe.
    pub stderr_fifo: String,
    /// Rotated files kept per stream.
    pub max_files: u32,
    /// Size in MB at which a log file is rotated.
    pub max_file_size_mb: u32,
}

/// Features advertised by a logging plugin.
///
/// No features are negotiated yet. The struct carries a version so that new
/// fields can be added later; unknown fields are ignored on decode and missing
/// ones fall back to their defaults, which keeps old plugins compatible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Capabilities {
    #[serde(default = "default_capabilities_version")]
    pub version: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            version: CAPABILITIES_VERSION,
        }
    }
}

fn default_capabilities_version() -> u32 {
    CAPABILITIES_VERSION
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_START_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 1_000;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Agent-side settings for launching and talking to logging plugins.
#[derive(Debug, Clone, Deserialize)]
pub struct LogmonSettings {
    /// Directory holding plugin sockets.
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub plugins: HashMap<String, PluginBinaryConfig>,
}

impl Default for LogmonSettings {
    fn default() -> Self {
        Self {
            runtime_dir: default_runtime_dir(),
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
            retry: RetrySettings::default(),
            plugins: HashMap::new(),
        }
    }
}

impl LogmonSettings {
    /// Parse settings from TOML, dropping plugin entries that fail validation.
    pub fn from_toml_str(contents: &str) -> Result<Self, SettingsError> {
        let mut settings: LogmonSettings = toml::from_str(contents)?;
        settings.plugins.retain(|name, cfg| match cfg.validate() {
            Ok(()) => true,
            Err(reason) => {
                warn!("Plugin config '{}' skipped: {}", name, reason);
                false
            }
        });
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

/// Bound on local retries when a plugin transport drops during `Start`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    /// Extra attempts after the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl RetrySettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Flag the agent passes to a launched plugin naming the address to listen on.
pub const SOCKET_FLAG: &str = "--socket";

/// Environment variable carrying the base64 HMAC secret to a launched plugin.
pub const SECRET_ENV: &str = "LOGMON_PLUGIN_SECRET";

/// How to launch one plugin binary.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginBinaryConfig {
    pub binary: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl PluginBinaryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.binary.trim().is_empty() {
            return Err("binary must not be empty".into());
        }
        if self.args.iter().any(|arg| arg == SOCKET_FLAG) {
            return Err(format!("{SOCKET_FLAG} is reserved for the agent"));
        }
        Ok(())
    }
}

/// Load settings from `path`, falling back to defaults when the file is
/// missing or malformed.
pub fn load_settings(path: Option<&Path>) -> LogmonSettings {
    let Some(path) = path else {
        return LogmonSettings::default();
    };

    match LogmonSettings::from_path(path) {
        Ok(settings) => {
            if settings.plugins.is_empty() {
                warn!(
                    "No plugin entries found in {}. Logging plugins disabled.",
                    path.display()
                );
            }
            settings
        }
        Err(err) => {
            warn!("Failed to load {}: {}", path.display(), err);
            LogmonSettings::default()
        }
    }
}

fn default_runtime_dir() -> PathBuf {
    std::env::temp_dir().join("logmon")
}

fn default_start_timeout_ms() -> u64 {
    DEFAULT_START_TIMEOUT_MS
}

fn default_rpc_timeout_secs() -> u64 {
    DEFAULT_RPC_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

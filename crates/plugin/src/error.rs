use std::io;
use std::time::Duration;

/// Failure of a call against a logging plugin.
///
/// `Unavailable` and `PluginShutdown` form the transport-shutdown class: the
/// plugin process is gone or unreachable, and a freshly launched plugin may
/// succeed. Every other variant is a durable failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    #[error("plugin transport unavailable: {0}")]
    Unavailable(String),
    #[error("plugin shut down")]
    PluginShutdown,
    #[error("plugin call {call} timed out after {timeout:?}")]
    Timeout {
        call: &'static str,
        timeout: Duration,
    },
    #[error("plugin rejected {call}: {message}")]
    Remote { call: &'static str, message: String },
    #[error("invalid plugin response: {0}")]
    InvalidResponse(String),
    #[error("plugin transport error: {0}")]
    Transport(String),
}

impl PluginError {
    /// True when the plugin process went away mid-call.
    pub fn is_transport_shutdown(&self) -> bool {
        matches!(self, PluginError::Unavailable(_) | PluginError::PluginShutdown)
    }
}

impl From<io::Error> for PluginError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => PluginError::Unavailable(err.to_string()),
            _ => PluginError::Transport(err.to_string()),
        }
    }
}

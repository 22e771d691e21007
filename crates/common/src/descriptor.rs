//! Reattachment descriptors.
//!
//! A descriptor records everything a fresh agent process needs to resume
//! talking to a plugin subprocess it did not launch: where the plugin listens,
//! which pid owns the listener, which wire protocol it speaks and the shared
//! secret used to sign messages. Descriptors are persisted as JSON inside hook
//! state, so the encoding is part of the on-disk contract.

use serde::{Deserialize, Serialize};

/// Wire protocol spoken between the agent and logging plugins.
pub const PLUGIN_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("invalid reattach descriptor: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to encode reattach descriptor: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Transport family of the plugin listener.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Unix,
    Pipe,
}

impl Network {
    /// Listener family used by plugins launched on this platform.
    pub fn native() -> Self {
        if cfg!(windows) {
            Network::Pipe
        } else {
            Network::Unix
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReattachDescriptor {
    pub network: Network,
    pub addr: String,
    pub pid: u32,
    pub protocol_version: u32,
    /// Base64 HMAC key shared with the plugin at launch.
    pub secret: String,
}

impl ReattachDescriptor {
    pub fn to_json(&self) -> Result<String, DescriptorError> {
        serde_json::to_string(self).map_err(DescriptorError::Encode)
    }

    pub fn from_json(raw: &str) -> Result<Self, DescriptorError> {
        serde_json::from_str(raw).map_err(DescriptorError::Parse)
    }
}

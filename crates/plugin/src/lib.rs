//! Logging plugin contract
//!
//! A logging plugin collects a task's stdout/stderr from a pair of pipes and
//! writes them to rotated files. This crate defines the contract between the
//! agent and such a plugin, and the bridge that carries it across a process
//! boundary:
//!
//! - [`LoggingPlugin`] is the capability set, implemented in-process by the
//!   plugin itself and by [`RpcClient`] on the agent side.
//! - [`server::serve`] adapts a [`LoggingPlugin`] to the wire protocol.
//! - [`PluginError`] classifies failures so callers can tell a dead transport
//!   from a genuine application error.

pub mod client;
pub mod error;
pub mod ipc;
pub mod plugin;
pub mod server;
pub mod wire;

pub use client::{RpcClient, LOGGING_RPC_TIMEOUT};
pub use error::PluginError;
pub use plugin::{LoggingPlugin, NoopLoggingPlugin};

pub use logmon_common::{SECRET_ENV, SOCKET_FLAG};

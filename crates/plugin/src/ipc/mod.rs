//! Local transports between the agent and plugin processes.
//!
//! Plugins listen on a Unix domain socket, or a named pipe on Windows. Every
//! RPC opens its own connection, so a plugin that restarted behind the same
//! address is picked up without reconnect logic.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

#[async_trait]
pub trait IpcBackend: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    type Listener: IpcListener<Stream = Self::Stream> + Send + 'static;

    async fn bind(addr: &str) -> io::Result<Self::Listener>;
    async fn connect(addr: &str) -> io::Result<Self::Stream>;
}

#[async_trait]
pub trait IpcListener: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> io::Result<Self::Stream>;

    /// Address agents connect to, as it appears in a reattach descriptor.
    fn endpoint(&self) -> String;
}

#[cfg(unix)]
pub mod unix;

#[cfg(windows)]
pub mod windows;

/// Transport used by plugins on this platform.
#[cfg(unix)]
pub type PlatformIpc = unix::UnixIpcBackend;

#[cfg(windows)]
pub type PlatformIpc = windows::PipeIpcBackend;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::windows::named_pipe::{
    ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
};

use super::{IpcBackend, IpcListener};

const PIPE_PREFIX: &str = r"\\.\pipe\";

// Raised while the plugin has no idle pipe instance for the agent.
const ERROR_PIPE_BUSY: i32 = 231;
const CONNECT_ATTEMPTS: usize = 20;
const CONNECT_BACKOFF: Duration = Duration::from_millis(25);

pub struct PipeIpcBackend;

/// Plugin side of a named pipe. One instance is always left waiting so an
/// agent that reattaches finds the plugin listening.
pub struct PipeIpcListener {
    name: String,
    idle: NamedPipeServer,
}

/// A connected agent or plugin end of the pipe.
pub enum PluginPipe {
    Plugin(NamedPipeServer),
    Agent(NamedPipeClient),
}

macro_rules! forward {
    ($self:ident, $pipe:ident => $call:expr) => {
        match $self.get_mut() {
            PluginPipe::Plugin($pipe) => $call,
            PluginPipe::Agent($pipe) => $call,
        }
    };
}

impl AsyncRead for PluginPipe {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        forward!(self, pipe => Pin::new(pipe).poll_read(cx, buf))
    }
}

impl AsyncWrite for PluginPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        forward!(self, pipe => Pin::new(pipe).poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        forward!(self, pipe => Pin::new(pipe).poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        forward!(self, pipe => Pin::new(pipe).poll_shutdown(cx))
    }
}

#[async_trait]
impl IpcBackend for PipeIpcBackend {
    type Stream = PluginPipe;
    type Listener = PipeIpcListener;

    async fn bind(addr: &str) -> io::Result<Self::Listener> {
        let name = pipe_name(addr);
        // A second plugin claiming the same name is refused.
        let idle = ServerOptions::new()
            .first_pipe_instance(true)
            .create(&name)?;
        Ok(PipeIpcListener { name, idle })
    }

    async fn connect(addr: &str) -> io::Result<Self::Stream> {
        let name = pipe_name(addr);
        for _ in 0..CONNECT_ATTEMPTS {
            match ClientOptions::new().open(&name) {
                Ok(client) => return Ok(PluginPipe::Agent(client)),
                Err(err) if err.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                    tokio::time::sleep(CONNECT_BACKOFF).await;
                }
                Err(err) => return Err(err),
            }
        }
        ClientOptions::new().open(&name).map(PluginPipe::Agent)
    }
}

#[async_trait]
impl IpcListener for PipeIpcListener {
    type Stream = PluginPipe;

    async fn accept(&mut self) -> io::Result<Self::Stream> {
        self.idle.connect().await?;
        let next = ServerOptions::new().create(&self.name)?;
        Ok(PluginPipe::Plugin(std::mem::replace(&mut self.idle, next)))
    }

    fn endpoint(&self) -> String {
        self.name.clone()
    }
}

/// Descriptors carry full pipe paths; a bare name is placed under the local
/// pipe namespace.
fn pipe_name(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(PIPE_PREFIX) {
        addr.to_string()
    } else {
        format!("{PIPE_PREFIX}{addr}")
    }
}

use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::net::{UnixListener, UnixStream};
use tracing::debug;

use super::{IpcBackend, IpcListener};

pub struct UnixIpcBackend;

/// Listening plugin socket. The socket file is removed on drop so agents see
/// a stopped plugin as unavailable rather than refusing connections.
pub struct UnixIpcListener {
    inner: UnixListener,
    path: PathBuf,
}

#[async_trait]
impl IpcBackend for UnixIpcBackend {
    type Stream = UnixStream;
    type Listener = UnixIpcListener;

    async fn bind(addr: &str) -> io::Result<Self::Listener> {
        let path = PathBuf::from(addr);
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        clear_stale_socket(&path)?;

        let inner = UnixListener::bind(&path)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        Ok(UnixIpcListener { inner, path })
    }

    async fn connect(addr: &str) -> io::Result<Self::Stream> {
        UnixStream::connect(addr).await
    }
}

#[async_trait]
impl IpcListener for UnixIpcListener {
    type Stream = UnixStream;

    async fn accept(&mut self) -> io::Result<Self::Stream> {
        self.inner.accept().await.map(|(stream, _)| stream)
    }

    fn endpoint(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for UnixIpcListener {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %err, "failed to remove plugin socket");
        }
    }
}

/// A crashed plugin leaves its socket behind and that blocks bind. Anything
/// other than a socket at `path` is left alone.
fn clear_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(path),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        )),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

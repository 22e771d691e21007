//! Catalog backed by plugin binaries declared in [`LogmonSettings`].
//!
//! A launched plugin is spawned in its own process group so it outlives the
//! agent, told where to listen with `--socket` and handed a fresh HMAC secret
//! through the environment. The agent then pings until the plugin answers.
//! A reattached plugin is only pinged.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logmon_common::process_utils::{kill_process, process_exists};
use logmon_common::{LogmonSettings, Network, PluginBinaryConfig, ReattachDescriptor, PLUGIN_PROTOCOL_VERSION};
use logmon_plugin::wire::generate_secret;
use logmon_plugin::{LoggingPlugin, RpcClient, SECRET_ENV, SOCKET_FLAG};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{CatalogError, PluginCatalog, PluginInstance, PluginType};

const PING_TIMEOUT: Duration = Duration::from_secs(1);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);
const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct ProcessCatalog {
    settings: LogmonSettings,
}

impl ProcessCatalog {
    pub fn new(settings: LogmonSettings) -> Self {
        Self { settings }
    }

    fn listen_addr(&self, name: &str) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let short = &id[..8];
        match Network::native() {
            Network::Pipe => format!(r"\\.\pipe\logmon-{}-{}", name, short),
            Network::Unix => self
                .settings
                .runtime_dir
                .join(format!("{}-{}.sock", name, short))
                .to_string_lossy()
                .to_string(),
        }
    }

    async fn launch(
        &self,
        name: &str,
        cfg: &PluginBinaryConfig,
        cancel: &CancellationToken,
    ) -> Result<ProcessInstance, CatalogError> {
        if Network::native() == Network::Unix {
            std::fs::create_dir_all(&self.settings.runtime_dir)?;
        }

        let addr = self.listen_addr(name);
        let secret = generate_secret();

        let mut cmd = Command::new(&cfg.binary);
        cmd.args(&cfg.args)
            .arg(SOCKET_FLAG)
            .arg(&addr)
            .env(SECRET_ENV, &secret)
            .envs(&cfg.env)
            .env(
                "RUST_LOG",
                std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|err| CatalogError::Launch {
            name: name.to_string(),
            reason: format!("failed to spawn {}: {}", cfg.binary, err),
        })?;
        let pid = child.id().ok_or_else(|| CatalogError::Launch {
            name: name.to_string(),
            reason: "process exited before reporting a pid".into(),
        })?;
        info!(plugin = name, pid, addr = %addr, "spawned logging plugin");

        let done = CancellationToken::new();
        let client = RpcClient::new(&addr, &secret, done.clone())
            .with_timeout(self.settings.rpc_timeout());

        let deadline = Instant::now() + self.settings.start_timeout();
        loop {
            let ready = tokio::select! {
                _ = cancel.cancelled() => {
                    abandon(&mut child, &addr).await;
                    return Err(CatalogError::Cancelled);
                }
                pinged = timeout(PING_TIMEOUT, client.ping()) => matches!(pinged, Ok(Ok(()))),
            };
            if ready {
                break;
            }

            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    abandon(&mut child, &addr).await;
                    return Err(CatalogError::Launch {
                        name: name.to_string(),
                        reason: format!("exited with {} while starting", status),
                    });
                }
                Err(err) => {
                    abandon(&mut child, &addr).await;
                    return Err(err.into());
                }
            }

            if Instant::now() >= deadline {
                abandon(&mut child, &addr).await;
                return Err(CatalogError::Launch {
                    name: name.to_string(),
                    reason: format!(
                        "not ready within {}ms",
                        self.settings.start_timeout().as_millis()
                    ),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    abandon(&mut child, &addr).await;
                    return Err(CatalogError::Cancelled);
                }
                _ = sleep(READY_POLL_INTERVAL) => {}
            }
        }

        let kill_switch = CancellationToken::new();
        watch_child(name.to_string(), child, done.clone(), kill_switch.clone());

        Ok(ProcessInstance {
            name: name.to_string(),
            descriptor: ReattachDescriptor {
                network: Network::native(),
                addr,
                pid,
                protocol_version: PLUGIN_PROTOCOL_VERSION,
                secret,
            },
            client: Arc::new(client),
            done,
            kill_switch: Some(kill_switch),
            killed: AtomicBool::new(false),
        })
    }

    async fn reattach(
        &self,
        name: &str,
        descriptor: &ReattachDescriptor,
    ) -> Result<ProcessInstance, CatalogError> {
        let refuse = |reason: String| CatalogError::Reattach {
            name: name.to_string(),
            pid: descriptor.pid,
            reason,
        };

        if descriptor.protocol_version != PLUGIN_PROTOCOL_VERSION {
            return Err(refuse(format!(
                "unsupported protocol version {}",
                descriptor.protocol_version
            )));
        }
        if descriptor.network != Network::native() {
            return Err(refuse(format!(
                "unsupported network {:?}",
                descriptor.network
            )));
        }
        if !process_exists(descriptor.pid) {
            return Err(refuse("process is not running".into()));
        }

        let done = CancellationToken::new();
        let client = RpcClient::new(&descriptor.addr, &descriptor.secret, done.clone())
            .with_timeout(self.settings.rpc_timeout());
        match timeout(PING_TIMEOUT, client.ping()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(refuse(err.to_string())),
            Err(_) => return Err(refuse("ping timed out".into())),
        }

        info!(plugin = name, pid = descriptor.pid, "reattached to logging plugin");
        watch_pid(name.to_string(), descriptor.pid, done.clone());

        Ok(ProcessInstance {
            name: name.to_string(),
            descriptor: descriptor.clone(),
            client: Arc::new(client),
            done,
            kill_switch: None,
            killed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl PluginCatalog for ProcessCatalog {
    fn available(&self, plugin_type: PluginType) -> Vec<String> {
        match plugin_type {
            PluginType::Logging => {
                let mut names: Vec<String> = self.settings.plugins.keys().cloned().collect();
                names.sort();
                names
            }
        }
    }

    async fn dispense(
        &self,
        name: &str,
        plugin_type: PluginType,
        reattach: Option<&ReattachDescriptor>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn PluginInstance>, CatalogError> {
        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }

        let instance = match reattach {
            Some(descriptor) => self.reattach(name, descriptor).await?,
            None => {
                let cfg = self.settings.plugins.get(name).ok_or_else(|| {
                    CatalogError::UnknownPlugin {
                        name: name.to_string(),
                        plugin_type,
                    }
                })?;
                self.launch(name, cfg, cancel).await?
            }
        };
        Ok(Box::new(instance))
    }
}

/// A plugin process, launched by this agent or reattached.
pub struct ProcessInstance {
    name: String,
    descriptor: ReattachDescriptor,
    client: Arc<RpcClient>,
    done: CancellationToken,
    // Present when this agent spawned the process and a watcher owns the child.
    kill_switch: Option<CancellationToken>,
    killed: AtomicBool,
}

impl PluginInstance for ProcessInstance {
    fn plugin(&self) -> Arc<dyn LoggingPlugin> {
        self.client.clone()
    }

    fn kill(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }

        match &self.kill_switch {
            Some(switch) => switch.cancel(),
            None => {
                if !self.done.is_cancelled() {
                    if let Err(err) = kill_process(self.descriptor.pid) {
                        warn!(plugin = %self.name, pid = self.descriptor.pid, error = %err, "failed to kill logging plugin");
                    }
                }
                self.done.cancel();
            }
        }

        if self.descriptor.network == Network::Unix {
            let _ = std::fs::remove_file(&self.descriptor.addr);
        }
    }

    fn exited(&self) -> bool {
        self.killed.load(Ordering::SeqCst) || self.done.is_cancelled()
    }

    fn reattach_descriptor(&self) -> Option<ReattachDescriptor> {
        Some(self.descriptor.clone())
    }
}

/// Kill and reap a plugin that never became ready, and drop its socket.
async fn abandon(child: &mut Child, addr: &str) {
    if let Ok(None) = child.try_wait() {
        if let Err(err) = child.kill().await {
            debug!(error = %err, "failed to kill plugin that never became ready");
        }
    }
    if Network::native() == Network::Unix {
        let _ = std::fs::remove_file(addr);
    }
}

/// Reap a launched plugin and fire `done` once it exits or is killed.
fn watch_child(name: String, mut child: Child, done: CancellationToken, kill_switch: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => info!(plugin = %name, %status, "logging plugin exited"),
                Err(err) => warn!(plugin = %name, error = %err, "failed to wait on logging plugin"),
            },
            _ = kill_switch.cancelled() => {
                if let Err(err) = child.kill().await {
                    warn!(plugin = %name, error = %err, "failed to kill logging plugin");
                }
            }
        }
        done.cancel();
    });
}

/// Poll a reattached plugin's pid and fire `done` once it disappears.
fn watch_pid(name: String, pid: u32, done: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = done.cancelled() => return,
                _ = sleep(LIVENESS_POLL_INTERVAL) => {}
            }
            if !process_exists(pid) {
                info!(plugin = %name, pid, "reattached logging plugin exited");
                done.cancel();
                return;
            }
        }
    });
}

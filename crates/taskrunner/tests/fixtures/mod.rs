//! # Test fixtures
//!
//! An in-memory plugin catalog that records every launch, reattach, RPC call
//! and kill as an ordered event log, so tests can assert on exactly what the
//! hook did to its plugin.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use logmon_common::{Capabilities, LogConfig, LogmonSettings, Network, ReattachDescriptor};
use logmon_hook::{
    HookState, InternalCapabilities, LogmonHook, LogmonHookConfig, TaskDriver, TaskInfo,
    TaskLogConfig, REATTACH_KEY,
};
use logmon_manager::{CatalogError, LoggingManager, PluginCatalog, PluginInstance, PluginType};
use logmon_plugin::{LoggingPlugin, PluginError};
use tokio_util::sync::CancellationToken;

pub const FIRST_PID: u32 = 100;

#[derive(Default)]
pub struct FakeCatalog {
    events: Arc<Mutex<Vec<String>>>,
    next_pid: AtomicU32,
    start_results: Arc<Mutex<VecDeque<Result<(), PluginError>>>>,
    configs: Arc<Mutex<Vec<LogConfig>>>,
    pub fail_launch: AtomicBool,
    pub fail_reattach: AtomicBool,
    pub fail_stop: Arc<AtomicBool>,
}

impl FakeCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(FIRST_PID),
            ..Self::default()
        })
    }

    /// Results for upcoming `start` calls, in order. Once drained, starts succeed.
    pub fn script_starts(&self, results: impl IntoIterator<Item = Result<(), PluginError>>) {
        self.start_results.lock().unwrap().extend(results);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        let prefix = format!("{kind}:");
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.starts_with(&prefix))
            .count()
    }

    pub fn started_configs(&self) -> Vec<LogConfig> {
        self.configs.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn instance(&self, pid: u32) -> FakeInstance {
        FakeInstance {
            pid,
            dead: AtomicBool::new(false),
            events: self.events.clone(),
            plugin: Arc::new(FakePlugin {
                pid,
                events: self.events.clone(),
                start_results: self.start_results.clone(),
                configs: self.configs.clone(),
                fail_stop: self.fail_stop.clone(),
            }),
        }
    }
}

#[async_trait]
impl PluginCatalog for FakeCatalog {
    fn available(&self, _plugin_type: PluginType) -> Vec<String> {
        vec!["logmon".into()]
    }

    async fn dispense(
        &self,
        name: &str,
        _plugin_type: PluginType,
        reattach: Option<&ReattachDescriptor>,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn PluginInstance>, CatalogError> {
        match reattach {
            Some(descriptor) => {
                self.record(format!("reattach:{}", descriptor.pid));
                if self.fail_reattach.load(Ordering::SeqCst) {
                    return Err(CatalogError::Reattach {
                        name: name.to_string(),
                        pid: descriptor.pid,
                        reason: "process is not running".into(),
                    });
                }
                Ok(Box::new(self.instance(descriptor.pid)))
            }
            None => {
                if self.fail_launch.load(Ordering::SeqCst) {
                    self.record("launch:failed".into());
                    return Err(CatalogError::Launch {
                        name: name.to_string(),
                        reason: "exec format error".into(),
                    });
                }
                let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
                self.record(format!("launch:{pid}"));
                Ok(Box::new(self.instance(pid)))
            }
        }
    }
}

struct FakeInstance {
    pid: u32,
    dead: AtomicBool,
    events: Arc<Mutex<Vec<String>>>,
    plugin: Arc<FakePlugin>,
}

impl PluginInstance for FakeInstance {
    fn plugin(&self) -> Arc<dyn LoggingPlugin> {
        self.plugin.clone()
    }

    fn kill(&self) {
        self.events.lock().unwrap().push(format!("kill:{}", self.pid));
        self.dead.store(true, Ordering::SeqCst);
    }

    fn exited(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    fn reattach_descriptor(&self) -> Option<ReattachDescriptor> {
        Some(descriptor(self.pid))
    }
}

struct FakePlugin {
    pid: u32,
    events: Arc<Mutex<Vec<String>>>,
    start_results: Arc<Mutex<VecDeque<Result<(), PluginError>>>>,
    configs: Arc<Mutex<Vec<LogConfig>>>,
    fail_stop: Arc<AtomicBool>,
}

#[async_trait]
impl LoggingPlugin for FakePlugin {
    async fn start(&self, cfg: &LogConfig) -> Result<(), PluginError> {
        self.events.lock().unwrap().push(format!("start:{}", self.pid));
        self.configs.lock().unwrap().push(cfg.clone());
        self.start_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn stop(&self) -> Result<(), PluginError> {
        self.events.lock().unwrap().push(format!("stop:{}", self.pid));
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(PluginError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    async fn capabilities(&self) -> Result<Capabilities, PluginError> {
        Ok(Capabilities::default())
    }
}

pub struct StaticDriver(pub Option<InternalCapabilities>);

impl TaskDriver for StaticDriver {
    fn internal_capabilities(&self) -> Option<InternalCapabilities> {
        self.0
    }
}

pub fn descriptor(pid: u32) -> ReattachDescriptor {
    ReattachDescriptor {
        network: Network::Unix,
        addr: format!("/run/logmon/logmon-{pid}.sock"),
        pid,
        protocol_version: 1,
        secret: "c2VjcmV0".into(),
    }
}

pub fn state_for(pid: u32) -> HookState {
    HookState::from([(REATTACH_KEY.to_string(), descriptor(pid).to_json().unwrap())])
}

pub fn pid_in(state: &HookState) -> u32 {
    ReattachDescriptor::from_json(&state[REATTACH_KEY])
        .unwrap()
        .pid
}

pub fn task() -> TaskInfo {
    TaskInfo {
        name: "redis".into(),
        log_config: TaskLogConfig {
            max_files: 5,
            max_file_size_mb: 20,
        },
    }
}

pub fn hook_with(catalog: Arc<FakeCatalog>, driver: StaticDriver) -> LogmonHook {
    hook_from_settings(catalog, driver, &LogmonSettings::default())
}

pub fn hook_from_settings(
    catalog: Arc<FakeCatalog>,
    driver: StaticDriver,
    settings: &LogmonSettings,
) -> LogmonHook {
    let manager = Arc::new(LoggingManager::new(catalog));
    LogmonHook::from_settings(
        manager,
        Arc::new(driver),
        LogmonHookConfig::new("redis", "/alloc/logs"),
        settings,
    )
}

pub fn hook(catalog: Arc<FakeCatalog>) -> LogmonHook {
    hook_with(catalog, StaticDriver(None))
}

use std::sync::Arc;

use async_trait::async_trait;
use logmon_common::{LogConfig, LogmonSettings, RetrySettings};
use logmon_manager::{HandleState, LoggingManager, LoggingPluginHandle};
use tokio::sync::Mutex;
use tracing::{debug, error, trace, warn};

use crate::config::LogmonHookConfig;
use crate::driver::TaskDriver;
use crate::error::HookError;
use crate::interfaces::{
    TaskHook, TaskInfo, TaskPrestartHook, TaskPrestartRequest, TaskPrestartResponse, TaskStopHook,
    TaskStopRequest,
};
use crate::state::{reattach_descriptor_from_state, state_with_descriptor};

/// Plugin the hook asks the manager for.
pub const LOGMON_PLUGIN_NAME: &str = "logmon";

type PluginSlot = Option<Arc<LoggingPluginHandle>>;

/// Runs a logging plugin for one task.
pub struct LogmonHook {
    manager: Arc<LoggingManager>,
    driver: Arc<dyn TaskDriver>,
    config: LogmonHookConfig,
    retry: RetrySettings,
    // Held for the whole of prestart and stop; both run step by step.
    plugin: Mutex<PluginSlot>,
}

impl LogmonHook {
    pub fn new(
        manager: Arc<LoggingManager>,
        driver: Arc<dyn TaskDriver>,
        config: LogmonHookConfig,
    ) -> Self {
        Self {
            manager,
            driver,
            config,
            retry: RetrySettings::default(),
            plugin: Mutex::new(None),
        }
    }

    /// Build a hook whose retry policy comes from the agent's `[retry]`
    /// settings.
    pub fn from_settings(
        manager: Arc<LoggingManager>,
        driver: Arc<dyn TaskDriver>,
        config: LogmonHookConfig,
        settings: &LogmonSettings,
    ) -> Self {
        Self::new(manager, driver, config).with_retry(settings.retry)
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn manager(&self) -> &Arc<LoggingManager> {
        &self.manager
    }

    pub async fn plugin_state(&self) -> HandleState {
        match self.plugin.lock().await.as_ref() {
            Some(handle) => handle.state(),
            None => HandleState::Unlaunched,
        }
    }

    fn logging_disabled(&self) -> bool {
        self.driver
            .internal_capabilities()
            .map_or(false, |caps| caps.disable_log_collection)
    }

    fn log_config(&self, task: &TaskInfo) -> LogConfig {
        LogConfig {
            log_dir: self.config.log_dir.to_string_lossy().to_string(),
            stdout_file_name: format!("{}.stdout", task.name),
            stderr_file_name: format!("{}.stderr", task.name),
            stdout_fifo: self.config.stdout_fifo.clone(),
            stderr_fifo: self.config.stderr_fifo.clone(),
            max_files: task.log_config.max_files,
            max_file_size_mb: task.log_config.max_file_size_mb,
        }
    }

    async fn run_prestart(
        &self,
        req: &TaskPrestartRequest,
    ) -> Result<TaskPrestartResponse, HookError> {
        if self.logging_disabled() {
            debug!(task = %req.task.name, "logging is disabled by driver");
            return Ok(TaskPrestartResponse::default());
        }

        let mut slot = self.plugin.lock().await;
        let mut attempts: u32 = 0;
        loop {
            let err = match self.prestart_once(&mut slot, req).await {
                Ok(handle) => return self.prestart_response(&handle),
                Err(HookError::Plugin(err)) if err.is_transport_shutdown() => err,
                Err(err) => return Err(err),
            };

            warn!(task = %req.task.name, error = %err, "logging plugin shut down while making request");
            if attempts >= self.retry.max_retries {
                warn!(task = %req.task.name, attempts, error = %err, "logging plugin shut down while making request; giving up");
                return Err(HookError::Plugin(err));
            }

            attempts += 1;
            warn!(task = %req.task.name, attempts, error = %err, "logging plugin shut down while making request; retrying");
            if let Some(handle) = slot.as_ref() {
                discard(handle).await;
            }
            tokio::time::sleep(self.retry.backoff()).await;
        }
    }

    async fn prestart_once(
        &self,
        slot: &mut PluginSlot,
        req: &TaskPrestartRequest,
    ) -> Result<Arc<LoggingPluginHandle>, HookError> {
        if slot.is_none() {
            match reattach_descriptor_from_state(req.previous_state.as_ref()) {
                Ok(Some(descriptor)) => {
                    match self.manager.dispense(LOGMON_PLUGIN_NAME, Some(&descriptor)).await {
                        Ok(handle) => *slot = Some(handle),
                        Err(err) => {
                            warn!(task = %req.task.name, pid = descriptor.pid, error = %err, "failed to reattach to logging plugin")
                        }
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    error!(task = %req.task.name, error = %err, "failed to load reattach config")
                }
            }
        }

        let live = slot.as_ref().filter(|handle| !handle.exited()).cloned();
        let handle = match live {
            Some(handle) => handle,
            None => {
                if let Some(dead) = slot.take() {
                    dead.kill();
                }
                let fresh = self
                    .manager
                    .dispense(LOGMON_PLUGIN_NAME, None)
                    .await
                    .map_err(|err| {
                        error!(task = %req.task.name, error = %err, "failed to launch logging plugin");
                        HookError::Launch(err)
                    })?;
                *slot = Some(Arc::clone(&fresh));
                fresh
            }
        };

        handle
            .start(&self.log_config(&req.task))
            .await
            .map_err(|err| {
                error!(task = %req.task.name, error = %err, "failed to start logging plugin");
                HookError::Plugin(err)
            })?;
        Ok(handle)
    }

    fn prestart_response(
        &self,
        handle: &LoggingPluginHandle,
    ) -> Result<TaskPrestartResponse, HookError> {
        match handle.reattach_descriptor() {
            Some(descriptor) => Ok(TaskPrestartResponse {
                state: Some(state_with_descriptor(&descriptor)?),
            }),
            None => {
                warn!(plugin = %handle.name(), "logging plugin has no reattach descriptor");
                Ok(TaskPrestartResponse::default())
            }
        }
    }

    async fn run_stop(&self, req: &TaskStopRequest) {
        let mut slot = self.plugin.lock().await;

        // Stop may arrive without a prestart after an agent restart.
        if slot.is_none() {
            if let Err(err) = self.reattach(&mut slot, req).await {
                trace!(error = %err, "error reattaching to logging plugin when stopping");
            }
        }

        if let Some(handle) = slot.take() {
            if let Err(err) = handle.stop().await {
                debug!(plugin = %handle.name(), error = %err, "failed to stop logging plugin");
            }
            handle.kill();
        }
    }

    /// Reattach from hook state if it names a plugin. Never launches.
    async fn reattach(&self, slot: &mut PluginSlot, req: &TaskStopRequest) -> Result<(), HookError> {
        let Some(descriptor) = reattach_descriptor_from_state(req.existing_state.as_ref())? else {
            return Ok(());
        };
        let handle = self
            .manager
            .dispense(LOGMON_PLUGIN_NAME, Some(&descriptor))
            .await
            .map_err(HookError::Reattach)?;
        *slot = Some(handle);
        Ok(())
    }
}

/// Drop a plugin whose transport went away. Kill marks it exited, so the
/// next attempt launches a replacement.
async fn discard(handle: &LoggingPluginHandle) {
    if let Err(err) = handle.stop().await {
        debug!(plugin = %handle.name(), error = %err, "failed to stop dead logging plugin");
    }
    handle.kill();
}

impl TaskHook for LogmonHook {
    fn name(&self) -> &str {
        LOGMON_PLUGIN_NAME
    }
}

#[async_trait]
impl TaskPrestartHook for LogmonHook {
    async fn prestart(&self, req: &TaskPrestartRequest) -> Result<TaskPrestartResponse, HookError> {
        self.run_prestart(req).await
    }
}

#[async_trait]
impl TaskStopHook for LogmonHook {
    async fn stop(&self, req: &TaskStopRequest) -> Result<(), HookError> {
        self.run_stop(req).await;
        Ok(())
    }
}

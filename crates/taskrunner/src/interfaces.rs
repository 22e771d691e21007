use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::HookError;

/// Opaque per-hook state persisted by the task runner across agent restarts.
pub type HookState = HashMap<String, String>;

/// Log rotation limits from the task's job definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLogConfig {
    pub max_files: u32,
    pub max_file_size_mb: u32,
}

impl Default for TaskLogConfig {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_file_size_mb: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: String,
    pub log_config: TaskLogConfig,
}

impl TaskInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log_config: TaskLogConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskPrestartRequest {
    pub task: TaskInfo,
    /// State this hook returned from its last successful prestart, if any.
    pub previous_state: Option<HookState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPrestartResponse {
    /// Replaces the hook's persisted state when set.
    pub state: Option<HookState>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskStopRequest {
    pub existing_state: Option<HookState>,
}

pub trait TaskHook: Send + Sync {
    fn name(&self) -> &str;
}

#[async_trait]
pub trait TaskPrestartHook: TaskHook {
    async fn prestart(&self, req: &TaskPrestartRequest) -> Result<TaskPrestartResponse, HookError>;
}

#[async_trait]
pub trait TaskStopHook: TaskHook {
    async fn stop(&self, req: &TaskStopRequest) -> Result<(), HookError>;
}

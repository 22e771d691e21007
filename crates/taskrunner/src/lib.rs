//! Task runner side of logging: the `logmon` hook.
//!
//! Each task gets one [`LogmonHook`]. At prestart it makes sure a logging
//! plugin is collecting the task's output, reattaching to the plugin a
//! previous agent left behind when hook state says one exists. At stop it
//! tears the plugin down, even when the agent restarted in between.

pub mod config;
pub mod driver;
pub mod error;
pub mod hook;
pub mod interfaces;
pub mod state;

pub use config::LogmonHookConfig;
pub use driver::{InternalCapabilities, TaskDriver};
pub use error::HookError;
pub use hook::{LogmonHook, LOGMON_PLUGIN_NAME};
pub use interfaces::{
    HookState, TaskHook, TaskInfo, TaskLogConfig, TaskPrestartHook, TaskPrestartRequest,
    TaskPrestartResponse, TaskStopHook, TaskStopRequest,
};
pub use state::REATTACH_KEY;

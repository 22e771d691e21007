use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Where a task's output is collected from and written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogmonHookConfig {
    pub log_dir: PathBuf,
    pub stdout_fifo: String,
    pub stderr_fifo: String,
}

impl LogmonHookConfig {
    /// Named pipes on Windows, hidden fifos inside `log_dir` elsewhere.
    pub fn new(task_name: &str, log_dir: impl AsRef<Path>) -> Self {
        let log_dir = log_dir.as_ref().to_path_buf();

        let (stdout_fifo, stderr_fifo) = if cfg!(windows) {
            let id = Uuid::new_v4().simple().to_string();
            let id = &id[..8];
            (
                format!("//./pipe/{}-{}.stdout", task_name, id),
                format!("//./pipe/{}-{}.stderr", task_name, id),
            )
        } else {
            (
                fifo_path(&log_dir, task_name, "stdout"),
                fifo_path(&log_dir, task_name, "stderr"),
            )
        };

        Self {
            log_dir,
            stdout_fifo,
            stderr_fifo,
        }
    }
}

fn fifo_path(log_dir: &Path, task_name: &str, stream: &str) -> String {
    log_dir
        .join(format!(".{}.{}.fifo", task_name, stream))
        .to_string_lossy()
        .to_string()
}

//! Startup configuration, resolved once before the supervisor starts.

use std::path::PathBuf;

use crate::error::DaemonError;
use crate::paths::{default_fifo_path, default_log_path, DEFAULT_ALARM_INTERVAL_SECS};

/// Immutable settings owned by the supervisor for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Location of the named pipe producers write into.
    pub fifo_path: PathBuf,
    /// Destination for stdout/stderr once the process is in the background.
    pub log_path: PathBuf,
    /// Seconds between "waiting for data" diagnostics. Zero disables the timer.
    pub alarm_interval_secs: u32,
    /// Detach into the background before entering the main loop.
    pub daemonize: bool,
    /// Written by the detached process when set.
    pub pid_file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fifo_path: default_fifo_path(),
            log_path: default_log_path(),
            alarm_interval_secs: DEFAULT_ALARM_INTERVAL_SECS,
            daemonize: false,
            pid_file: None,
        }
    }
}

impl RuntimeConfig {
    /// Rejects combinations that would leave the relay unable to run.
    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.fifo_path.as_os_str().is_empty() {
            return Err(DaemonError::InvalidConfig(
                "named pipe path must not be empty".to_string(),
            ));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(DaemonError::InvalidConfig(
                "log path must not be empty".to_string(),
            ));
        }
        if self.log_path == self.fifo_path {
            return Err(DaemonError::InvalidConfig(format!(
                "log path and named pipe path are both {}",
                self.fifo_path.display()
            )));
        }
        if let Some(pid_file) = &self.pid_file {
            if pid_file == &self.fifo_path || pid_file == &self.log_path {
                return Err(DaemonError::InvalidConfig(format!(
                    "pid file {} collides with another configured path",
                    pid_file.display()
                )));
            }
        }
        Ok(())
    }
}

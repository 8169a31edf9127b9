//! One-way transition into the background.

use std::fs::File;
use std::path::{Path, PathBuf};

use daemonize::Daemonize;
use nix::unistd::alarm;

use crate::error::{io_err, DaemonError};
use crate::signals;

/// Process-level side effects the supervisor needs, kept behind a trait so
/// the state machine can be driven without forking.
pub trait ProcessHandle {
    /// Leave the controlling terminal: new session, stdin from `/dev/null`,
    /// stdout and stderr into `log_path`. The caller continues as the
    /// detached process.
    fn detach(&mut self, log_path: &Path, pid_file: Option<&Path>) -> Result<(), DaemonError>;

    /// Schedule one SIGALRM `secs` seconds from now, replacing any pending one.
    fn arm_alarm(&mut self, secs: u32);
}

/// The real process, backed by `daemonize` and `alarm(2)`.
#[derive(Debug, Default)]
pub struct HostProcess;

impl ProcessHandle for HostProcess {
    fn detach(&mut self, log_path: &Path, pid_file: Option<&Path>) -> Result<(), DaemonError> {
        let cwd = std::env::current_dir().map_err(|e| io_err("current directory", e))?;
        let stdout = File::create(log_path).map_err(|e| io_err(log_path, e))?;
        let stderr = stdout.try_clone().map_err(|e| io_err(log_path, e))?;

        let mut daemonize = Daemonize::new()
            .working_directory(cwd)
            .stdout(stdout)
            .stderr(stderr);
        if let Some(pid_file) = pid_file {
            daemonize = daemonize.pid_file(pid_file);
        }

        // The parent exits inside `start`; only the detached child returns.
        // Handled signals stay blocked until then so none can interrupt the
        // parent's wait on the fork.
        signals::with_handled_signals_blocked(|| daemonize.start())?
            .map_err(|e| DaemonError::Detach(e.to_string()))
    }

    fn arm_alarm(&mut self, secs: u32) {
        let _ = if secs == 0 {
            alarm::cancel()
        } else {
            alarm::set(secs)
        };
    }
}

/// Tracks whether the transition already happened. It happens at most once.
#[derive(Debug)]
pub struct Daemonizer {
    log_path: PathBuf,
    pid_file: Option<PathBuf>,
    detached: bool,
}

impl Daemonizer {
    pub fn new(log_path: PathBuf, pid_file: Option<PathBuf>) -> Self {
        Self {
            log_path,
            pid_file,
            detached: false,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Detach via `process`. Returns `Ok(false)` without side effects when the
    /// process is already in the background.
    pub fn transition_to_background<P: ProcessHandle>(
        &mut self,
        process: &mut P,
    ) -> Result<bool, DaemonError> {
        if self.detached {
            return Ok(false);
        }
        process.detach(&self.log_path, self.pid_file.as_deref())?;
        self.detached = true;
        tracing::info!(log = %self.log_path.display(), "detached into background");
        Ok(true)
    }
}

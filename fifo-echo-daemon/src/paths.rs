use std::path::PathBuf;

pub const DEFAULT_FIFO_PATH: &str = "/tmp/echo_server.fifo";
pub const DEFAULT_LOG_PATH: &str = "/tmp/echo_server.log";
pub const DEFAULT_ALARM_INTERVAL_SECS: u32 = 15;

/// Permission bits for a freshly created endpoint (owner read/write only).
pub const FIFO_MODE: u32 = 0o600;

/// Upper bound on bytes pulled from the pipe per read call.
pub const READ_CHUNK_SIZE: usize = 1024;

pub fn default_fifo_path() -> PathBuf {
    PathBuf::from(DEFAULT_FIFO_PATH)
}

pub fn default_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_PATH)
}

//! fifo-echo: echo everything written into a named pipe.
//!
//! # Usage
//!
//! ```text
//! fifo-echo [-d] [-f <fifo>] [-l <log>] [-t <secs>] [--pid-file <path>]
//! ```
//!
//! Control is by signal only: SIGINT (finish message, stop), SIGTERM (stop
//! now), SIGUSR1 (print counters), SIGHUP (move to background).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use fifo_echo_daemon::paths::{DEFAULT_ALARM_INTERVAL_SECS, DEFAULT_FIFO_PATH, DEFAULT_LOG_PATH};
use fifo_echo_daemon::{start_blocking, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(
    name = "fifo-echo",
    version,
    about = "Echo messages written into a named pipe; controlled by signals",
    long_about = None,
)]
struct Cli {
    /// Detach into the background before reading.
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Named pipe to create (or reuse) and read from.
    #[arg(short = 'f', long = "fifo", value_name = "PATH", default_value = DEFAULT_FIFO_PATH)]
    fifo: PathBuf,

    /// Where stdout and stderr go once in the background.
    #[arg(short = 'l', long = "log", value_name = "PATH", default_value = DEFAULT_LOG_PATH)]
    log: PathBuf,

    /// Seconds between "waiting for data" diagnostics; 0 disables them.
    #[arg(
        short = 't',
        long = "alarm-interval",
        value_name = "SECS",
        default_value_t = DEFAULT_ALARM_INTERVAL_SECS
    )]
    alarm_interval: u32,

    /// Write the background process id to this file.
    #[arg(long, value_name = "PATH")]
    pid_file: Option<PathBuf>,
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            fifo_path: cli.fifo,
            log_path: cli.log,
            alarm_interval_secs: cli.alarm_interval,
            daemonize: cli.daemon,
            pid_file: cli.pid_file,
        }
    }
}

fn main() -> Result<()> {
    let config = RuntimeConfig::from(Cli::parse());
    let fifo = config.fifo_path.clone();
    start_blocking(config).with_context(|| format!("fifo-echo on {} failed", fifo.display()))?;
    Ok(())
}

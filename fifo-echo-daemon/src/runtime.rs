use std::sync::Arc;

use crate::channel::Channel;
use crate::config::RuntimeConfig;
use crate::counters::CountersSnapshot;
use crate::daemonizer::HostProcess;
use crate::error::DaemonError;
use crate::signals::{SignalBridge, SignalState};
use crate::supervisor::Supervisor;

/// Wire the relay to the real process and block until it shuts down.
///
/// Signal handlers go in before the endpoint exists, so anyone who can see
/// the FIFO can already signal the process safely.
pub fn start_blocking(config: RuntimeConfig) -> Result<CountersSnapshot, DaemonError> {
    init_tracing();
    config.validate()?;

    let bridge = SignalBridge::install(Arc::new(SignalState::new()))?;
    let channel = Channel::ensure(&config.fifo_path)?;

    let mut supervisor = Supervisor::new(
        config,
        Arc::clone(bridge.state()),
        channel,
        HostProcess,
        std::io::stdout(),
    );
    supervisor.run()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries echoed messages; keep log records off it. Once detached,
    // stderr shares the log file with the echo stream, so no colour codes.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init();
}

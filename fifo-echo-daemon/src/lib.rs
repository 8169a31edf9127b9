//! Named-pipe echo relay operated through process signals.
//!
//! Producers write messages into a FIFO; each one is echoed to stdout.
//! SIGINT stops after the current message, SIGTERM stops at once, SIGALRM
//! prints a periodic diagnostic, SIGUSR1 dumps counters and SIGHUP moves the
//! running process into the background.

pub mod channel;
pub mod config;
pub mod counters;
pub mod daemonizer;
mod error;
pub mod paths;
pub mod signals;
pub mod supervisor;
mod runtime;

pub use channel::{Channel, ChunkReader, MessageSource, Opened, ReadOutcome};
pub use config::RuntimeConfig;
pub use counters::{Counters, CountersSnapshot};
pub use daemonizer::{Daemonizer, HostProcess, ProcessHandle};
pub use error::DaemonError;
pub use runtime::start_blocking;
pub use signals::{ExitMode, PendingFlag, SignalBridge, SignalState};
pub use supervisor::Supervisor;

use std::path::PathBuf;

use nix::sys::signal::Signal;
use thiserror::Error;

/// Error surface for the relay: configuration, endpoint lifecycle, output,
/// backgrounding and signal registration. Every variant is fatal; signal
/// interruption is reported through `Opened`/`ReadOutcome`, never here.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{path} exists and is not a named pipe")]
    NotAFifo { path: PathBuf },

    #[error("failed to {op} named pipe {path}: {source}")]
    Endpoint {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to output stream: {0}")]
    Output(#[source] std::io::Error),

    #[error("failed to detach into background: {0}")]
    Detach(String),

    #[error("failed to install handler for {signal}: {source}")]
    SignalInstall {
        signal: Signal,
        #[source]
        source: nix::Error,
    },

    #[error("failed to change signal mask: {0}")]
    SignalMask(#[source] nix::Error),

    #[error("signal handlers are already installed in this process")]
    AlreadyInstalled,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn endpoint_err(
    op: &'static str,
    path: impl Into<PathBuf>,
    source: nix::Error,
) -> DaemonError {
    DaemonError::Endpoint {
        op,
        path: path.into(),
        source,
    }
}

//! Signal-to-flag bridge.
//!
//! Handlers run in signal-delivery context, so they only store into atomics.
//! All real work (printing, re-arming, detaching) happens when the supervisor
//! calls [`SignalState::consume_and_clear`] from its own control path.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use nix::libc;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};

use crate::error::DaemonError;

/// Signals routed into [`SignalState`]. SIGQUIT is ignored separately.
pub const HANDLED_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGALRM,
    Signal::SIGUSR1,
    Signal::SIGHUP,
];

/// How the main loop should wind down. Ordered: a later request can only
/// move the mode forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ExitMode {
    Running = 0,
    /// Finish the in-flight message, then stop.
    GracefulStop = 1,
    /// Abandon the in-flight message and stop.
    ImmediateStop = 2,
}

impl ExitMode {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::GracefulStop,
            _ => Self::ImmediateStop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingFlag {
    AlarmDue,
    RebackgroundRequested,
    DiagnosticRequested,
}

/// Shared between the signal handlers and the supervisor.
#[derive(Debug, Default)]
pub struct SignalState {
    exit_mode: AtomicU8,
    alarm_due: AtomicBool,
    rebackground_requested: AtomicBool,
    diagnostic_requested: AtomicBool,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, flag: PendingFlag) -> &AtomicBool {
        match flag {
            PendingFlag::AlarmDue => &self.alarm_due,
            PendingFlag::RebackgroundRequested => &self.rebackground_requested,
            PendingFlag::DiagnosticRequested => &self.diagnostic_requested,
        }
    }

    /// Raise `flag`. Non-blocking and allocation free.
    pub fn try_set(&self, flag: PendingFlag) {
        self.slot(flag).store(true, Ordering::SeqCst);
    }

    /// Returns whether `flag` was pending and clears it in the same step.
    pub fn consume_and_clear(&self, flag: PendingFlag) -> bool {
        self.slot(flag).swap(false, Ordering::SeqCst)
    }

    #[cfg(test)]
    fn is_pending(&self, flag: PendingFlag) -> bool {
        self.slot(flag).load(Ordering::SeqCst)
    }

    pub fn request_exit(&self, mode: ExitMode) {
        self.exit_mode.fetch_max(mode as u8, Ordering::SeqCst);
    }

    pub fn exit_mode(&self) -> ExitMode {
        ExitMode::from_raw(self.exit_mode.load(Ordering::SeqCst))
    }

    /// Map one delivered signal onto the state. Returns `false` for signals
    /// the bridge does not handle.
    pub fn deliver(&self, signal: Signal) -> bool {
        match signal {
            Signal::SIGINT => self.request_exit(ExitMode::GracefulStop),
            Signal::SIGTERM => self.request_exit(ExitMode::ImmediateStop),
            Signal::SIGALRM => self.try_set(PendingFlag::AlarmDue),
            Signal::SIGUSR1 => self.try_set(PendingFlag::DiagnosticRequested),
            Signal::SIGHUP => self.try_set(PendingFlag::RebackgroundRequested),
            _ => return false,
        }
        true
    }
}

static INSTALLED: OnceLock<Arc<SignalState>> = OnceLock::new();

extern "C" fn on_signal(signo: libc::c_int) {
    if let (Some(state), Ok(signal)) = (INSTALLED.get(), Signal::try_from(signo)) {
        state.deliver(signal);
    }
}

/// Process-wide registration of the handlers. At most one per process.
#[derive(Debug)]
pub struct SignalBridge {
    state: Arc<SignalState>,
}

impl SignalBridge {
    /// Route [`HANDLED_SIGNALS`] into `state` and ignore SIGQUIT.
    ///
    /// Handlers are installed without `SA_RESTART`: a blocking `open` or
    /// `read` on the pipe fails with `EINTR` so the caller can look at the
    /// flags before retrying.
    pub fn install(state: Arc<SignalState>) -> Result<Self, DaemonError> {
        INSTALLED
            .set(Arc::clone(&state))
            .map_err(|_| DaemonError::AlreadyInstalled)?;

        let action = SigAction::new(
            SigHandler::Handler(on_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for signal in HANDLED_SIGNALS {
            // SAFETY: `on_signal` only performs atomic loads and stores on
            // state reached through a write-once cell.
            unsafe { signal::sigaction(signal, &action) }
                .map_err(|source| DaemonError::SignalInstall { signal, source })?;
        }

        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        // SAFETY: SIG_IGN installs no user code.
        unsafe { signal::sigaction(Signal::SIGQUIT, &ignore) }.map_err(|source| {
            DaemonError::SignalInstall {
                signal: Signal::SIGQUIT,
                source,
            }
        })?;

        tracing::debug!("signal handlers installed");
        Ok(Self { state })
    }

    pub fn state(&self) -> &Arc<SignalState> {
        &self.state
    }
}

/// Run `f` with [`HANDLED_SIGNALS`] blocked on the calling thread, then
/// restore the previous mask. Signals arriving meanwhile stay pending.
///
/// A process that exits inside `f` never restores the mask; its pending
/// signals die with it.
pub(crate) fn with_handled_signals_blocked<T>(f: impl FnOnce() -> T) -> Result<T, DaemonError> {
    let mut blocked = SigSet::empty();
    for signal in HANDLED_SIGNALS {
        blocked.add(signal);
    }
    let previous = blocked
        .thread_swap_mask(SigmaskHow::SIG_BLOCK)
        .map_err(DaemonError::SignalMask)?;
    let result = f();
    previous.thread_set_mask().map_err(DaemonError::SignalMask)?;
    Ok(result)
}

//! Main loop: fuses blocking pipe reads with pending signal flags.
//!
//! ```text
//! Running --open--> Draining --end of stream--> Running
//!    |                 |
//!    | exit requested  | SIGTERM (abandon message)
//!    v                 v
//! Stopping <-----------+
//! ```
//!
//! SIGINT never interrupts a message: the loop only checks for a graceful
//! stop between messages. SIGTERM abandons the in-flight message uncounted.

use std::io::Write;
use std::sync::Arc;

use crate::channel::{ChunkReader, MessageSource, Opened, ReadOutcome};
use crate::config::RuntimeConfig;
use crate::counters::{Counters, CountersSnapshot};
use crate::daemonizer::{Daemonizer, ProcessHandle};
use crate::error::DaemonError;
use crate::paths::READ_CHUNK_SIZE;
use crate::signals::{ExitMode, PendingFlag, SignalState};

pub const ALARM_LINE: &str = "diag msg: waiting for data";
pub const DAEMONIZED_LINE: &str = "daemonized via SIGHUP";
pub const EXITING_LINE: &str = "exiting";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drained {
    Completed,
    Abandoned,
}

pub struct Supervisor<S, P, W> {
    config: RuntimeConfig,
    signals: Arc<SignalState>,
    counters: Counters,
    daemonizer: Daemonizer,
    source: S,
    process: P,
    out: W,
    buf: Box<[u8]>,
}

impl<S, P, W> Supervisor<S, P, W>
where
    S: MessageSource,
    P: ProcessHandle,
    W: Write,
{
    pub fn new(
        config: RuntimeConfig,
        signals: Arc<SignalState>,
        source: S,
        process: P,
        out: W,
    ) -> Self {
        let daemonizer = Daemonizer::new(config.log_path.clone(), config.pid_file.clone());
        Self {
            config,
            signals,
            counters: Counters::new(),
            daemonizer,
            source,
            process,
            out,
            buf: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    pub fn is_detached(&self) -> bool {
        self.daemonizer.is_detached()
    }

    /// Run until a stop is requested. Returns the final counters after the
    /// endpoint has been removed; any `Err` is fatal for the process.
    pub fn run(&mut self) -> Result<CountersSnapshot, DaemonError> {
        if self.config.daemonize {
            self.enter_background()?;
        }
        self.arm_alarm();
        tracing::info!(
            fifo = %self.config.fifo_path.display(),
            alarm_secs = self.config.alarm_interval_secs,
            "relay running"
        );

        while self.signals.exit_mode() == ExitMode::Running {
            self.service_pending()?;

            let reader = match self.source.open_for_read()? {
                Opened::Ready(reader) => reader,
                Opened::Interrupted => continue,
            };
            if self.drain(reader)? == Drained::Abandoned {
                break;
            }
        }

        self.shut_down()
    }

    /// Read one writer's message to end of stream, echoing as it arrives.
    fn drain(&mut self, mut reader: S::Reader) -> Result<Drained, DaemonError> {
        let mut tally: u64 = 0;
        let mut last_byte = None;

        loop {
            if self.signals.exit_mode() == ExitMode::ImmediateStop {
                reader.close()?;
                tracing::info!(bytes = tally, "abandoned in-flight message");
                return Ok(Drained::Abandoned);
            }

            match reader.read_chunk(&mut self.buf)? {
                ReadOutcome::Data(n) => {
                    let chunk = &self.buf[..n];
                    echo(&mut self.out, chunk)?;
                    tally += n as u64;
                    last_byte = chunk.last().copied();
                }
                ReadOutcome::Interrupted => {
                    if self.signals.exit_mode() != ExitMode::ImmediateStop {
                        self.service_pending()?;
                    }
                }
                ReadOutcome::EndOfStream => break,
            }
        }

        if tally > 0 {
            if last_byte != Some(b'\n') {
                echo(&mut self.out, b"\n")?;
                tally += 1;
            }
            self.counters.record_message(tally);
            tracing::debug!(bytes = tally, "message received");
        }
        reader.close()?;
        Ok(Drained::Completed)
    }

    /// Service raised flags in fixed order: alarm, hangup, diagnostic.
    fn service_pending(&mut self) -> Result<(), DaemonError> {
        if self.signals.consume_and_clear(PendingFlag::AlarmDue) {
            self.emit_line(ALARM_LINE)?;
            self.counters.record_alarm();
            self.arm_alarm();
        }

        if self
            .signals
            .consume_and_clear(PendingFlag::RebackgroundRequested)
        {
            if self.enter_background()? {
                self.emit_line(DAEMONIZED_LINE)?;
                self.emit_snapshot()?;
                self.arm_alarm();
            } else {
                tracing::debug!("already in background, ignoring hangup");
            }
        }

        if self
            .signals
            .consume_and_clear(PendingFlag::DiagnosticRequested)
        {
            self.emit_snapshot()?;
        }
        Ok(())
    }

    fn enter_background(&mut self) -> Result<bool, DaemonError> {
        if self.daemonizer.is_detached() {
            return Ok(false);
        }
        // Anything still buffered would otherwise be written by both parent and child.
        self.out.flush().map_err(DaemonError::Output)?;
        // The alarm does not survive the fork; `run` and the hangup path re-arm it.
        self.process.arm_alarm(0);
        self.daemonizer.transition_to_background(&mut self.process)
    }

    fn shut_down(&mut self) -> Result<CountersSnapshot, DaemonError> {
        self.emit_line(EXITING_LINE)?;
        let snapshot = self.emit_snapshot()?;
        self.source.remove()?;

        if self.daemonizer.is_detached() {
            if let Some(pid_file) = &self.config.pid_file {
                if let Err(err) = std::fs::remove_file(pid_file) {
                    tracing::warn!(path = %pid_file.display(), error = %err, "failed to remove pid file");
                }
            }
        }

        tracing::info!(
            messages = snapshot.messages,
            bytes = snapshot.bytes,
            alarms = snapshot.alarms,
            "relay stopped"
        );
        Ok(snapshot)
    }

    fn arm_alarm(&mut self) {
        self.process.arm_alarm(self.config.alarm_interval_secs);
    }

    fn emit_line(&mut self, line: &str) -> Result<(), DaemonError> {
        writeln!(self.out, "{line}").map_err(DaemonError::Output)?;
        self.out.flush().map_err(DaemonError::Output)
    }

    fn emit_snapshot(&mut self) -> Result<CountersSnapshot, DaemonError> {
        let snapshot = self.counters.snapshot();
        self.emit_line(&snapshot.to_string())?;
        Ok(snapshot)
    }
}

fn echo<W: Write>(out: &mut W, bytes: &[u8]) -> Result<(), DaemonError> {
    out.write_all(bytes).map_err(DaemonError::Output)?;
    out.flush().map_err(DaemonError::Output)
}

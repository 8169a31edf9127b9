#![allow(dead_code)]

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, sleep, JoinHandle};
use std::time::{Duration, Instant};

use nix::fcntl::OFlag;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
pub const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn fifo_echo_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fifo-echo"))
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(25));
    }
    condition()
}

pub fn is_fifo(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.file_type().is_fifo())
        .unwrap_or(false)
}

pub fn signal_pid(pid: i32, signal: Signal) {
    kill(Pid::from_raw(pid), signal).expect("deliver signal");
}

/// Open the write end without blocking forever if the relay is gone:
/// retries until a reader is waiting on the pipe.
pub fn open_writer(fifo: &Path) -> File {
    let mut opened = None;
    let ready = wait_until(STARTUP_TIMEOUT, || {
        match OpenOptions::new()
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(fifo)
        {
            Ok(file) => {
                opened = Some(file);
                true
            }
            Err(_) => false,
        }
    });
    assert!(ready, "no reader on {} in time", fifo.display());
    opened.expect("writer opened")
}

/// One complete message: open, write, close.
pub fn send(fifo: &Path, payload: &[u8]) {
    let mut writer = open_writer(fifo);
    writer.write_all(payload).expect("write message");
}

/// A foreground relay with its stdout captured on a background thread.
pub struct Relay {
    child: Child,
    pub fifo: PathBuf,
    pub log: PathBuf,
    stdout: Arc<Mutex<Vec<u8>>>,
    collector: Option<JoinHandle<()>>,
}

impl Relay {
    pub fn start(dir: &Path, extra_args: &[&str]) -> Self {
        let fifo = dir.join("relay.fifo");
        let log = dir.join("relay.log");
        let mut child = Command::new(fifo_echo_bin())
            .arg("-f")
            .arg(&fifo)
            .arg("-l")
            .arg(&log)
            .args(extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn fifo-echo");

        let stdout = Arc::new(Mutex::new(Vec::new()));
        let mut pipe = child.stdout.take().expect("stdout pipe");
        let sink = Arc::clone(&stdout);
        let collector = thread::spawn(move || {
            let mut buf = [0u8; 512];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink.lock().expect("stdout lock").extend_from_slice(&buf[..n]),
                }
            }
        });

        let relay = Self {
            child,
            fifo,
            log,
            stdout,
            collector: Some(collector),
        };
        assert!(
            wait_until(STARTUP_TIMEOUT, || is_fifo(&relay.fifo)),
            "relay did not create its named pipe in time"
        );
        relay
    }

    pub fn pid(&self) -> i32 {
        i32::try_from(self.child.id()).expect("pid fits in i32")
    }

    pub fn signal(&self, signal: Signal) {
        signal_pid(self.pid(), signal);
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.stdout.lock().expect("stdout lock")).into_owned()
    }

    pub fn wait_for_output(&self, needle: &str) {
        assert!(
            wait_until(STARTUP_TIMEOUT, || self.output().contains(needle)),
            "stdout never contained {needle:?}; got {:?}",
            self.output()
        );
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for exit and return the status plus everything written to stdout.
    pub fn finish(mut self) -> (ExitStatus, String) {
        let mut status = None;
        let exited = wait_until(EXIT_TIMEOUT, || {
            status = self.child.try_wait().expect("try_wait");
            status.is_some()
        });
        if !exited {
            let _ = self.child.kill();
            let _ = self.child.wait();
            panic!("relay did not exit in time; stdout so far: {:?}", self.output());
        }
        if let Some(collector) = self.collector.take() {
            collector.join().expect("stdout collector");
        }
        (status.expect("exit status"), self.output())
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Kills a detached relay that a failed assertion left behind.
pub struct PidGuard(pub i32);

impl Drop for PidGuard {
    fn drop(&mut self) {
        let _ = kill(Pid::from_raw(self.0), Signal::SIGKILL);
    }
}

pub fn read_pid_file(path: &Path) -> i32 {
    let mut pid = None;
    let found = wait_until(STARTUP_TIMEOUT, || {
        pid = std::fs::read_to_string(path)
            .ok()
            .and_then(|text| text.trim().parse::<i32>().ok());
        pid.is_some()
    });
    assert!(found, "pid file {} never appeared", path.display());
    pid.expect("pid")
}

pub fn read_log(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

pub fn wait_for_log(path: &Path, needle: &str) {
    assert!(
        wait_until(STARTUP_TIMEOUT, || read_log(path).contains(needle)),
        "log never contained {needle:?}; got {:?}",
        read_log(path)
    );
}

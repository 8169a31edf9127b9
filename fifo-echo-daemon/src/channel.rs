//! Named-pipe endpoint lifecycle: ensure, open/read/close per message, remove.
//!
//! Opens and reads go through raw syscalls because std retries `EINTR`
//! internally, and the supervisor needs to see every interruption.

use std::fs;
use std::os::fd::RawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;

use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::unistd;

use crate::error::{endpoint_err, io_err, DaemonError};
use crate::paths::FIFO_MODE;

/// Result of waiting for a writer to connect.
#[derive(Debug)]
pub enum Opened<R> {
    Ready(R),
    /// A signal arrived before any writer connected.
    Interrupted,
}

/// Result of one blocking read. Fatal failures are returned as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n > 0` bytes were written into the front of the buffer.
    Data(usize),
    /// The writer closed its end.
    EndOfStream,
    /// A signal arrived while blocked; the read may be retried.
    Interrupted,
}

/// A source of messages, one writer connection at a time.
pub trait MessageSource {
    type Reader: ChunkReader;

    /// Block until a writer connects.
    fn open_for_read(&mut self) -> Result<Opened<Self::Reader>, DaemonError>;

    /// Delete the endpoint. Called once, at clean shutdown.
    fn remove(&mut self) -> Result<(), DaemonError>;
}

pub trait ChunkReader {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, DaemonError>;

    fn close(self) -> Result<(), DaemonError>
    where
        Self: Sized;
}

/// The named pipe at a fixed path.
#[derive(Debug)]
pub struct Channel {
    path: PathBuf,
    removed: bool,
}

impl Channel {
    /// Create a FIFO at `path`, or reuse one that is already there.
    ///
    /// An existing object that is not a FIFO is left untouched and reported
    /// as [`DaemonError::NotAFifo`].
    pub fn ensure(path: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let path = path.into();
        match unistd::mkfifo(path.as_path(), Mode::from_bits_truncate(FIFO_MODE)) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "created named pipe");
            }
            Err(Errno::EEXIST) => {
                let meta = fs::metadata(&path).map_err(|e| io_err(&path, e))?;
                if !meta.file_type().is_fifo() {
                    return Err(DaemonError::NotAFifo { path });
                }
                tracing::info!(path = %path.display(), "reusing existing named pipe");
            }
            Err(source) => return Err(endpoint_err("create", path, source)),
        }
        Ok(Self {
            path,
            removed: false,
        })
    }

}

impl MessageSource for Channel {
    type Reader = PipeReader;

    fn open_for_read(&mut self) -> Result<Opened<PipeReader>, DaemonError> {
        match fcntl::open(
            self.path.as_path(),
            OFlag::O_RDONLY | OFlag::O_CLOEXEC,
            Mode::empty(),
        ) {
            Ok(fd) => Ok(Opened::Ready(PipeReader {
                fd: Some(fd),
                path: self.path.clone(),
            })),
            Err(Errno::EINTR) => Ok(Opened::Interrupted),
            Err(source) => Err(endpoint_err("open", &self.path, source)),
        }
    }

    fn remove(&mut self) -> Result<(), DaemonError> {
        if self.removed {
            return Ok(());
        }
        fs::remove_file(&self.path).map_err(|e| io_err(&self.path, e))?;
        self.removed = true;
        tracing::info!(path = %self.path.display(), "removed named pipe");
        Ok(())
    }
}

/// Read end of one writer connection.
#[derive(Debug)]
pub struct PipeReader {
    fd: Option<RawFd>,
    path: PathBuf,
}

impl ChunkReader for PipeReader {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, DaemonError> {
        let Some(fd) = self.fd else {
            return Err(endpoint_err("read", &self.path, Errno::EBADF));
        };
        match unistd::read(fd, buf) {
            Ok(0) => Ok(ReadOutcome::EndOfStream),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(Errno::EINTR) => Ok(ReadOutcome::Interrupted),
            Err(source) => Err(endpoint_err("read", &self.path, source)),
        }
    }

    fn close(mut self) -> Result<(), DaemonError> {
        let Some(fd) = self.fd.take() else {
            return Ok(());
        };
        match unistd::close(fd) {
            // Linux releases the descriptor even when close is interrupted.
            Ok(()) | Err(Errno::EINTR) => Ok(()),
            Err(source) => Err(endpoint_err("close", &self.path, source)),
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            let _ = unistd::close(fd);
        }
    }
}

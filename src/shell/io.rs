//! Standard stream wiring for a session
//!
//! [`SessionIo`] is the host-facing description of where a session's
//! commands read from and write to. The executor turns it into [`Streams`],
//! which redirections then rewrite per command.

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

/// Shared in-memory output buffer
///
/// Clones share the same storage, so a host can keep one handle while the
/// session writes through another.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes
    pub fn write_bytes(&self, data: &[u8]) {
        match self.bytes.lock() {
            Ok(mut guard) => guard.extend_from_slice(data),
            Err(poisoned) => poisoned.into_inner().extend_from_slice(data),
        }
    }

    /// Copy of everything captured so far
    pub fn contents(&self) -> Vec<u8> {
        match self.bytes.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Captured output as (lossy) UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    /// Remove and return everything captured so far
    pub fn take(&self) -> Vec<u8> {
        match self.bytes.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn clear(&self) {
        self.take();
    }

    /// Whether both handles share the same storage
    pub fn same_as(&self, other: &CaptureBuffer) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    pub fn is_empty(&self) -> bool {
        match self.bytes.lock() {
            Ok(guard) => guard.is_empty(),
            Err(poisoned) => poisoned.into_inner().is_empty(),
        }
    }
}

/// Where a session's commands read standard input from
#[derive(Debug, Clone, Default)]
pub enum InputSource {
    /// The host process's stdin
    #[default]
    Inherit,
    /// Empty input
    Null,
}

/// Where a session's commands write an output stream
#[derive(Debug, Clone, Default)]
pub enum OutputTarget {
    /// The host process's matching stream
    #[default]
    Inherit,
    /// Discard
    Null,
    /// Collect into a shared buffer
    Capture(CaptureBuffer),
}

/// Standard streams of a session
#[derive(Debug, Clone, Default)]
pub struct SessionIo {
    pub stdin: InputSource,
    pub stdout: OutputTarget,
    pub stderr: OutputTarget,
}

impl SessionIo {
    /// Use the host process's streams
    pub fn inherit() -> Self {
        Self::default()
    }

    /// Empty stdin, stdout and stderr captured; returns the two buffers
    pub fn captured() -> (Self, CaptureBuffer, CaptureBuffer) {
        let stdout = CaptureBuffer::new();
        let stderr = CaptureBuffer::new();
        let io = Self {
            stdin: InputSource::Null,
            stdout: OutputTarget::Capture(stdout.clone()),
            stderr: OutputTarget::Capture(stderr.clone()),
        };
        (io, stdout, stderr)
    }

    /// Empty stdin, all output discarded
    pub fn null() -> Self {
        Self {
            stdin: InputSource::Null,
            stdout: OutputTarget::Null,
            stderr: OutputTarget::Null,
        }
    }
}

/// Input side of a command's streams
#[derive(Debug, Clone)]
pub(crate) enum Source {
    Inherit,
    Null,
    Bytes(Arc<Vec<u8>>),
    File(Arc<File>),
    /// Read end of an OS pipe
    Fd(Arc<OwnedFd>),
}

impl Source {
    /// Stdio for a child plus bytes that must be fed to its stdin
    pub(crate) fn to_stdio(&self) -> io::Result<(Stdio, Option<Arc<Vec<u8>>>)> {
        Ok(match self {
            Source::Inherit => (Stdio::inherit(), None),
            Source::Null => (Stdio::null(), None),
            Source::Bytes(bytes) => (Stdio::piped(), Some(bytes.clone())),
            Source::File(file) => (Stdio::from(file.try_clone()?), None),
            Source::Fd(fd) => (Stdio::from(fd.try_clone()?), None),
        })
    }
}

impl From<&InputSource> for Source {
    fn from(source: &InputSource) -> Self {
        match source {
            InputSource::Inherit => Source::Inherit,
            InputSource::Null => Source::Null,
        }
    }
}

/// Output side of a command's streams
#[derive(Debug, Clone)]
pub(crate) enum Sink {
    Stdout,
    Stderr,
    Null,
    Capture(CaptureBuffer),
    File(Arc<File>),
}

impl Sink {
    pub(crate) fn from_target(target: &OutputTarget, fallback: Sink) -> Self {
        match target {
            OutputTarget::Inherit => fallback,
            OutputTarget::Null => Sink::Null,
            OutputTarget::Capture(buffer) => Sink::Capture(buffer.clone()),
        }
    }

    pub(crate) fn write_all(&self, data: &[u8]) -> io::Result<()> {
        match self {
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(data)?;
                out.flush()
            }
            Sink::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(data)?;
                err.flush()
            }
            Sink::Null => Ok(()),
            Sink::Capture(buffer) => {
                buffer.write_bytes(data);
                Ok(())
            }
            Sink::File(file) => (&**file).write_all(data),
        }
    }

    /// Stdio for a child; a capture sink needs a reader thread, signalled by
    /// the returned buffer
    pub(crate) fn to_stdio(&self, fd: u32) -> io::Result<(Stdio, Option<CaptureBuffer>)> {
        Ok(match self {
            Sink::Stdout if fd == 1 => (Stdio::inherit(), None),
            Sink::Stderr if fd == 2 => (Stdio::inherit(), None),
            Sink::Stdout => (Stdio::from(io::stdout().as_fd().try_clone_to_owned()?), None),
            Sink::Stderr => (Stdio::from(io::stderr().as_fd().try_clone_to_owned()?), None),
            Sink::Null => (Stdio::null(), None),
            Sink::Capture(buffer) => (Stdio::piped(), Some(buffer.clone())),
            Sink::File(file) => (Stdio::from(file.try_clone()?), None),
        })
    }
}

/// The three standard streams of a command being executed
#[derive(Debug, Clone)]
pub(crate) struct Streams {
    pub stdin: Source,
    pub stdout: Sink,
    pub stderr: Sink,
}

impl Streams {
    pub(crate) fn from_session(io: &SessionIo) -> Self {
        Self {
            stdin: Source::from(&io.stdin),
            stdout: Sink::from_target(&io.stdout, Sink::Stdout),
            stderr: Sink::from_target(&io.stderr, Sink::Stderr),
        }
    }

    /// Same streams with stdout collected into `buffer`
    pub(crate) fn capturing(&self, buffer: &CaptureBuffer) -> Self {
        Self {
            stdin: self.stdin.clone(),
            stdout: Sink::Capture(buffer.clone()),
            stderr: self.stderr.clone(),
        }
    }

    pub(crate) fn sink(&self, fd: u32) -> Option<&Sink> {
        match fd {
            1 => Some(&self.stdout),
            2 => Some(&self.stderr),
            _ => None,
        }
    }

    pub(crate) fn set_sink(&mut self, fd: u32, sink: Sink) -> bool {
        match fd {
            1 => self.stdout = sink,
            2 => self.stderr = sink,
            _ => return false,
        }
        true
    }

    /// Print a diagnostic on this command's stderr; failures are ignored
    pub(crate) fn diagnostic(&self, message: &str) {
        let line = format!("snail: {}\n", message);
        if let Err(e) = self.stderr.write_all(line.as_bytes()) {
            debug!("Failed to write diagnostic: {}", e);
        }
    }
}

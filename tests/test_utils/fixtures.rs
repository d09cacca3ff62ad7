//! Test Fixtures
//!
//! Sessions wired to in-memory output buffers.

use snail::shell::{CaptureBuffer, SessionIo};
use snail::{ExecutionSession, ShellEnv, ShellInterpreter};
use std::path::Path;

/// A real session whose stdout and stderr are captured
pub struct CapturedSession {
    pub session: ExecutionSession,
    pub stdout: CaptureBuffer,
    pub stderr: CaptureBuffer,
}

impl CapturedSession {
    /// Take everything written to stdout so far
    pub fn take_stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout.take()).into_owned()
    }

    pub fn take_stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr.take()).into_owned()
    }
}

/// Session inheriting the test process environment (for `PATH`)
pub fn captured_session() -> CapturedSession {
    let mut env = ShellEnv::new();
    let (io, stdout, stderr) = SessionIo::captured();
    env.set_io(io);
    CapturedSession {
        session: ExecutionSession::with_interpreter(ShellInterpreter::new(), env),
        stdout,
        stderr,
    }
}

/// Like [`captured_session`], starting in `dir`
pub fn captured_session_in(dir: &Path) -> CapturedSession {
    let mut captured = captured_session();
    captured.session.env_mut().set_cwd(dir.to_path_buf());
    captured
        .session
        .env_mut()
        .set("PWD", dir.to_string_lossy().into_owned());
    captured
}

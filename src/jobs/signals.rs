//! Job Signal Delivery
//!
//! Sends signals like SIGINT, SIGTERM and SIGKILL to the processes a
//! background job has spawned.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Signal types that can be sent to a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Interrupt signal (Ctrl+C)
    Interrupt,
    /// Termination signal (graceful shutdown)
    Terminate,
    /// Kill signal (forceful termination)
    Kill,
    /// Hangup signal
    Hangup,
    /// Continue signal
    Continue,
    /// Stop signal
    Stop,
}

impl Signal {
    /// Conventional signal number
    pub fn number(self) -> i32 {
        match self {
            Signal::Hangup => 1,
            Signal::Interrupt => 2,
            Signal::Kill => 9,
            Signal::Terminate => 15,
            Signal::Continue => 18,
            Signal::Stop => 19,
        }
    }

    /// Whether delivering this signal ends the job
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Signal::Interrupt | Signal::Terminate | Signal::Kill | Signal::Hangup
        )
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Kill => "SIGKILL",
            Signal::Hangup => "SIGHUP",
            Signal::Continue => "SIGCONT",
            Signal::Stop => "SIGSTOP",
        };
        f.write_str(name)
    }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        match name {
            "INT" | "2" => Ok(Signal::Interrupt),
            "TERM" | "15" => Ok(Signal::Terminate),
            "KILL" | "9" => Ok(Signal::Kill),
            "HUP" | "1" => Ok(Signal::Hangup),
            "CONT" | "18" => Ok(Signal::Continue),
            "STOP" | "19" => Ok(Signal::Stop),
            _ => Err(Error::SignalNotSupported {
                signal: s.to_string(),
                platform: std::env::consts::OS.to_string(),
            }),
        }
    }
}

/// Send signal to process by PID
pub fn send_signal_to_pid(pid: u32, signal: Signal) -> Result<()> {
    #[cfg(unix)]
    {
        send_unix_signal(pid, signal)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(Error::SignalNotSupported {
            signal: signal.to_string(),
            platform: std::env::consts::OS.to_string(),
        })
    }
}

/// Check if a process is still running
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Signal 0 performs the permission and existence checks only
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

#[cfg(unix)]
fn send_unix_signal(pid: u32, signal: Signal) -> Result<()> {
    use nix::sys::signal::{kill, Signal as NixSignal};
    use nix::unistd::Pid;

    let nix_signal = match signal {
        Signal::Interrupt => NixSignal::SIGINT,
        Signal::Terminate => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
        Signal::Hangup => NixSignal::SIGHUP,
        Signal::Continue => NixSignal::SIGCONT,
        Signal::Stop => NixSignal::SIGSTOP,
    };

    kill(Pid::from_raw(pid as i32), nix_signal).map_err(|e| Error::SignalSendFailed {
        signal: signal.to_string(),
        reason: e.to_string(),
    })
}

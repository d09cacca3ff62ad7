//! Background Job Model
//!
//! Identity, status and bookkeeping data for a list run with a trailing `&`.

use crate::jobs::Signal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session-scoped job number, starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "camelCase")]
pub enum JobStatus {
    /// Still executing
    Running,
    /// Finished with this exit status
    Done(i32),
    /// Ended by a signal sent through the job table
    #[serde(with = "signal_name")]
    Terminated(Signal),
}

impl JobStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Running)
    }

    /// Exit status once the job is over
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            JobStatus::Running => None,
            JobStatus::Done(code) => Some(*code),
            JobStatus::Terminated(signal) => Some(128 + signal.number()),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Done(0) => write!(f, "Done"),
            JobStatus::Done(code) => write!(f, "Exit {}", code),
            JobStatus::Terminated(signal) => write!(f, "Terminated ({})", signal),
        }
    }
}

/// Snapshot of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub id: JobId,
    /// Source text of the backgrounded list
    pub command: String,
    pub status: JobStatus,
    /// Child processes currently running on behalf of the job
    pub pids: Vec<u32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobInfo {
    /// `[1] Done    sleep 1` style status line
    pub fn status_line(&self) -> String {
        format!("[{}] {:<12} {}", self.id, self.status.to_string(), self.command)
    }
}

/// Notifications published by the job table
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// A job was registered and its work started
    Started { id: JobId, command: String },
    /// A job reached a terminal status
    Finished { id: JobId, status: JobStatus },
}

mod signal_name {
    use crate::jobs::Signal;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(signal: &Signal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(signal)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Signal, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

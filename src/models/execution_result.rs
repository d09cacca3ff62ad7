//! Execution Result Model
//!
//! The record returned for every call into a session. Its serialized form
//! is the contract hosts depend on:
//!
//! ```json
//! {"input":"echo hi","exitCode":0,"continue":false,"newline":false,"background":false,"error":null}
//! ```

use super::job::JobId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// The text submitted in this call, never the accumulated candidate
    pub input: String,

    /// Exit status of the command; 0 unless it exited
    pub exit_code: i32,

    /// More input is needed before anything can run
    #[serde(rename = "continue")]
    pub continue_input: bool,

    /// The next fragment must be joined with a line break
    pub newline: bool,

    /// The input ended by starting a background job
    pub background: bool,

    /// Execution failed before producing an exit status
    pub error: Option<String>,

    /// Job started by a backgrounded input; not part of the wire record
    #[serde(skip)]
    pub job: Option<JobId>,
}

/// The single terminal state an [`ExecutionResult`] represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultState<'a> {
    /// More input is needed; `newline` asks for a line break before it
    Continue { newline: bool },
    /// The input ended by starting a background job
    Background,
    /// The input ran; carries its exit status
    Exited(i32),
    /// The input could not run; carries the message
    Failed(&'a str),
}

impl ExecutionResult {
    /// Result of an incomplete round
    pub fn continuing(input: impl Into<String>, newline: bool) -> Self {
        Self {
            input: input.into(),
            continue_input: true,
            newline,
            ..Self::default()
        }
    }

    pub fn exited(input: impl Into<String>, exit_code: i32) -> Self {
        Self {
            input: input.into(),
            exit_code,
            ..Self::default()
        }
    }

    pub fn failed(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn backgrounded(input: impl Into<String>, job: JobId) -> Self {
        Self {
            input: input.into(),
            background: true,
            job: Some(job),
            ..Self::default()
        }
    }

    pub fn state(&self) -> ResultState<'_> {
        if self.continue_input {
            ResultState::Continue {
                newline: self.newline,
            }
        } else if self.background {
            ResultState::Background
        } else if let Some(message) = &self.error {
            ResultState::Failed(message)
        } else {
            ResultState::Exited(self.exit_code)
        }
    }

    /// Whether the fields describe exactly one terminal state
    pub fn is_consistent(&self) -> bool {
        let flags = [self.continue_input, self.background, self.error.is_some()]
            .iter()
            .filter(|set| **set)
            .count();
        flags <= 1
            && (!self.newline || self.continue_input)
            && (self.exit_code == 0 || flags == 0)
            && (self.job.is_some() == self.background)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state(), ResultState::Exited(0))
    }

    /// Wire form of the result
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

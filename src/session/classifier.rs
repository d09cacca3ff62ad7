//! Mapping of interpreter outcomes onto [`ExecutionResult`]

use crate::error::{Error, Result};
use crate::models::ExecutionResult;
use crate::shell::Outcome;

/// Highest exit status a command can report
pub const MAX_EXIT_STATUS: i32 = 255;

/// Build the result for one call
///
/// `input` is the text submitted in this call. Outcomes an interpreter is
/// not allowed to produce are returned as [`Error::ContractViolation`].
pub fn classify(input: &str, outcome: &Outcome) -> Result<ExecutionResult> {
    match outcome {
        Outcome::Incomplete(reason) => Ok(ExecutionResult::continuing(input, reason.needs_newline())),
        Outcome::ExitStatus(code) if (0..=MAX_EXIT_STATUS).contains(code) => {
            Ok(ExecutionResult::exited(input, *code))
        }
        Outcome::ExitStatus(code) => Err(Error::ContractViolation {
            reason: format!("exit status {} out of range 0..={}", code, MAX_EXIT_STATUS),
        }),
        Outcome::RuntimeError(message) if message.trim().is_empty() => Err(Error::ContractViolation {
            reason: "runtime error without a message".to_string(),
        }),
        Outcome::RuntimeError(message) => Ok(ExecutionResult::failed(input, message.clone())),
        Outcome::Backgrounded(job) => Ok(ExecutionResult::backgrounded(input, *job)),
    }
}

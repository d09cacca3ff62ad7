//! Core data models for snail
//!
//! Plain data exchanged with hosts: the per-call execution result and the
//! background job records published by the job table.

pub mod execution_result;
pub mod job;

// Re-exports for convenience
pub use execution_result::{ExecutionResult, ResultState};
pub use job::{JobEvent, JobId, JobInfo, JobStatus};

//! Test Utilities
//!
//! Shared fixtures and a scripted interpreter for driving sessions
//! without running real commands.

#![allow(dead_code)]

pub mod fixtures;
pub mod scripted_interpreter;

// Re-exports for convenience
pub use fixtures::{captured_session, captured_session_in, CapturedSession};
pub use scripted_interpreter::ScriptedInterpreter;

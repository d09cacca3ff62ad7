//! The shell interpreter capability
//!
//! A session never executes commands itself. It hands each candidate to an
//! [`Interpreter`], which either runs it or explains why it cannot run yet.
//! [`ShellInterpreter`] is the built-in implementation of a POSIX-style
//! subset: parser, word expansion, executor and builtins.

pub mod ast;
pub mod builtins;
pub mod env;
pub(crate) mod exec;
pub(crate) mod expand;
pub mod io;
pub mod parser;

pub use env::{is_valid_name, ShellEnv, Variable};
pub use io::{CaptureBuffer, InputSource, OutputTarget, SessionIo};
pub use parser::{diagnose, parse, Incomplete, ParseError};

use crate::jobs::JobId;
use exec::{Executor, Flow};
use io::Streams;
use thiserror::Error;

/// Failures that stop a candidate from running to completion
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{0}: command not found")]
    CommandNotFound(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("{0}: bad substitution")]
    BadSubstitution(String),

    #[error("{program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot start background job: {0}")]
    Job(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Exit status a shell conventionally reports for this failure
    pub fn status(&self) -> i32 {
        match self {
            ShellError::CommandNotFound(_) => 127,
            ShellError::Syntax(_) => 2,
            ShellError::Spawn { .. } => 126,
            ShellError::BadSubstitution(_) | ShellError::Job(_) | ShellError::Io(_) => 1,
        }
    }
}

/// What an interpreter made of one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The candidate is a prefix of valid input; more text is needed
    Incomplete(Incomplete),
    /// The candidate ran to completion
    ExitStatus(i32),
    /// The candidate could not be run; the message is for the user
    RuntimeError(String),
    /// The candidate ended by starting a background job
    Backgrounded(JobId),
}

/// Executes or diagnoses candidate command text against a shell environment
pub trait Interpreter: Send {
    fn execute_or_diagnose(&mut self, candidate: &str, env: &mut ShellEnv) -> Outcome;
}

impl<I: Interpreter + ?Sized> Interpreter for Box<I> {
    fn execute_or_diagnose(&mut self, candidate: &str, env: &mut ShellEnv) -> Outcome {
        (**self).execute_or_diagnose(candidate, env)
    }
}

/// The built-in interpreter
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellInterpreter;

impl ShellInterpreter {
    pub fn new() -> Self {
        Self
    }
}

impl Interpreter for ShellInterpreter {
    fn execute_or_diagnose(&mut self, candidate: &str, env: &mut ShellEnv) -> Outcome {
        env.clear_exit_request();

        let script = match parse(candidate) {
            Ok(script) => script,
            Err(ParseError::Incomplete(reason)) => {
                trace!("Candidate incomplete: {}", reason);
                return Outcome::Incomplete(reason);
            }
            Err(err) => {
                trace!("Candidate rejected: {}", err);
                env.set_last_status(2);
                return Outcome::RuntimeError(err.to_string());
            }
        };
        if script.is_empty() {
            return Outcome::ExitStatus(0);
        }

        let streams = Streams::from_session(env.io());
        let executor = Executor::new();
        match executor.run_script(&script.body, env, &streams) {
            Ok((_, Some(job))) => Outcome::Backgrounded(job),
            Ok((status, None)) => Outcome::ExitStatus(status),
            Err(Flow::Exit(status)) => {
                env.set_last_status(status);
                env.request_exit(status);
                Outcome::ExitStatus(status)
            }
            Err(Flow::Fatal(err)) => {
                debug!("Candidate failed: {}", err);
                env.set_last_status(err.status());
                Outcome::RuntimeError(err.to_string())
            }
        }
    }
}

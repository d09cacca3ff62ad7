//! Execution sessions
//!
//! An [`ExecutionSession`] owns one shell environment and one input
//! accumulator. Each call to [`ExecutionSession::run`] joins the submitted
//! text onto any held fragment, lets the interpreter execute or diagnose
//! the result, and reports it as an [`ExecutionResult`].
//!
//! ```no_run
//! use snail::session::ExecutionSession;
//!
//! # fn main() -> snail::Result<()> {
//! let mut session = ExecutionSession::new();
//! let first = session.run("cat <<EOF")?;
//! assert!(first.continue_input && first.newline);
//! session.run("hello")?;
//! let done = session.run("EOF")?;
//! assert_eq!(done.exit_code, 0);
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod classifier;
pub mod registry;

pub use accumulator::{AccumulatorState, InputAccumulator, PendingInput};
pub use classifier::classify;
pub use registry::{SessionHandle, SessionRegistry};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::jobs::JobTable;
use crate::models::ExecutionResult;
use crate::shell::{Interpreter, Outcome, ShellEnv, ShellInterpreter};
use std::fmt;
use std::time::Duration;

/// One interactive shell session
///
/// Holds the shell environment that persists between calls (variables,
/// working directory, background jobs) and the fragment of input still
/// waiting for its continuation. A session is driven by one caller at a
/// time; the registry serializes concurrent callers.
pub struct ExecutionSession {
    env: ShellEnv,
    accumulator: InputAccumulator,
    interpreter: Box<dyn Interpreter>,
}

impl ExecutionSession {
    /// Session with the built-in interpreter and the process environment
    pub fn new() -> Self {
        Self::with_interpreter(ShellInterpreter::new(), ShellEnv::new())
    }

    /// Session set up from configuration
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let env = ShellEnv::from_config(config)?;
        Ok(Self::with_interpreter(ShellInterpreter::new(), env))
    }

    /// Session driven by a custom interpreter
    pub fn with_interpreter(interpreter: impl Interpreter + 'static, env: ShellEnv) -> Self {
        Self {
            env,
            accumulator: InputAccumulator::new(),
            interpreter: Box::new(interpreter),
        }
    }

    /// Submit one fragment of input
    ///
    /// The result's `input` is `text` itself. Incomplete candidates are
    /// held for the next call; any other outcome discards them.
    pub fn run(&mut self, text: &str) -> Result<ExecutionResult> {
        let candidate = self.accumulator.submit(text);
        debug!("Running candidate ({} bytes)", candidate.len());

        let outcome = self.interpreter.execute_or_diagnose(&candidate, &mut self.env);
        let result = match classifier::classify(text, &outcome) {
            Ok(result) => result,
            Err(e) => {
                warn!("Discarding candidate: {}", e);
                self.accumulator.clear();
                return Err(e);
            }
        };

        match outcome {
            Outcome::Incomplete(reason) => {
                trace!("Holding incomplete input: {}", reason);
                self.accumulator.hold(candidate, reason.needs_newline());
            }
            _ => self.accumulator.clear(),
        }
        Ok(result)
    }

    /// Abandon any held fragment
    pub fn reset(&mut self) {
        if self.accumulator.is_accumulating() {
            debug!("Discarding pending input");
        }
        self.accumulator.clear();
    }

    /// Whether an incomplete fragment is being held
    pub fn is_accumulating(&self) -> bool {
        self.accumulator.is_accumulating()
    }

    /// The held fragment, if any
    pub fn pending_input(&self) -> Option<&PendingInput> {
        self.accumulator.pending()
    }

    pub fn env(&self) -> &ShellEnv {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut ShellEnv {
        &mut self.env
    }

    /// Background jobs started by this session
    pub fn jobs(&self) -> &JobTable {
        self.env.jobs()
    }

    /// Status given to `exit` by the last call, if it ran
    pub fn exit_requested(&self) -> Option<i32> {
        self.env.exit_requested()
    }

    /// Terminate every running background job
    pub fn shutdown(&self, grace: Duration) {
        let running = self.jobs().running();
        if running > 0 {
            info!("Terminating {} running job(s)", running);
        }
        self.jobs().terminate_all(grace);
    }
}

impl Default for ExecutionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSession")
            .field("cwd", &self.env.cwd())
            .field("accumulator", &self.accumulator)
            .finish_non_exhaustive()
    }
}

//! Scripted Interpreter
//!
//! Replays a fixed list of outcomes and records every candidate it was
//! handed, so session behavior can be checked independently of parsing.

use snail::{Interpreter, Outcome, ShellEnv};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct ScriptedInterpreter {
    outcomes: Arc<Mutex<VecDeque<Outcome>>>,
    candidates: Arc<Mutex<Vec<String>>>,
}

impl ScriptedInterpreter {
    pub fn new(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into_iter().collect())),
            candidates: Arc::default(),
        }
    }

    /// Candidates seen so far, in order
    pub fn candidates(&self) -> Vec<String> {
        self.candidates.lock().unwrap().clone()
    }
}

impl Interpreter for ScriptedInterpreter {
    fn execute_or_diagnose(&mut self, candidate: &str, _env: &mut ShellEnv) -> Outcome {
        self.candidates.lock().unwrap().push(candidate.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::ExitStatus(0))
    }
}

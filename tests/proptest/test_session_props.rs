//! Property-based tests for session accumulation
//!
//! A scripted interpreter stands in for the shell so that arbitrary
//! outcome sequences can be replayed against the accumulator logic.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use proptest::prelude::*;
use snail::jobs::JobId;
use snail::shell::Incomplete;
use snail::{ExecutionSession, Outcome, ShellEnv};
use test_utils::ScriptedInterpreter;

fn incomplete_strategy() -> impl Strategy<Value = Incomplete> {
    prop_oneof![
        "[A-Z]{1,5}".prop_map(|delimiter| Incomplete::HereDocLineBreak { delimiter }),
        "[A-Z]{1,5}".prop_map(|delimiter| Incomplete::HereDocBody { delimiter }),
        prop::sample::select(vec!['\'', '"', '`']).prop_map(Incomplete::Quote),
        Just(Incomplete::Escape),
        Just(Incomplete::Substitution),
        Just(Incomplete::Keyword("fi")),
        prop::sample::select(vec!["|", "&&", "||"]).prop_map(|op| Incomplete::Operator(op.to_string())),
    ]
}

fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        3 => incomplete_strategy().prop_map(Outcome::Incomplete),
        2 => (0i32..=255).prop_map(Outcome::ExitStatus),
        1 => "[a-z]{1,12}( [a-z]{1,8})?".prop_map(Outcome::RuntimeError),
        1 => (1u32..100).prop_map(|id| Outcome::Backgrounded(JobId(id))),
    ]
}

fn session_with(outcomes: &[Outcome]) -> (ExecutionSession, ScriptedInterpreter) {
    let interpreter = ScriptedInterpreter::new(outcomes.iter().cloned());
    let session = ExecutionSession::with_interpreter(interpreter.clone(), ShellEnv::empty("/".into()));
    (session, interpreter)
}

proptest! {
    #[test]
    fn test_results_are_always_consistent(
        steps in prop::collection::vec(("[ -~]{0,12}", outcome_strategy()), 1..20),
    ) {
        let outcomes: Vec<Outcome> = steps.iter().map(|(_, o)| o.clone()).collect();
        let (mut session, _) = session_with(&outcomes);

        for (text, outcome) in &steps {
            let result = session.run(text).unwrap();
            prop_assert!(result.is_consistent());
            prop_assert_eq!(&result.input, text);
            prop_assert_eq!(result.continue_input, matches!(outcome, Outcome::Incomplete(_)));
            prop_assert_eq!(session.is_accumulating(), result.continue_input);
        }
    }

    #[test]
    fn test_candidates_follow_the_joining_rule(
        steps in prop::collection::vec(("[ -~]{0,12}\n?", outcome_strategy()), 1..20),
    ) {
        let outcomes: Vec<Outcome> = steps.iter().map(|(_, o)| o.clone()).collect();
        let (mut session, interpreter) = session_with(&outcomes);

        // Reference model of the held buffer
        let mut held: Option<(String, bool)> = None;
        let mut expected = Vec::new();
        for (text, outcome) in &steps {
            let candidate = match &held {
                None => text.clone(),
                Some((buffer, true)) => format!("{}\n{}", buffer, text),
                Some((buffer, false)) => format!("{}{}", buffer, text),
            };
            session.run(text).unwrap();
            held = match outcome {
                Outcome::Incomplete(reason) => Some((candidate.clone(), reason.needs_newline())),
                _ => None,
            };
            expected.push(candidate);
        }
        prop_assert_eq!(interpreter.candidates(), expected);
    }

    #[test]
    fn test_completion_clears_pending_input(
        fragments in prop::collection::vec(incomplete_strategy(), 0..6),
        finish in prop_oneof![
            (0i32..=255).prop_map(Outcome::ExitStatus),
            Just(Outcome::RuntimeError("failed".to_string())),
        ],
    ) {
        let mut outcomes: Vec<Outcome> = fragments.into_iter().map(Outcome::Incomplete).collect();
        let held_rounds = outcomes.len();
        outcomes.push(finish);
        let (mut session, _) = session_with(&outcomes);

        for _ in 0..held_rounds {
            session.run("part").unwrap();
            prop_assert!(session.pending_input().is_some());
        }
        let result = session.run("end").unwrap();
        prop_assert!(!result.continue_input);
        prop_assert!(session.pending_input().is_none());
    }

    #[test]
    fn test_reset_always_returns_to_idle(
        fragments in prop::collection::vec(incomplete_strategy(), 1..6),
    ) {
        let outcomes: Vec<Outcome> = fragments.into_iter().map(Outcome::Incomplete).collect();
        let rounds = outcomes.len();
        let (mut session, interpreter) = session_with(&outcomes);

        for _ in 0..rounds {
            session.run("x").unwrap();
        }
        session.reset();
        prop_assert!(!session.is_accumulating());

        // The next candidate starts from scratch
        session.run("fresh").unwrap();
        let candidates = interpreter.candidates();
        prop_assert_eq!(candidates.last().map(String::as_str), Some("fresh"));
    }

    #[test]
    fn test_contract_violations_discard_pending_input(
        code in prop_oneof![i32::MIN..0, 256..i32::MAX],
    ) {
        let outcomes = vec![
            Outcome::Incomplete(Incomplete::Quote('\'')),
            Outcome::ExitStatus(code),
        ];
        let (mut session, _) = session_with(&outcomes);

        session.run("echo '").unwrap();
        prop_assert!(session.run("x'").is_err());
        prop_assert!(!session.is_accumulating());
    }
}

//! Unit tests for result classification
//!
//! Every interpreter outcome maps onto exactly one shape of
//! `ExecutionResult`; outcomes outside the contract are rejected.

use snail::jobs::JobId;
use snail::models::ResultState;
use snail::session::classify;
use snail::shell::Incomplete;
use snail::{Error, Outcome};

#[test]
fn test_heredoc_line_break_requests_newline() {
    let result = classify(
        "cat <<EOF",
        &Outcome::Incomplete(Incomplete::HereDocLineBreak {
            delimiter: "EOF".to_string(),
        }),
    )
    .unwrap();
    assert!(result.continue_input);
    assert!(result.newline);
    assert_eq!(result.exit_code, 0);
    assert!(!result.background);
    assert!(result.error.is_none());
}

#[test]
fn test_other_incomplete_reasons_need_no_newline() {
    let reasons = [
        Incomplete::HereDocBody {
            delimiter: "EOF".to_string(),
        },
        Incomplete::Quote('"'),
        Incomplete::Escape,
        Incomplete::Substitution,
        Incomplete::Group(')'),
        Incomplete::Keyword("fi"),
        Incomplete::Operator("&&".to_string()),
    ];
    for reason in reasons {
        let result = classify("x", &Outcome::Incomplete(reason.clone())).unwrap();
        assert_eq!(
            result.state(),
            ResultState::Continue { newline: false },
            "{:?}",
            reason
        );
    }
}

#[test]
fn test_input_is_the_submitted_text() {
    let result = classify("  echo hi  \n", &Outcome::ExitStatus(0)).unwrap();
    assert_eq!(result.input, "  echo hi  \n");
}

#[test]
fn test_exit_status_bounds() {
    assert_eq!(classify("x", &Outcome::ExitStatus(0)).unwrap().exit_code, 0);
    assert_eq!(classify("x", &Outcome::ExitStatus(255)).unwrap().exit_code, 255);

    for code in [-1, 256, 1000, i32::MIN, i32::MAX] {
        assert!(matches!(
            classify("x", &Outcome::ExitStatus(code)),
            Err(Error::ContractViolation { .. })
        ));
    }
}

#[test]
fn test_runtime_error_requires_message() {
    let result = classify("bad", &Outcome::RuntimeError("bad: command not found".into())).unwrap();
    assert_eq!(result.state(), ResultState::Failed("bad: command not found"));
    assert_eq!(result.exit_code, 0);

    for message in ["", "   ", "\n"] {
        assert!(matches!(
            classify("bad", &Outcome::RuntimeError(message.to_string())),
            Err(Error::ContractViolation { .. })
        ));
    }
}

#[test]
fn test_background_result() {
    let result = classify("sleep 9 &", &Outcome::Backgrounded(JobId(7))).unwrap();
    assert_eq!(result.state(), ResultState::Background);
    assert_eq!(result.job, Some(JobId(7)));
    assert!(!result.continue_input);
    assert!(result.error.is_none());
    assert_eq!(result.exit_code, 0);
}

#[test]
fn test_every_result_is_consistent() {
    let outcomes = [
        Outcome::Incomplete(Incomplete::Quote('\'')),
        Outcome::Incomplete(Incomplete::HereDocLineBreak {
            delimiter: "END".to_string(),
        }),
        Outcome::ExitStatus(3),
        Outcome::RuntimeError("boom".to_string()),
        Outcome::Backgrounded(JobId(1)),
    ];
    for outcome in &outcomes {
        assert!(classify("x", outcome).unwrap().is_consistent());
    }
}

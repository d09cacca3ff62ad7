//! Integration Tests for Session Flows
//!
//! End-to-end runs through `ExecutionSession::run` with the built-in
//! interpreter and real child processes, checking both the returned
//! results and the captured output.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use snail::models::ResultState;
use tempfile::TempDir;
use test_utils::{captured_session, captured_session_in};

#[test]
fn test_simple_command_output() {
    let mut t = captured_session();
    let result = t.session.run("echo hello world").unwrap();
    assert_eq!(result.state(), ResultState::Exited(0));
    assert_eq!(result.input, "echo hello world");
    assert_eq!(t.take_stdout(), "hello world\n");
}

#[test]
fn test_heredoc_needs_newline_then_completes() {
    let mut t = captured_session();

    let first = t.session.run("cat <<EOF").unwrap();
    assert!(first.continue_input);
    assert!(first.newline);
    assert!(first.error.is_none());

    let second = t.session.run("hello (unbalanced").unwrap();
    assert!(second.continue_input);
    assert!(second.newline);

    let done = t.session.run("EOF").unwrap();
    assert_eq!(done.state(), ResultState::Exited(0));
    assert_eq!(done.input, "EOF");
    assert!(!t.session.is_accumulating());
}

#[test]
fn test_heredoc_with_trailing_newline_needs_no_joiner() {
    let mut t = captured_session();
    let first = t.session.run("cat <<EOF\n").unwrap();
    assert!(first.continue_input);
    assert!(!first.newline);

    t.session.run("line one\n").unwrap();
    let done = t.session.run("EOF\n").unwrap();
    assert_eq!(done.state(), ResultState::Exited(0));
    assert_eq!(t.take_stdout(), "line one\n");
}

#[test]
fn test_heredoc_expands_variables() {
    let mut t = captured_session();
    t.session.run("NAME=snail").unwrap();
    t.session.run("cat <<EOF").unwrap();
    t.session.run("hi $NAME").unwrap();
    t.session.run("EOF").unwrap();
    assert_eq!(t.take_stdout(), "hi snail\n");

    t.session.run("cat <<'EOF'").unwrap();
    t.session.run("hi $NAME").unwrap();
    t.session.run("EOF").unwrap();
    assert_eq!(t.take_stdout(), "hi $NAME\n");
}

#[test]
fn test_multi_line_quote() {
    let mut t = captured_session();
    let first = t.session.run("echo 'first\n").unwrap();
    assert_eq!(first.state(), ResultState::Continue { newline: false });
    let done = t.session.run("second'\n").unwrap();
    assert_eq!(done.state(), ResultState::Exited(0));
    assert_eq!(t.take_stdout(), "first\nsecond\n");
}

#[test]
fn test_trailing_pipe_continues() {
    let mut t = captured_session();
    assert!(t.session.run("echo shout |").unwrap().continue_input);
    let done = t.session.run(" tr a-z A-Z").unwrap();
    assert_eq!(done.exit_code, 0);
    assert_eq!(t.take_stdout(), "SHOUT\n");
}

#[test]
fn test_exit_status_passthrough() {
    let mut t = captured_session();
    for code in [0, 1, 2, 42, 126, 127, 128, 200, 255] {
        let result = t.session.run(&format!("(exit {})", code)).unwrap();
        assert_eq!(result.state(), ResultState::Exited(code));
    }
    let result = t.session.run("sh -c 'exit 7'").unwrap();
    assert_eq!(result.exit_code, 7);
}

#[test]
fn test_command_not_found_is_error() {
    let mut t = captured_session();
    let result = t.session.run("snail-no-such-command --flag").unwrap();
    assert_eq!(result.exit_code, 0);
    assert!(!result.continue_input);
    assert_eq!(
        result.error.as_deref(),
        Some("snail-no-such-command: command not found")
    );

    // The session stays usable and $? reflects the failure
    t.session.run("echo $?").unwrap();
    assert_eq!(t.take_stdout(), "127\n");
}

#[test]
fn test_syntax_error_is_error_not_continue() {
    let mut t = captured_session();
    let result = t.session.run("echo ) oops").unwrap();
    assert!(result.error.is_some());
    assert!(!result.continue_input);
    assert!(!t.session.is_accumulating());
}

#[test]
fn test_deeply_nested_input_is_rejected() {
    let mut t = captured_session();
    let result = t.session.run(&"(".repeat(1000)).unwrap();
    assert!(result.error.is_some());
    assert!(!result.continue_input);
    assert!(!t.session.is_accumulating());

    // Still usable afterwards
    t.session.run("echo ok").unwrap();
    assert_eq!(t.take_stdout(), "ok\n");
}

#[test]
fn test_environment_persists_between_calls() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("inner")).unwrap();
    let mut t = captured_session_in(dir.path());

    t.session.run("cd inner").unwrap();
    t.session.run("export GREETING=hello").unwrap();
    t.session.run("pwd").unwrap();
    t.session.run("sh -c 'echo $GREETING'").unwrap();

    let out = t.take_stdout();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], dir.path().join("inner").to_str().unwrap());
    assert_eq!(lines[1], "hello");
}

#[test]
fn test_unexported_variables_stay_local() {
    let mut t = captured_session();
    t.session.run("LOCAL_ONLY=1").unwrap();
    t.session.run("sh -c 'echo \"[${LOCAL_ONLY}]\"'").unwrap();
    assert_eq!(t.take_stdout(), "[]\n");

    t.session.run("LOCAL_ONLY=2 sh -c 'echo \"[${LOCAL_ONLY}]\"'").unwrap();
    assert_eq!(t.take_stdout(), "[2]\n");
    assert_eq!(t.session.env().get("LOCAL_ONLY"), Some("1"));
}

#[test]
fn test_external_pipeline() {
    let mut t = captured_session();
    let result = t.session.run("printf 'b\\na\\nc\\n' | sort | head -n 2").unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(t.take_stdout(), "a\nb\n");
}

#[test]
fn test_pipeline_status_is_last_stage() {
    let mut t = captured_session();
    assert_eq!(t.session.run("false | true").unwrap().exit_code, 0);
    assert_eq!(t.session.run("true | sh -c 'exit 3'").unwrap().exit_code, 3);
    assert_eq!(t.session.run("! true | false").unwrap().exit_code, 0);
}

#[test]
fn test_external_pipeline_carries_data() {
    let mut t = captured_session();
    t.session.run("printf 'a\\nb\\n' | head -n 1").unwrap();
    assert_eq!(t.take_stdout(), "a\n");

    t.session.run("seq 1 3 | tail -n 1").unwrap();
    assert_eq!(t.take_stdout(), "3\n");

    let result = t.session.run("yes | head -n 1").unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(t.take_stdout(), "y\n");
}

#[test]
fn test_external_pipeline_into_file() {
    let dir = TempDir::new().unwrap();
    let mut t = captured_session_in(dir.path());
    t.session
        .run("printf 'x\\ny\\n' | head -n 1 > first.txt")
        .unwrap();
    let content = std::fs::read_to_string(dir.path().join("first.txt")).unwrap();
    assert_eq!(content, "x\n");
}

#[test]
fn test_builtin_feeds_external() {
    let mut t = captured_session();
    t.session.run("echo from-builtin | tr a-z A-Z").unwrap();
    assert_eq!(t.take_stdout(), "FROM-BUILTIN\n");
}

#[test]
fn test_stderr_merged_into_pipe() {
    let mut t = captured_session();
    t.session.run("sh -c 'echo oops >&2' 2>&1 | tr a-z A-Z").unwrap();
    assert_eq!(t.take_stdout(), "OOPS\n");
    assert_eq!(t.take_stderr(), "");
}

#[test]
fn test_file_redirections() {
    let dir = TempDir::new().unwrap();
    let mut t = captured_session_in(dir.path());

    t.session.run("echo one > out.txt").unwrap();
    t.session.run("echo two >> out.txt").unwrap();
    t.session.run("wc -l < out.txt").unwrap();
    assert_eq!(t.take_stdout().trim(), "2");

    let content = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
    assert_eq!(content, "one\ntwo\n");
}

#[test]
fn test_unopenable_redirect_reports_status_one() {
    let mut t = captured_session();
    let result = t.session.run("cat < /definitely/not/here").unwrap();
    assert_eq!(result.state(), ResultState::Exited(1));
    assert!(t.take_stderr().contains("No such file or directory"));
}

#[test]
fn test_non_executable_file_reports_126() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("script.sh"), "echo hi\n").unwrap();
    let mut t = captured_session_in(dir.path());
    let result = t.session.run("./script.sh").unwrap();
    assert_eq!(result.state(), ResultState::Exited(126));
}

#[test]
fn test_signal_termination_status() {
    let mut t = captured_session();
    let result = t.session.run("sh -c 'kill -TERM $$'").unwrap();
    assert_eq!(result.exit_code, 143);
}

#[test]
fn test_command_substitution_with_external() {
    let mut t = captured_session();
    t.session.run("echo \"<$(printf 'x\\n\\n')>\"").unwrap();
    assert_eq!(t.take_stdout(), "<x>\n");

    t.session.run("V=$(sh -c 'exit 4')").unwrap();
    t.session.run("echo $?").unwrap();
    assert_eq!(t.take_stdout(), "4\n");
}

#[test]
fn test_pathname_expansion_in_session_cwd() {
    let dir = TempDir::new().unwrap();
    for name in ["b.rs", "a.rs", "notes.md"] {
        std::fs::write(dir.path().join(name), "").unwrap();
    }
    let mut t = captured_session_in(dir.path());
    t.session.run("echo *.rs").unwrap();
    assert_eq!(t.take_stdout(), "a.rs b.rs\n");
}

#[test]
fn test_control_flow_constructs() {
    let mut t = captured_session();
    t.session
        .run("for n in 1 2 3; do if [ $n = 2 ]; then continue_flag=1; else echo $n; fi; done")
        .unwrap();
    assert_eq!(t.take_stdout(), "1\n3\n");

    assert!(t.session.run("if false; then\n").unwrap().continue_input);
    assert!(t.session.run("  echo no\n").unwrap().continue_input);
    let result = t.session.run("else echo yes; fi\n").unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(t.take_stdout(), "yes\n");
}

#[test]
fn test_exit_builtin_requests_exit() {
    let mut t = captured_session();
    let result = t.session.run("exit 3").unwrap();
    assert_eq!(result.state(), ResultState::Exited(3));
    assert_eq!(t.session.exit_requested(), Some(3));
}

#[test]
fn test_wire_record() {
    let mut t = captured_session();
    let result = t.session.run("true").unwrap();
    assert_eq!(
        result.to_json().unwrap(),
        r#"{"input":"true","exitCode":0,"continue":false,"newline":false,"background":false,"error":null}"#
    );
}

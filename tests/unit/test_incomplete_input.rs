//! Unit tests for incomplete-input diagnosis
//!
//! Fragments that are a prefix of valid input are reported as incomplete
//! with the construct that is still open; complete or malformed text is not.

use snail::shell::{diagnose, parse, Incomplete, ParseError};

fn heredoc_line_break(delimiter: &str) -> Option<Incomplete> {
    Some(Incomplete::HereDocLineBreak {
        delimiter: delimiter.to_string(),
    })
}

fn heredoc_body(delimiter: &str) -> Option<Incomplete> {
    Some(Incomplete::HereDocBody {
        delimiter: delimiter.to_string(),
    })
}

#[test]
fn test_incomplete_fragments() {
    let cases = [
        ("echo 'abc", Some(Incomplete::Quote('\''))),
        ("echo \"abc", Some(Incomplete::Quote('"'))),
        ("echo `date", Some(Incomplete::Quote('`'))),
        ("echo \\", Some(Incomplete::Escape)),
        ("ls |", Some(Incomplete::Operator("|".to_string()))),
        ("true &&", Some(Incomplete::Operator("&&".to_string()))),
        ("false ||\n", Some(Incomplete::Operator("||".to_string()))),
        ("if true; then", Some(Incomplete::Keyword("fi"))),
        ("if true\n", Some(Incomplete::Keyword("then"))),
        ("while true; do echo", Some(Incomplete::Keyword("done"))),
        ("for x in a b", Some(Incomplete::Keyword("do"))),
        ("{ echo a;", Some(Incomplete::Keyword("}"))),
        ("(echo a", Some(Incomplete::Group(')'))),
        ("echo $(date", Some(Incomplete::Substitution)),
        ("echo ${HOME", Some(Incomplete::Substitution)),
    ];
    for (text, expected) in cases {
        assert_eq!(diagnose(text), expected, "diagnosing {:?}", text);
    }
}

#[test]
fn test_complete_inputs() {
    for text in [
        "",
        "echo hi",
        "echo 'a\nb'",
        "echo a\\\nb",
        "ls | wc -l",
        "if true; then echo y; fi",
        "cat <<EOF\nbody\nEOF",
        "cat <<EOF\nbody\nEOF\n",
    ] {
        assert_eq!(diagnose(text), None, "diagnosing {:?}", text);
        assert!(parse(text).is_ok(), "parsing {:?}", text);
    }
}

#[test]
fn test_syntax_errors_are_not_incomplete() {
    for text in ["fi", "echo ;;", "| ls", "echo )", "echo >"] {
        assert_eq!(diagnose(text), None, "diagnosing {:?}", text);
        assert!(matches!(parse(text), Err(ParseError::Syntax { .. })));
    }
}

#[test]
fn test_heredoc_newline_hint() {
    // Without the line break the body cannot start yet
    assert_eq!(diagnose("cat <<EOF"), heredoc_line_break("EOF"));
    assert!(diagnose("cat <<EOF").unwrap().needs_newline());

    // With it only the terminator is missing
    assert_eq!(diagnose("cat <<EOF\n"), heredoc_body("EOF"));
    assert!(!diagnose("cat <<EOF\n").unwrap().needs_newline());

    assert_eq!(diagnose("cat <<EOF\nline\n"), heredoc_body("EOF"));
    assert!(diagnose("cat <<EOF\nline").unwrap().needs_newline());
}

#[test]
fn test_quoted_heredoc_delimiter() {
    assert_eq!(diagnose("cat <<'END'"), heredoc_line_break("END"));
    assert_eq!(diagnose("cat <<-\"END\"\n\tbody\n"), heredoc_body("END"));
    assert_eq!(diagnose("cat <<-\"END\"\n\tbody\n\tEND\n"), None);
}

#[test]
fn test_only_heredocs_are_heredoc_reasons() {
    assert!(heredoc_line_break("EOF").unwrap().is_heredoc());
    assert!(heredoc_body("EOF").unwrap().is_heredoc());
    assert!(!Incomplete::Quote('\'').is_heredoc());
    assert!(!Incomplete::Operator("|".to_string()).needs_newline());
}

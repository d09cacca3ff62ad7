//! Property-based tests for parsing and diagnosis

use proptest::prelude::*;
use snail::shell::parser::MAX_NESTING;
use snail::shell::{diagnose, parse, Incomplete, ParseError};

const KEYWORDS: &[&str] = &[
    "if", "then", "else", "elif", "fi", "while", "until", "for", "do", "done", "in", "case",
    "esac", "select", "function", "time", "coproc",
];

proptest! {
    #[test]
    fn test_parse_doesnt_panic(s in "\\PC*") {
        let _ = parse(&s);
        // Should not panic on any input
    }

    #[test]
    fn test_deep_nesting_is_rejected(depth in (MAX_NESTING + 1)..2000usize, kind in 0..3usize) {
        let text = match kind {
            0 => "( ".repeat(depth),
            1 => "\"$(".repeat(depth / 2 + 1),
            _ => "$(".repeat(depth),
        };
        prop_assert!(matches!(parse(&text), Err(ParseError::Syntax { .. })), "expected ParseError::Syntax");
        prop_assert_eq!(diagnose(&text), None);
    }

    #[test]
    fn test_nesting_within_limit_is_incomplete(depth in 1..=MAX_NESTING) {
        let text = "( ".repeat(depth);
        prop_assert_eq!(diagnose(&text), Some(Incomplete::Group(')')));
    }

    #[test]
    fn test_diagnose_agrees_with_parse(s in "[ -~\n]{0,40}") {
        let incomplete = matches!(parse(&s), Err(ParseError::Incomplete(_)));
        prop_assert_eq!(diagnose(&s).is_some(), incomplete);
    }

    #[test]
    fn test_simple_words_are_complete(
        cmd in "[a-z]{1,10}",
        args in prop::collection::vec("[a-zA-Z0-9_./-]{1,10}", 0..5),
    ) {
        prop_assume!(!KEYWORDS.contains(&cmd.as_str()));
        let line = format!("{} {}", cmd, args.join(" "));
        prop_assert!(parse(&line).is_ok());
    }

    #[test]
    fn test_single_quoted_text_is_complete(body in "[^']{0,40}") {
        let line = format!("echo '{}'", body);
        prop_assert_eq!(diagnose(&line), None);
    }

    #[test]
    fn test_unclosed_single_quote_is_incomplete(body in "[^']{0,40}") {
        let line = format!("echo '{}", body);
        prop_assert_eq!(diagnose(&line), Some(Incomplete::Quote('\'')));
    }

    #[test]
    fn test_closing_the_quote_completes_it(
        first in "[a-z ]{0,20}",
        second in "[a-z ]{0,20}",
    ) {
        let open = format!("echo '{}\n", first);
        prop_assert!(diagnose(&open).is_some());
        let closed = format!("{}{}'", open, second);
        prop_assert_eq!(diagnose(&closed), None);
    }

    #[test]
    fn test_heredoc_completes_with_terminator(
        lines in prop::collection::vec("[a-z ]{0,20}", 0..5),
    ) {
        let mut text = String::from("cat <<EOF\n");
        for line in &lines {
            text.push_str(line);
            text.push('\n');
            prop_assert!(diagnose(&text).is_some_and(|r| r.is_heredoc()));
        }
        text.push_str("EOF");
        prop_assert!(parse(&text).is_ok());
    }

    #[test]
    fn test_trailing_pipe_is_incomplete(cmd in "[a-z]{1,10}") {
        prop_assume!(!KEYWORDS.contains(&cmd.as_str()));
        let line = format!("{} |", cmd);
        prop_assert_eq!(diagnose(&line), Some(Incomplete::Operator("|".to_string())));
    }
}

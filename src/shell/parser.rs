//! Shell syntax parsing with incompleteness diagnosis
//!
//! The grammar is handled by `brush_parser`, whose tree is converted into
//! the executable tree of [`super::ast`]. Before any text reaches it, a
//! single lexical pass decides whether the fragment is unfinished: open
//! quotes and substitutions, a trailing backslash, here-documents still
//! waiting for their body, and the compound commands and operators that
//! explain an "unexpected end of input" from the grammar. The same pass
//! measures nesting so that pathological input is rejected before any
//! recursive descent starts.

use std::fmt;
use std::io::Cursor;

use brush_parser::ast as sh;
use brush_parser::word::{
    Parameter, ParameterExpr, ParameterTestType, SpecialParameter, WordPiece, WordPieceWithSource,
};
use brush_parser::{ParserOptions, SourceInfo};

use super::ast::*;

/// Deepest nesting of quotes, substitutions and compound commands accepted
pub const MAX_NESTING: usize = 32;

/// What an incomplete fragment is still missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incomplete {
    /// A here-document is pending and the input does not end with the line
    /// break that would start (or continue) its body
    HereDocLineBreak { delimiter: String },
    /// A here-document body is open and its terminator line has not appeared
    HereDocBody { delimiter: String },
    /// Unterminated quoting (`'`, `"` or `` ` ``)
    Quote(char),
    /// Trailing backslash
    Escape,
    /// Unterminated `$( … )` or `${ … }`
    Substitution,
    /// Unclosed `(`, reported with the expected closing character
    Group(char),
    /// Open compound command waiting for a reserved word
    Keyword(&'static str),
    /// Trailing `|`, `&&`, `||` or `!`
    Operator(String),
}

impl Incomplete {
    /// Whether the caller should insert a line break before the next fragment
    pub fn needs_newline(&self) -> bool {
        matches!(self, Incomplete::HereDocLineBreak { .. })
    }

    /// Whether a here-document is what keeps the input open
    pub fn is_heredoc(&self) -> bool {
        matches!(
            self,
            Incomplete::HereDocLineBreak { .. } | Incomplete::HereDocBody { .. }
        )
    }
}

impl fmt::Display for Incomplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Incomplete::HereDocLineBreak { delimiter } | Incomplete::HereDocBody { delimiter } => {
                write!(f, "unclosed here-document '{}'", delimiter)
            }
            Incomplete::Quote(q) => write!(f, "reached EOF without closing quote {}", q),
            Incomplete::Escape => write!(f, "reached EOF after a backslash"),
            Incomplete::Substitution => write!(f, "reached EOF inside a substitution"),
            Incomplete::Group(c) => write!(f, "reached EOF without matching '{}'", c),
            Incomplete::Keyword(kw) => write!(f, "reached EOF without '{}'", kw),
            Incomplete::Operator(op) => write!(f, "'{}' must be followed by a command", op),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("{0}")]
    Incomplete(Incomplete),
    #[error("syntax error: {message}")]
    Syntax { message: String },
}

fn syntax(message: impl Into<String>) -> ParseError {
    ParseError::Syntax {
        message: message.into(),
    }
}

fn unsupported(construct: &str) -> ParseError {
    syntax(format!("{} is not supported", construct))
}

/// Parse a complete candidate
pub fn parse(text: &str) -> Result<Script, ParseError> {
    let scan = Scanner::new(text).run();
    if scan.depth > MAX_NESTING {
        return Err(syntax(format!(
            "nesting deeper than {} levels",
            MAX_NESTING
        )));
    }
    if let Some(reason) = scan.lexical_reason() {
        return Err(ParseError::Incomplete(reason));
    }

    let program = match parse_program(text) {
        Ok(program) => program,
        Err(brush_parser::ParseError::ParsingAtEndOfInput) => {
            return Err(match scan.grammar_reason() {
                Some(reason) => ParseError::Incomplete(reason),
                None => syntax("unexpected end of input"),
            });
        }
        Err(e) => return Err(syntax(e.to_string())),
    };

    let mut body = CommandList::new();
    for list in program.complete_commands {
        body.extend(convert_list(list)?);
    }
    Ok(Script { body })
}

/// Report whether `text` is an incomplete fragment, without keeping the tree
pub fn diagnose(text: &str) -> Option<Incomplete> {
    match parse(text) {
        Err(ParseError::Incomplete(reason)) => Some(reason),
        _ => None,
    }
}

fn parse_program(text: &str) -> Result<sh::Program, brush_parser::ParseError> {
    let options = ParserOptions::default();
    let source_info = SourceInfo::default();
    let cursor = Cursor::new(format!("{}\n", text));
    let mut parser = brush_parser::Parser::new(cursor, &options, &source_info);
    parser.parse_program()
}

/// Body of a command substitution, parsed on its own
fn parse_nested(text: &str) -> Result<CommandList, ParseError> {
    match parse(text) {
        Ok(script) => Ok(script.body),
        Err(ParseError::Incomplete(reason)) => Err(syntax(reason.to_string())),
        Err(e) => Err(e),
    }
}

// ---- conversion from the grammar tree ----

fn convert_list(list: sh::CompoundList) -> Result<CommandList, ParseError> {
    list.0.into_iter().map(convert_item).collect()
}

fn convert_item(item: sh::CompoundListItem) -> Result<ListItem, ParseError> {
    let source = item.0.to_string().trim().to_string();
    Ok(ListItem {
        and_or: convert_and_or(item.0)?,
        background: matches!(item.1, sh::SeparatorOperator::Async),
        source,
    })
}

fn convert_and_or(list: sh::AndOrList) -> Result<AndOr, ParseError> {
    let first = convert_pipeline(list.first)?;
    let mut rest = Vec::with_capacity(list.additional.len());
    for next in list.additional {
        rest.push(match next {
            sh::AndOr::And(pipeline) => (Connector::And, convert_pipeline(pipeline)?),
            sh::AndOr::Or(pipeline) => (Connector::Or, convert_pipeline(pipeline)?),
        });
    }
    Ok(AndOr { first, rest })
}

fn convert_pipeline(pipeline: sh::Pipeline) -> Result<Pipeline, ParseError> {
    let commands = pipeline
        .seq
        .into_iter()
        .map(convert_command)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Pipeline {
        negated: pipeline.bang,
        commands,
    })
}

fn convert_command(command: sh::Command) -> Result<Command, ParseError> {
    match command {
        sh::Command::Simple(simple) => Ok(Command::Simple(convert_simple(simple)?)),
        sh::Command::Compound(compound, redirects) => {
            let mut converted = Vec::new();
            if let Some(list) = redirects {
                for redirect in list.0 {
                    converted.extend(convert_redirect(redirect)?);
                }
            }
            Ok(Command::Compound(convert_compound(compound)?, converted))
        }
        sh::Command::Function(_) => Err(unsupported("function definition")),
        sh::Command::ExtendedTest(_) => Err(unsupported("[[ ]]")),
    }
}

fn convert_simple(command: sh::SimpleCommand) -> Result<SimpleCommand, ParseError> {
    let mut out = SimpleCommand::default();

    if let Some(prefix) = command.prefix {
        for item in prefix.0 {
            match item {
                sh::CommandPrefixOrSuffixItem::AssignmentWord(assignment, _) => {
                    out.assignments.push(convert_assignment(assignment)?);
                }
                other => convert_argument(other, &mut out)?,
            }
        }
    }
    if let Some(name) = command.word_or_name {
        out.words.push(convert_word(&name)?);
    }
    if let Some(suffix) = command.suffix {
        for item in suffix.0 {
            convert_argument(item, &mut out)?;
        }
    }
    Ok(out)
}

/// Words and redirections; after the command name an assignment is a word
fn convert_argument(
    item: sh::CommandPrefixOrSuffixItem,
    out: &mut SimpleCommand,
) -> Result<(), ParseError> {
    match item {
        sh::CommandPrefixOrSuffixItem::Word(word)
        | sh::CommandPrefixOrSuffixItem::AssignmentWord(_, word) => {
            out.words.push(convert_word(&word)?);
        }
        sh::CommandPrefixOrSuffixItem::IoRedirect(redirect) => {
            out.redirects.extend(convert_redirect(redirect)?);
        }
        sh::CommandPrefixOrSuffixItem::ProcessSubstitution(..) => {
            return Err(unsupported("process substitution"));
        }
    }
    Ok(())
}

fn convert_assignment(assignment: sh::Assignment) -> Result<Assignment, ParseError> {
    let value = match &assignment.value {
        sh::AssignmentValue::Scalar(word) => convert_word(word)?,
        sh::AssignmentValue::Array(_) => return Err(unsupported("array assignment")),
    };
    Ok(Assignment {
        name: assignment.name.to_string(),
        value,
    })
}

fn convert_compound(command: sh::CompoundCommand) -> Result<CompoundCommand, ParseError> {
    match command {
        sh::CompoundCommand::BraceGroup(group) => Ok(CompoundCommand::Group(convert_list(group.list)?)),
        sh::CompoundCommand::Subshell(subshell) => {
            Ok(CompoundCommand::Subshell(convert_list(subshell.list)?))
        }
        sh::CompoundCommand::ForClause(clause) => {
            let words = match clause.values {
                Some(values) => Some(
                    values
                        .iter()
                        .map(convert_word)
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                None => None,
            };
            Ok(CompoundCommand::For {
                variable: clause.variable_name,
                words,
                body: convert_list(clause.body.list)?,
            })
        }
        sh::CompoundCommand::WhileClause(clause) => Ok(CompoundCommand::Loop {
            kind: LoopKind::While,
            condition: convert_list(clause.0)?,
            body: convert_list(clause.1.list)?,
        }),
        sh::CompoundCommand::UntilClause(clause) => Ok(CompoundCommand::Loop {
            kind: LoopKind::Until,
            condition: convert_list(clause.0)?,
            body: convert_list(clause.1.list)?,
        }),
        sh::CompoundCommand::IfClause(clause) => {
            let mut branches = vec![(convert_list(clause.condition)?, convert_list(clause.then)?)];
            let mut otherwise = None;
            for branch in clause.elses.unwrap_or_default() {
                match branch.condition {
                    Some(condition) => {
                        branches.push((convert_list(condition)?, convert_list(branch.body)?))
                    }
                    None => otherwise = Some(convert_list(branch.body)?),
                }
            }
            Ok(CompoundCommand::If {
                branches,
                otherwise,
            })
        }
        sh::CompoundCommand::CaseClause(_) => Err(unsupported("case")),
        sh::CompoundCommand::Arithmetic(_) | sh::CompoundCommand::ArithmeticForClause(_) => {
            Err(unsupported("arithmetic"))
        }
    }
}

fn convert_redirect(redirect: sh::IoRedirect) -> Result<Vec<Redirect>, ParseError> {
    let (fd, kind) = match redirect {
        sh::IoRedirect::File(fd, kind, target) => {
            let word = match target {
                sh::IoFileRedirectTarget::Filename(word) | sh::IoFileRedirectTarget::Duplicate(word) => {
                    convert_word(&word)?
                }
                sh::IoFileRedirectTarget::Fd(n) => Word::literal(n.to_string()),
                sh::IoFileRedirectTarget::ProcessSubstitution(..) => {
                    return Err(unsupported("process substitution"))
                }
            };
            let kind = match kind {
                sh::IoFileRedirectKind::Read => RedirectKind::Input(word),
                sh::IoFileRedirectKind::Write => RedirectKind::Output(word),
                sh::IoFileRedirectKind::Append => RedirectKind::Append(word),
                sh::IoFileRedirectKind::DuplicateInput => RedirectKind::DupInput(word),
                sh::IoFileRedirectKind::DuplicateOutput => RedirectKind::DupOutput(word),
                _ => return Err(unsupported("this redirection")),
            };
            (fd, kind)
        }
        sh::IoRedirect::HereDocument(fd, doc) => {
            let strip_tabs = doc.remove_tabs;
            let body = heredoc_text(&doc.doc.to_string(), strip_tabs);
            let word = if doc.requires_expansion {
                heredoc_word(&body)?
            } else {
                Word {
                    parts: vec![WordPart::Literal {
                        text: body.clone(),
                        quoted: true,
                    }],
                }
            };
            let heredoc = HereDoc {
                delimiter: unquote_delimiter(&doc.here_end.to_string()),
                literal: !doc.requires_expansion,
                strip_tabs,
                body,
                word,
            };
            (fd, RedirectKind::HereDoc(heredoc))
        }
        sh::IoRedirect::HereString(fd, word) => (fd, RedirectKind::HereString(convert_word(&word)?)),
        sh::IoRedirect::OutputAndError(word, append) => {
            // `&>file` is `>file 2>&1`
            let word = convert_word(&word)?;
            let kind = if append {
                RedirectKind::Append(word)
            } else {
                RedirectKind::Output(word)
            };
            return Ok(vec![
                Redirect { fd: None, kind },
                Redirect {
                    fd: Some(2),
                    kind: RedirectKind::DupOutput(Word::literal("1")),
                },
            ]);
        }
    };
    Ok(vec![Redirect {
        fd: fd.map(|n| n as u32),
        kind,
    }])
}

fn heredoc_text(raw: &str, strip_tabs: bool) -> String {
    let mut body = String::with_capacity(raw.len());
    for line in raw.split_inclusive('\n') {
        if strip_tabs {
            body.push_str(line.trim_start_matches('\t'));
        } else {
            body.push_str(line);
        }
    }
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    body
}

fn unquote_delimiter(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, '\'' | '"' | '\\')).collect()
}

/// An expandable here-document body, read as if it were double-quoted
///
/// In a here-document a `"` is an ordinary character, so quotes outside
/// command substitutions are escaped before the body is handed to the
/// word parser.
fn heredoc_word(body: &str) -> Result<Word, ParseError> {
    let mut quoted = String::with_capacity(body.len() + 2);
    quoted.push('"');
    let mut depth = 0usize;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('"') if depth == 0 => quoted.push_str("\\\\\\\""),
                Some(next) => {
                    quoted.push('\\');
                    quoted.push(next);
                }
                None => quoted.push_str("\\\\"),
            },
            '"' if depth == 0 => quoted.push_str("\\\""),
            '$' if chars.peek() == Some(&'(') => {
                quoted.push('$');
                quoted.push('(');
                chars.next();
                depth += 1;
            }
            '(' if depth > 0 => {
                quoted.push(c);
                depth += 1;
            }
            ')' if depth > 0 => {
                quoted.push(c);
                depth -= 1;
            }
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    word_from_text(&quoted)
}

fn convert_word(word: &sh::Word) -> Result<Word, ParseError> {
    word_from_text(&word.to_string())
}

fn word_from_text(text: &str) -> Result<Word, ParseError> {
    let mut parts = Vec::new();
    let rest = match split_tilde(text) {
        Some((user, rest)) => {
            parts.push(WordPart::Tilde(user.to_string()));
            rest
        }
        None => text,
    };
    if !rest.is_empty() {
        let pieces = brush_parser::word::parse(rest, &ParserOptions::default())
            .map_err(|e| syntax(format!("{}: {}", text, e)))?;
        push_pieces(&mut parts, pieces, false)?;
    }
    Ok(Word { parts })
}

/// Leading `~user` of a word, when the user name is plain text
fn split_tilde(text: &str) -> Option<(&str, &str)> {
    let after = text.strip_prefix('~')?;
    let end = after.find('/').unwrap_or(after.len());
    let user = &after[..end];
    user.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .then_some((user, &after[end..]))
}

fn push_pieces(
    parts: &mut Vec<WordPart>,
    pieces: Vec<WordPieceWithSource>,
    quoted: bool,
) -> Result<(), ParseError> {
    for piece in pieces {
        match piece.piece {
            WordPiece::Text(text) => push_text(parts, &text, quoted),
            WordPiece::SingleQuotedText(text) => push_text(parts, &text, true),
            WordPiece::DoubleQuotedSequence(inner) => {
                let before = parts.len();
                push_pieces(parts, inner, true)?;
                if parts.len() == before {
                    push_text(parts, "", true);
                }
            }
            WordPiece::EscapeSequence(sequence) => {
                let text = unescape(&sequence, quoted);
                if !text.is_empty() {
                    push_text(parts, &text, true);
                }
            }
            WordPiece::ParameterExpansion(expr) => parts.push(convert_parameter(expr, quoted)?),
            WordPiece::CommandSubstitution(body) => parts.push(WordPart::CommandSubst {
                body: parse_nested(&body)?,
                quoted,
            }),
            WordPiece::BackquotedCommandSubstitution(body) => parts.push(WordPart::CommandSubst {
                body: parse_nested(&unescape_backquoted(&body))?,
                quoted,
            }),
            WordPiece::ArithmeticExpression(_) => return Err(unsupported("arithmetic expansion")),
            _ => return Err(unsupported("this quoting form")),
        }
    }
    Ok(())
}

fn push_text(parts: &mut Vec<WordPart>, text: &str, quoted: bool) {
    if let Some(WordPart::Literal {
        text: last,
        quoted: last_quoted,
    }) = parts.last_mut()
    {
        if *last_quoted == quoted {
            last.push_str(text);
            return;
        }
    }
    if text.is_empty() && !quoted {
        return;
    }
    parts.push(WordPart::Literal {
        text: text.to_string(),
        quoted,
    });
}

/// Text of a backslash escape; inside double quotes only a few characters
/// lose their backslash
fn unescape(sequence: &str, quoted: bool) -> String {
    let escaped = sequence.strip_prefix('\\').unwrap_or(sequence);
    match escaped {
        "\n" => String::new(),
        "$" | "`" | "\"" | "\\" => escaped.to_string(),
        _ if quoted => sequence.to_string(),
        _ => escaped.to_string(),
    }
}

fn unescape_backquoted(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '$' | '`' | '\\' | '"') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn convert_parameter(expr: ParameterExpr, quoted: bool) -> Result<WordPart, ParseError> {
    let (parameter, indirect, op) = match expr {
        ParameterExpr::Parameter {
            parameter,
            indirect,
            ..
        } => (parameter, indirect, None),
        ParameterExpr::UseDefaultValues {
            parameter,
            indirect,
            test_type,
            default_value,
            ..
        } => {
            let word = operand(default_value)?;
            (parameter, indirect, Some(ParamOp::Default(word, param_test(test_type))))
        }
        ParameterExpr::AssignDefaultValues {
            parameter,
            indirect,
            test_type,
            default_value,
            ..
        } => {
            let word = operand(default_value)?;
            (parameter, indirect, Some(ParamOp::Assign(word, param_test(test_type))))
        }
        ParameterExpr::UseAlternativeValue {
            parameter,
            indirect,
            test_type,
            alternative_value,
            ..
        } => {
            let word = operand(alternative_value)?;
            (parameter, indirect, Some(ParamOp::Alternative(word, param_test(test_type))))
        }
        ParameterExpr::ParameterLength {
            parameter,
            indirect,
            ..
        } => (parameter, indirect, Some(ParamOp::Length)),
        _ => return Err(unsupported("this parameter expansion")),
    };
    if indirect {
        return Err(unsupported("indirect expansion"));
    }
    Ok(WordPart::Param {
        name: parameter_name(parameter)?,
        op,
        quoted,
    })
}

fn operand(text: Option<String>) -> Result<Word, ParseError> {
    match text {
        Some(text) => word_from_text(&text),
        None => Ok(Word::default()),
    }
}

fn param_test(test_type: ParameterTestType) -> ParamTest {
    match test_type {
        ParameterTestType::UnsetOrNull => ParamTest::UnsetOrNull,
        ParameterTestType::Unset => ParamTest::Unset,
    }
}

fn parameter_name(parameter: Parameter) -> Result<String, ParseError> {
    let name = match parameter {
        Parameter::Positional(n) => n.to_string(),
        Parameter::Named(name) => name,
        Parameter::Special(special) => match special {
            SpecialParameter::LastExitStatus => "?",
            SpecialParameter::ProcessId => "$",
            SpecialParameter::ShellName => "0",
            SpecialParameter::LastBackgroundProcessId => "!",
            SpecialParameter::PositionalParameterCount => "#",
            SpecialParameter::CurrentOptionFlags => "-",
            SpecialParameter::AllPositionalParameters { .. } => "@",
            #[allow(unreachable_patterns)]
            _ => return Err(unsupported("this special parameter")),
        }
        .to_string(),
        _ => return Err(unsupported("array parameter")),
    };
    Ok(name)
}

// ---- incompleteness scan ----

/// Constructs still open at some point of the scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    DoubleQuote,
    Backquote,
    /// `${`
    Param,
    /// `$(`
    Subst,
    /// `(`
    Paren,
    /// Reserved word owed by an open compound command
    Expect(&'static str),
}

impl Frame {
    fn is_lexical(self) -> bool {
        matches!(
            self,
            Frame::DoubleQuote | Frame::Backquote | Frame::Param | Frame::Subst
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForHeader {
    Name,
    AfterName,
    Words,
}

/// Where the scan stands inside the current command
#[derive(Debug, Clone, Copy)]
struct Position {
    command: bool,
    for_header: Option<ForHeader>,
    /// Next word is a redirection target
    operand: bool,
}

impl Position {
    fn start() -> Self {
        Self {
            command: true,
            for_header: None,
            operand: false,
        }
    }
}

#[derive(Debug)]
struct PendingHereDoc {
    delimiter: String,
    strip_tabs: bool,
}

/// Result of the lexical pass
#[derive(Debug, Default)]
struct Scan {
    stack: Vec<Frame>,
    depth: usize,
    open_quote: Option<char>,
    trailing_escape: bool,
    heredoc: Option<Incomplete>,
    trailing_op: Option<&'static str>,
}

impl Scan {
    /// Reasons that hold whatever the grammar makes of the text
    fn lexical_reason(&self) -> Option<Incomplete> {
        if let Some(quote) = self.open_quote {
            return Some(Incomplete::Quote(quote));
        }
        let innermost = self.stack.iter().rev().find(|frame| frame.is_lexical());
        match innermost {
            Some(Frame::DoubleQuote) => return Some(Incomplete::Quote('"')),
            Some(Frame::Backquote) => return Some(Incomplete::Quote('`')),
            Some(_) => return Some(Incomplete::Substitution),
            None => {}
        }
        if self.trailing_escape {
            return Some(Incomplete::Escape);
        }
        self.heredoc.clone()
    }

    /// Explanation for the grammar running out of input
    fn grammar_reason(&self) -> Option<Incomplete> {
        if let Some(op) = self.trailing_op {
            return Some(Incomplete::Operator(op.to_string()));
        }
        match self.stack.last().copied() {
            Some(Frame::Expect(keyword)) => Some(Incomplete::Keyword(keyword)),
            Some(Frame::Paren) => Some(Incomplete::Group(')')),
            _ => None,
        }
    }
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    scan: Scan,
    position: Position,
    /// Positions to restore when a `$(` closes
    saved: Vec<Position>,
    word: String,
    in_word: bool,
    word_quoted: bool,
    pending: Vec<PendingHereDoc>,
}

impl Scanner {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            scan: Scan::default(),
            position: Position::start(),
            saved: Vec::new(),
            word: String::new(),
            in_word: false,
            word_quoted: false,
            pending: Vec::new(),
        }
    }

    fn run(mut self) -> Scan {
        while let Some(c) = self.current() {
            let stop = match self.scan.stack.last() {
                Some(Frame::DoubleQuote) => self.step_double_quoted(c),
                Some(Frame::Backquote) => self.step_backquoted(c),
                Some(Frame::Param) => self.step_braced_param(c),
                _ => self.step_command(c),
            };
            if stop {
                break;
            }
        }
        self.end_word();
        if self.scan.heredoc.is_none() {
            if let Some(doc) = self.pending.first() {
                self.scan.heredoc = Some(Incomplete::HereDocLineBreak {
                    delimiter: doc.delimiter.clone(),
                });
            }
        }
        self.scan
    }

    fn step_double_quoted(&mut self, c: char) -> bool {
        match c {
            '"' => {
                self.pop();
                self.pos += 1;
            }
            '\\' => self.pos += 2,
            '$' => self.dollar(),
            '`' => {
                self.push(Frame::Backquote);
                self.pos += 1;
            }
            _ => self.pos += 1,
        }
        false
    }

    fn step_backquoted(&mut self, c: char) -> bool {
        match c {
            '`' => {
                self.pop();
                self.pos += 1;
            }
            '\\' => self.pos += 2,
            _ => self.pos += 1,
        }
        false
    }

    fn step_braced_param(&mut self, c: char) -> bool {
        match c {
            '}' => {
                self.pop();
                self.pos += 1;
            }
            '\\' => self.pos += 2,
            '\'' => self.single_quoted(),
            '"' => {
                self.push(Frame::DoubleQuote);
                self.pos += 1;
            }
            '`' => {
                self.push(Frame::Backquote);
                self.pos += 1;
            }
            '$' => self.dollar(),
            _ => self.pos += 1,
        }
        false
    }

    fn step_command(&mut self, c: char) -> bool {
        match c {
            ' ' | '\t' | '\r' => {
                self.end_word();
                self.pos += 1;
            }
            '\n' => {
                self.end_word();
                self.pos += 1;
                return self.newline();
            }
            '#' if !self.in_word => {
                while self.current().is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
            }
            '\\' => match self.peek(1) {
                Some('\n') => self.pos += 2,
                Some(_) => {
                    self.mark_word(true);
                    self.pos += 2;
                }
                None => {
                    self.scan.trailing_escape = true;
                    self.pos += 1;
                }
            },
            '\'' => {
                self.mark_word(true);
                self.single_quoted();
            }
            '"' => {
                self.mark_word(true);
                self.push(Frame::DoubleQuote);
                self.pos += 1;
            }
            '`' => {
                self.mark_word(true);
                self.push(Frame::Backquote);
                self.pos += 1;
            }
            '$' => {
                self.mark_word(true);
                self.dollar();
            }
            '(' => {
                self.end_word();
                self.push(Frame::Paren);
                self.position = Position::start();
                self.scan.trailing_op = None;
                self.pos += 1;
            }
            ')' => {
                self.end_word();
                self.scan.trailing_op = None;
                self.pos += 1;
                match self.scan.stack.last() {
                    Some(Frame::Paren) => {
                        self.scan.stack.pop();
                        self.position.command = false;
                    }
                    Some(Frame::Subst) => self.pop(),
                    // A case pattern, or a stray paren the grammar will reject
                    _ => self.position.command = true,
                }
            }
            ';' => {
                self.end_word();
                self.pos += if self.peek(1) == Some(';') { 2 } else { 1 };
                self.separator(None);
            }
            '&' => {
                self.end_word();
                match self.peek(1) {
                    Some('&') => {
                        self.pos += 2;
                        self.separator(Some("&&"));
                    }
                    Some('>') => {
                        self.pos += 2;
                        if self.current() == Some('>') {
                            self.pos += 1;
                        }
                        self.position.operand = true;
                        self.scan.trailing_op = None;
                    }
                    _ => {
                        self.pos += 1;
                        self.separator(None);
                    }
                }
            }
            '|' => {
                self.end_word();
                if self.peek(1) == Some('|') {
                    self.pos += 2;
                    self.separator(Some("||"));
                } else {
                    self.pos += 1;
                    self.separator(Some("|"));
                }
            }
            '<' | '>' => {
                self.end_word();
                self.redirect_operator(c);
            }
            _ => {
                self.mark_word(false);
                self.word.push(c);
                self.pos += 1;
            }
        }
        false
    }

    fn single_quoted(&mut self) {
        let start = self.pos + 1;
        match self.chars[start.min(self.chars.len())..]
            .iter()
            .position(|&c| c == '\'')
        {
            Some(offset) => self.pos = start + offset + 1,
            None => {
                self.scan.open_quote = Some('\'');
                self.pos = self.chars.len();
            }
        }
    }

    fn dollar(&mut self) {
        match self.peek(1) {
            Some('(') => {
                self.push(Frame::Subst);
                self.saved.push(self.position);
                self.position = Position::start();
                self.in_word = false;
                self.pos += 2;
            }
            Some('{') => {
                self.push(Frame::Param);
                self.pos += 2;
            }
            _ => self.pos += 1,
        }
    }

    fn redirect_operator(&mut self, c: char) {
        self.scan.trailing_op = None;
        if c == '<' && self.peek(1) == Some('<') {
            match self.peek(2) {
                Some('<') => {
                    self.pos += 3;
                    self.position.operand = true;
                }
                Some('-') => {
                    self.pos += 3;
                    self.heredoc_delimiter(true);
                }
                _ => {
                    self.pos += 2;
                    self.heredoc_delimiter(false);
                }
            }
            return;
        }
        self.pos += 1;
        if matches!(self.current(), Some('>' | '&' | '|')) {
            self.pos += 1;
        }
        self.position.operand = true;
    }

    /// Read the delimiter word after `<<`, quotes removed
    fn heredoc_delimiter(&mut self, strip_tabs: bool) {
        while matches!(self.current(), Some(' ' | '\t')) {
            self.pos += 1;
        }
        let mut delimiter = String::new();
        let mut found = false;
        while let Some(c) = self.current() {
            match c {
                ' ' | '\t' | '\n' | ';' | '&' | '|' | '<' | '>' | '(' | ')' => break,
                '\'' | '"' => {
                    found = true;
                    self.pos += 1;
                    loop {
                        match self.current() {
                            Some(q) if q == c => {
                                self.pos += 1;
                                break;
                            }
                            Some(q) => {
                                delimiter.push(q);
                                self.pos += 1;
                            }
                            None => {
                                self.scan.open_quote = Some(c);
                                break;
                            }
                        }
                    }
                }
                '\\' => {
                    found = true;
                    self.pos += 1;
                    if let Some(next) = self.current() {
                        delimiter.push(next);
                        self.pos += 1;
                    }
                }
                _ => {
                    found = true;
                    delimiter.push(c);
                    self.pos += 1;
                }
            }
        }
        if found {
            self.pending.push(PendingHereDoc {
                delimiter,
                strip_tabs,
            });
        }
    }

    /// Consume pending here-document bodies after a line break
    ///
    /// Returns true when the input ran out inside a body.
    fn newline(&mut self) -> bool {
        self.position = Position::start();
        for doc in std::mem::take(&mut self.pending) {
            loop {
                if self.pos >= self.chars.len() {
                    self.scan.heredoc = Some(Incomplete::HereDocBody {
                        delimiter: doc.delimiter,
                    });
                    return true;
                }
                let start = self.pos;
                while self.current().is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
                let line: String = self.chars[start..self.pos].iter().collect();
                let terminated = self.current() == Some('\n');
                if terminated {
                    self.pos += 1;
                }
                let line = if doc.strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                if line == doc.delimiter {
                    break;
                }
                if !terminated {
                    self.scan.heredoc = Some(Incomplete::HereDocLineBreak {
                        delimiter: doc.delimiter,
                    });
                    return true;
                }
            }
        }
        false
    }

    fn separator(&mut self, op: Option<&'static str>) {
        self.scan.trailing_op = op;
        self.position = Position::start();
    }

    fn mark_word(&mut self, quoted: bool) {
        if !self.in_word {
            self.in_word = true;
            self.word.clear();
            self.word_quoted = false;
            self.scan.trailing_op = None;
        }
        if quoted {
            self.word_quoted = true;
        }
    }

    fn end_word(&mut self) {
        if !self.in_word {
            return;
        }
        self.in_word = false;
        let word = std::mem::take(&mut self.word);
        let plain = !self.word_quoted;

        if self.position.operand {
            self.position.operand = false;
            return;
        }
        match self.position.for_header {
            Some(ForHeader::Name) => {
                self.position.for_header = Some(ForHeader::AfterName);
                return;
            }
            Some(ForHeader::AfterName) => {
                self.position.for_header = None;
                if plain && word == "in" {
                    self.position.for_header = Some(ForHeader::Words);
                } else if plain && word == "do" {
                    self.keyword("do");
                }
                return;
            }
            Some(ForHeader::Words) => return,
            None => {}
        }

        if self.position.command && plain {
            self.keyword(&word);
        } else {
            self.position.command = false;
        }
    }

    fn keyword(&mut self, word: &str) {
        let command = match word {
            "if" => {
                self.push(Frame::Expect("then"));
                true
            }
            "then" => {
                self.replace(Frame::Expect("then"), Frame::Expect("fi"));
                true
            }
            "elif" => {
                self.replace(Frame::Expect("fi"), Frame::Expect("then"));
                true
            }
            "else" => true,
            "fi" => {
                self.close(Frame::Expect("fi"));
                false
            }
            "while" | "until" => {
                self.push(Frame::Expect("do"));
                true
            }
            "for" => {
                self.push(Frame::Expect("do"));
                self.position.for_header = Some(ForHeader::Name);
                false
            }
            "do" => {
                self.replace(Frame::Expect("do"), Frame::Expect("done"));
                true
            }
            "done" => {
                self.close(Frame::Expect("done"));
                false
            }
            "case" => {
                self.push(Frame::Expect("esac"));
                false
            }
            "esac" => {
                self.close(Frame::Expect("esac"));
                false
            }
            "{" => {
                self.push(Frame::Expect("}"));
                true
            }
            "}" => {
                self.close(Frame::Expect("}"));
                false
            }
            "!" => {
                self.scan.trailing_op = Some("!");
                true
            }
            _ => false,
        };
        self.position.command = command;
    }

    fn push(&mut self, frame: Frame) {
        self.scan.stack.push(frame);
        self.scan.depth = self.scan.depth.max(self.scan.stack.len());
    }

    /// Close the innermost frame; back in command context the enclosing
    /// word continues and can no longer be a reserved word
    fn pop(&mut self) {
        let Some(frame) = self.scan.stack.pop() else {
            return;
        };
        if frame == Frame::Subst {
            self.position = self.saved.pop().unwrap_or_else(Position::start);
        }
        let in_command = !matches!(
            self.scan.stack.last(),
            Some(Frame::DoubleQuote | Frame::Backquote | Frame::Param)
        );
        if in_command {
            self.in_word = true;
            self.word_quoted = true;
            self.scan.trailing_op = None;
        }
    }

    fn replace(&mut self, from: Frame, to: Frame) {
        if let Some(top) = self.scan.stack.last_mut() {
            if *top == from {
                *top = to;
            }
        }
    }

    fn close(&mut self, frame: Frame) {
        if self.scan.stack.last() == Some(&frame) {
            self.scan.stack.pop();
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }
}

//! Executable syntax tree
//!
//! [`super::parser`] converts the grammar tree of `brush_parser` into these
//! types. Only constructs the executor can run survive the conversion, and
//! words are already split into quoted and unquoted parts.

/// A fully parsed candidate
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub body: CommandList,
}

impl Script {
    /// True when the input contained nothing but blanks and comments
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Whether the final list item asked for background execution
    pub fn ends_in_background(&self) -> bool {
        self.body.last().is_some_and(|item| item.background)
    }
}

pub type CommandList = Vec<ListItem>;

/// One and-or list with its terminator
#[derive(Debug, Clone)]
pub struct ListItem {
    pub and_or: AndOr,
    /// Terminated by `&`
    pub background: bool,
    /// Source text of the and-or list, used to label jobs
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct AndOr {
    pub first: Pipeline,
    pub rest: Vec<(Connector, Pipeline)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub negated: bool,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone)]
pub enum Command {
    Simple(SimpleCommand),
    Compound(CompoundCommand, Vec<Redirect>),
}

#[derive(Debug, Clone, Default)]
pub struct SimpleCommand {
    pub assignments: Vec<Assignment>,
    pub words: Vec<Word>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone)]
pub enum CompoundCommand {
    Subshell(CommandList),
    Group(CommandList),
    If {
        branches: Vec<(CommandList, CommandList)>,
        otherwise: Option<CommandList>,
    },
    Loop {
        kind: LoopKind,
        condition: CommandList,
        body: CommandList,
    },
    For {
        variable: String,
        /// `None` for a bare `for NAME do` (iterates nothing, no positional params)
        words: Option<Vec<Word>>,
        body: CommandList,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    Until,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub name: String,
    pub value: Word,
}

#[derive(Debug, Clone)]
pub struct Redirect {
    /// Explicit descriptor number, when given
    pub fd: Option<u32>,
    pub kind: RedirectKind,
}

impl Redirect {
    /// Descriptor the redirection applies to
    pub fn target_fd(&self) -> u32 {
        self.fd.unwrap_or(match self.kind {
            RedirectKind::Input(_)
            | RedirectKind::DupInput(_)
            | RedirectKind::HereDoc(_)
            | RedirectKind::HereString(_) => 0,
            RedirectKind::Output(_) | RedirectKind::Append(_) | RedirectKind::DupOutput(_) => 1,
        })
    }
}

#[derive(Debug, Clone)]
pub enum RedirectKind {
    Input(Word),
    Output(Word),
    Append(Word),
    DupInput(Word),
    DupOutput(Word),
    HereDoc(HereDoc),
    HereString(Word),
}

#[derive(Debug, Clone)]
pub struct HereDoc {
    pub delimiter: String,
    /// Quoted delimiter: body is taken literally
    pub literal: bool,
    pub strip_tabs: bool,
    /// Body text with tabs already stripped for `<<-`
    pub body: String,
    /// The body as a word in double-quote context, ready for expansion
    pub word: Word,
}

/// A shell word as a sequence of parts, quoting preserved
#[derive(Debug, Clone, Default)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            parts: vec![WordPart::Literal {
                text: text.into(),
                quoted: false,
            }],
        }
    }

    /// The word's text when it consists only of unquoted literal parts
    pub fn as_plain_literal(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                WordPart::Literal {
                    text,
                    quoted: false,
                } => out.push_str(text),
                _ => return None,
            }
        }
        Some(out)
    }

    /// Whether any part of the word came from quoting
    pub fn has_quotes(&self) -> bool {
        self.parts.iter().any(|part| match part {
            WordPart::Literal { quoted, .. } => *quoted,
            WordPart::Param { quoted, .. } => *quoted,
            WordPart::CommandSubst { quoted, .. } => *quoted,
            WordPart::Tilde(_) => false,
        })
    }
}

#[derive(Debug, Clone)]
pub enum WordPart {
    Literal { text: String, quoted: bool },
    Param { name: String, op: Option<ParamOp>, quoted: bool },
    CommandSubst { body: CommandList, quoted: bool },
    /// Leading `~` with an optional user name (only the current user is expanded)
    Tilde(String),
}

#[derive(Debug, Clone)]
pub enum ParamOp {
    /// `${NAME:-word}` or `${NAME-word}`
    Default(Word, ParamTest),
    /// `${NAME:=word}` or `${NAME=word}`
    Assign(Word, ParamTest),
    /// `${NAME:+word}` or `${NAME+word}`
    Alternative(Word, ParamTest),
    /// `${#NAME}`
    Length,
}

/// Which parameter values count as missing for the default-value forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamTest {
    /// With a colon: unset or empty
    UnsetOrNull,
    /// Without a colon: unset only
    Unset,
}

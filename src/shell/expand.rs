//! Word expansion
//!
//! Turns parsed [`Word`]s into argument strings: tilde, parameter and
//! command substitution, then field splitting of unquoted expansion
//! results, then pathname expansion of unquoted glob characters.

use super::ast::{CommandList, ParamOp, ParamTest, Word, WordPart};
use super::env::ShellEnv;
use super::io::Streams;
use super::ShellError;
use glob::{MatchOptions, Pattern};
use std::path::Path;

/// Runs the body of a command substitution and returns its output
pub(crate) trait Substitute {
    fn substitute(
        &self,
        body: &CommandList,
        env: &mut ShellEnv,
        streams: &Streams,
    ) -> Result<String, ShellError>;
}

const IFS_WHITESPACE: &[char] = &[' ', '\t', '\n'];

#[derive(Debug, Default)]
struct Field {
    text: String,
    /// Glob pattern with quoted characters escaped
    pattern: String,
    globbable: bool,
    started: bool,
}

#[derive(Debug, Default)]
struct FieldBuilder {
    fields: Vec<Field>,
    current: Field,
}

impl FieldBuilder {
    fn push_quoted(&mut self, text: &str) {
        self.current.text.push_str(text);
        self.current.pattern.push_str(&Pattern::escape(text));
        self.current.started = true;
    }

    fn push_unquoted(&mut self, text: &str) {
        for c in text.chars() {
            self.push_unquoted_char(c);
        }
    }

    fn push_unquoted_char(&mut self, c: char) {
        self.current.text.push(c);
        if matches!(c, '*' | '?' | '[') {
            self.current.globbable = true;
            self.current.pattern.push(c);
        } else if c == ']' {
            self.current.pattern.push(c);
        } else {
            self.current.pattern.push_str(&Pattern::escape(&c.to_string()));
        }
        self.current.started = true;
    }

    /// Unquoted expansion result: split on whitespace
    fn push_split(&mut self, text: &str) {
        for c in text.chars() {
            if IFS_WHITESPACE.contains(&c) {
                self.finish_field();
            } else {
                self.push_unquoted_char(c);
            }
        }
    }

    fn finish_field(&mut self) {
        let field = std::mem::take(&mut self.current);
        if field.started {
            self.fields.push(field);
        }
    }

    fn finish(mut self) -> Vec<Field> {
        self.finish_field();
        self.fields
    }
}

pub(crate) struct Expander<'a, S: Substitute> {
    env: &'a mut ShellEnv,
    streams: &'a Streams,
    runner: &'a S,
    substitution_status: Option<i32>,
}

impl<'a, S: Substitute> Expander<'a, S> {
    pub(crate) fn new(env: &'a mut ShellEnv, streams: &'a Streams, runner: &'a S) -> Self {
        Self {
            env,
            streams,
            runner,
            substitution_status: None,
        }
    }

    /// Exit status of the last command substitution performed, if any
    pub(crate) fn substitution_status(&self) -> Option<i32> {
        self.substitution_status
    }

    /// Full expansion of command words into fields
    pub(crate) fn expand_words(&mut self, words: &[Word]) -> Result<Vec<String>, ShellError> {
        let mut out = Vec::new();
        for word in words {
            let mut builder = FieldBuilder::default();
            self.expand_into(word, &mut builder)?;
            for field in builder.finish() {
                out.extend(self.glob_field(field));
            }
        }
        Ok(out)
    }

    /// Expansion to a single string: no field splitting, no globbing
    ///
    /// Used for assignment values, redirection targets and here-strings.
    pub(crate) fn expand_word(&mut self, word: &Word) -> Result<String, ShellError> {
        let mut text = String::new();
        for part in &word.parts {
            text.push_str(&self.expand_part_text(part)?);
        }
        Ok(text)
    }

    fn expand_into(&mut self, word: &Word, builder: &mut FieldBuilder) -> Result<(), ShellError> {
        for part in &word.parts {
            match part {
                WordPart::Literal { text, quoted: true } => builder.push_quoted(text),
                WordPart::Literal {
                    text,
                    quoted: false,
                } => builder.push_unquoted(text),
                WordPart::Tilde(_) => {
                    let text = self.expand_part_text(part)?;
                    builder.push_quoted(&text);
                }
                WordPart::Param { quoted, .. } | WordPart::CommandSubst { quoted, .. } => {
                    let text = self.expand_part_text(part)?;
                    if *quoted {
                        builder.push_quoted(&text);
                    } else {
                        builder.push_split(&text);
                    }
                }
            }
        }
        Ok(())
    }

    fn expand_part_text(&mut self, part: &WordPart) -> Result<String, ShellError> {
        match part {
            WordPart::Literal { text, .. } => Ok(text.clone()),
            WordPart::Tilde(user) => Ok(self.expand_tilde(user)),
            WordPart::Param { name, op, .. } => self.expand_param(name, op.as_ref()),
            WordPart::CommandSubst { body, .. } => {
                let output = self.runner.substitute(body, self.env, self.streams)?;
                self.substitution_status = Some(self.env.last_status());
                Ok(output.trim_end_matches('\n').to_string())
            }
        }
    }

    fn expand_tilde(&self, user: &str) -> String {
        if user.is_empty() {
            if let Some(home) = self.env.home() {
                return home.to_string_lossy().into_owned();
            }
        }
        // Other users' home directories are not looked up
        format!("~{}", user)
    }

    fn expand_param(&mut self, name: &str, op: Option<&ParamOp>) -> Result<String, ShellError> {
        let value = self.env.param(name);
        let is_set = |test: &ParamTest| match test {
            ParamTest::UnsetOrNull => value.as_deref().is_some_and(|v| !v.is_empty()),
            ParamTest::Unset => value.is_some(),
        };

        match op {
            None => Ok(value.unwrap_or_default()),
            Some(ParamOp::Length) => Ok(value.unwrap_or_default().chars().count().to_string()),
            Some(ParamOp::Default(word, test)) => {
                if is_set(test) {
                    Ok(value.unwrap_or_default())
                } else {
                    self.expand_word(word)
                }
            }
            Some(ParamOp::Alternative(word, test)) => {
                if is_set(test) {
                    self.expand_word(word)
                } else {
                    Ok(String::new())
                }
            }
            Some(ParamOp::Assign(word, test)) => {
                if is_set(test) {
                    return Ok(value.unwrap_or_default());
                }
                if !super::env::is_valid_name(name) {
                    return Err(ShellError::BadSubstitution(format!(
                        "${}: cannot assign in this way",
                        name
                    )));
                }
                let text = self.expand_word(word)?;
                self.env.set(name, text.clone());
                Ok(text)
            }
        }
    }

    fn glob_field(&self, field: Field) -> Vec<String> {
        if !field.globbable {
            return vec![field.text];
        }
        match glob_in(self.env.cwd(), &field.pattern) {
            Some(matches) if !matches.is_empty() => matches,
            _ => vec![field.text],
        }
    }
}

/// Pathname expansion of `pattern` relative to `cwd`, sorted
fn glob_in(cwd: &Path, pattern: &str) -> Option<Vec<String>> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let absolute = pattern.starts_with('/');
    let full = if absolute {
        pattern.to_string()
    } else {
        let base = Pattern::escape(&cwd.to_string_lossy());
        format!("{}/{}", base.trim_end_matches('/'), pattern)
    };

    let paths = match glob::glob_with(&full, options) {
        Ok(paths) => paths,
        Err(e) => {
            trace!("Invalid glob pattern '{}': {}", pattern, e);
            return None;
        }
    };

    let mut matches: Vec<String> = paths
        .filter_map(|entry| entry.ok())
        .map(|path| {
            if absolute {
                path.to_string_lossy().into_owned()
            } else {
                path.strip_prefix(cwd)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned()
            }
        })
        .collect();
    matches.sort();
    Some(matches)
}

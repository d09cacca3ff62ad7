//! Persistent shell state of a session
//!
//! Working directory, variables (with their export flag), the last exit
//! status and the stdio wiring survive from one `run` to the next. Cloning
//! a [`ShellEnv`] gives subshells and background jobs an independent copy
//! that still shares the session's job table.

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::jobs::{JobContext, JobTable};
use crate::shell::io::SessionIo;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("name pattern is a valid regex"));

/// Whether `name` can be used as a shell variable name
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// A shell variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub value: String,
    /// Passed to child processes
    pub exported: bool,
}

#[derive(Debug, Clone)]
pub struct ShellEnv {
    cwd: PathBuf,
    vars: BTreeMap<String, Variable>,
    last_status: i32,
    io: SessionIo,
    jobs: JobTable,
    job: Option<JobContext>,
    exit_requested: Option<i32>,
    shell_pid: u32,
}

impl ShellEnv {
    /// Environment seeded from the current process
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let mut env = Self::empty(cwd);
        for (name, value) in std::env::vars() {
            if is_valid_name(&name) {
                env.export(&name, Some(value));
            }
        }
        env.set("PWD", env.cwd.to_string_lossy().into_owned());
        env
    }

    /// Environment with no variables at all
    pub fn empty(cwd: PathBuf) -> Self {
        Self {
            cwd,
            vars: BTreeMap::new(),
            last_status: 0,
            io: SessionIo::default(),
            jobs: JobTable::new(),
            job: None,
            exit_requested: None,
            shell_pid: std::process::id(),
        }
    }

    /// Environment for a new session as described by `config`
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let mut env = if config.inherit_environment {
            Self::new()
        } else {
            let cwd = std::env::current_dir()?;
            Self::empty(cwd)
        };

        if let Some(dir) = &config.working_directory {
            let dir = env.resolve(dir);
            if !dir.is_dir() {
                return Err(Error::ConfigValidationFailed {
                    field: "session.working_directory".to_string(),
                    reason: format!("'{}' is not a directory", dir.display()),
                });
            }
            env.set_cwd(dir);
        }

        for (name, value) in &config.environment {
            if !is_valid_name(name) {
                return Err(Error::ConfigValidationFailed {
                    field: format!("session.environment.{}", name),
                    reason: "not a valid variable name".to_string(),
                });
            }
            env.export(name, Some(value.clone()));
        }
        env.set("PWD", env.cwd.to_string_lossy().into_owned());
        Ok(env)
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Change directory bookkeeping; the path must already be absolute
    pub fn set_cwd(&mut self, dir: PathBuf) {
        self.cwd = dir;
    }

    /// Resolve `path` against the working directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|var| var.value.as_str())
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    /// Set a variable, keeping its export flag
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.vars.get_mut(name) {
            Some(var) => var.value = value,
            None => {
                self.vars.insert(
                    name.to_string(),
                    Variable {
                        value,
                        exported: false,
                    },
                );
            }
        }
    }

    /// Mark a variable for export, optionally assigning it
    pub fn export(&mut self, name: &str, value: Option<String>) {
        let var = self.vars.entry(name.to_string()).or_insert(Variable {
            value: String::new(),
            exported: true,
        });
        var.exported = true;
        if let Some(value) = value {
            var.value = value;
        }
    }

    pub fn unset(&mut self, name: &str) -> bool {
        self.vars.remove(name).is_some()
    }

    /// Put back a variable saved with [`ShellEnv::variable`]
    pub(crate) fn restore(&mut self, name: &str, saved: Option<Variable>) {
        match saved {
            Some(var) => {
                self.vars.insert(name.to_string(), var);
            }
            None => {
                self.vars.remove(name);
            }
        }
    }

    /// Variables passed to child processes
    pub fn exported(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .filter(|(_, var)| var.exported)
            .map(|(name, var)| (name.as_str(), var.value.as_str()))
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.vars.iter().map(|(name, var)| (name.as_str(), var))
    }

    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    pub fn set_last_status(&mut self, status: i32) {
        self.last_status = status;
    }

    pub fn io(&self) -> &SessionIo {
        &self.io
    }

    pub fn set_io(&mut self, io: SessionIo) {
        self.io = io;
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Job this environment is executing on behalf of
    pub fn job(&self) -> Option<&JobContext> {
        self.job.as_ref()
    }

    /// Copy of this environment for running a background job
    pub(crate) fn for_job(&self, job: JobContext) -> Self {
        let mut env = self.clone();
        env.job = Some(job);
        env.exit_requested = None;
        env
    }

    /// Exit status given to the `exit` builtin, if it ran
    pub fn exit_requested(&self) -> Option<i32> {
        self.exit_requested
    }

    pub(crate) fn request_exit(&mut self, status: i32) {
        self.exit_requested = Some(status);
    }

    pub(crate) fn clear_exit_request(&mut self) {
        self.exit_requested = None;
    }

    /// `HOME`, falling back to the platform's notion of it
    pub fn home(&self) -> Option<PathBuf> {
        match self.get("HOME") {
            Some(home) if !home.is_empty() => Some(PathBuf::from(home)),
            _ => dirs::home_dir(),
        }
    }

    /// Value of a parameter, including the special ones
    pub fn param(&self, name: &str) -> Option<String> {
        match name {
            "?" => Some(self.last_status.to_string()),
            "$" => Some(self.shell_pid.to_string()),
            "0" => Some(crate::NAME.to_string()),
            "#" => Some("0".to_string()),
            "@" | "*" | "-" => Some(String::new()),
            _ => self.get(name).map(str::to_string),
        }
    }

    /// Locate a program the way `execvp` would, using this session's `PATH`
    pub fn lookup_program(&self, name: &str) -> Option<PathBuf> {
        if name.contains('/') {
            let path = self.resolve(name);
            return path.exists().then_some(path);
        }
        let search = self.get("PATH")?;
        search
            .split(':')
            .map(|dir| if dir.is_empty() { "." } else { dir })
            .map(|dir| self.resolve(dir).join(name))
            .find(|candidate| is_executable(candidate))
    }
}

impl Default for ShellEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}

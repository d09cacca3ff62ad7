//! Execution of parsed scripts
//!
//! Lists run sequentially, pipelines of external commands are joined with
//! OS pipes, and builtin or compound stages exchange byte buffers. Anything
//! that must abort the whole candidate travels up as [`Flow`].

use super::ast::*;
use super::builtins;
use super::env::{is_executable, ShellEnv};
use super::expand::{Expander, Substitute};
use super::io::{CaptureBuffer, Sink, Source, Streams};
use super::ShellError;
use crate::jobs::JobId;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::process::{Child, ChildStdout, Command as Process, ExitStatus};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Non-local exits from execution
#[derive(Debug)]
pub(crate) enum Flow {
    /// `exit` ran: unwind to the end of the current scope with this status
    Exit(i32),
    /// The candidate cannot continue
    Fatal(ShellError),
}

impl From<ShellError> for Flow {
    fn from(err: ShellError) -> Self {
        Flow::Fatal(err)
    }
}

impl From<io::Error> for Flow {
    fn from(err: io::Error) -> Self {
        Flow::Fatal(ShellError::Io(err))
    }
}

type Status = Result<i32, Flow>;

/// Status of a job stopped through its cancel flag (128 + SIGTERM)
const CANCELLED_STATUS: i32 = 143;

/// A simple command after expansion and redirection
enum Prepared {
    /// A redirection failed; the diagnostic has been written
    Failed(i32),
    Assign {
        assignments: Vec<(String, String)>,
        status: i32,
    },
    Builtin {
        argv: Vec<String>,
        assignments: Vec<(String, String)>,
        streams: Streams,
    },
    External {
        argv: Vec<String>,
        assignments: Vec<(String, String)>,
        streams: Streams,
    },
}

enum Launch {
    /// The program was found but could not be started
    Failed(i32),
    Running(Running),
}

/// One pipeline stage after it has been started
enum Stage {
    /// Ran to completion; carries the input for the next stage
    Finished(i32, Source),
    /// Child still running; carries the input for the next stage
    Spawned(Running, Source),
}

struct Running {
    program: String,
    child: Child,
    feeder: Option<JoinHandle<()>>,
    readers: Vec<JoinHandle<()>>,
}

impl Running {
    fn wait(self, env: &ShellEnv) -> i32 {
        let Running {
            program,
            mut child,
            feeder,
            readers,
        } = self;
        let pid = child.id();
        let status = match child.wait() {
            Ok(status) => exit_code(status),
            Err(e) => {
                warn!("Failed to wait for {} (pid {}): {}", program, pid, e);
                1
            }
        };
        for handle in feeder.into_iter().chain(readers) {
            if handle.join().is_err() {
                debug!("I/O thread for {} panicked", program);
            }
        }
        if let Some(job) = env.job() {
            job.untrack(pid);
        }
        trace!("{} (pid {}) exited with {}", program, pid, status);
        status
    }
}

/// Executes the command lists of one parsed script
#[derive(Debug, Clone, Default)]
pub(crate) struct Executor;

impl Executor {
    pub(crate) fn new() -> Self {
        Self
    }

    /// Run a top-level list
    ///
    /// Returns the final status and, when the last item was backgrounded,
    /// the job it started.
    pub(crate) fn run_script(
        &self,
        list: &CommandList,
        env: &mut ShellEnv,
        streams: &Streams,
    ) -> Result<(i32, Option<JobId>), Flow> {
        self.run_items(list, env, streams)
    }

    fn run_list(&self, list: &CommandList, env: &mut ShellEnv, streams: &Streams) -> Status {
        self.run_items(list, env, streams).map(|(status, _)| status)
    }

    fn run_items(
        &self,
        list: &CommandList,
        env: &mut ShellEnv,
        streams: &Streams,
    ) -> Result<(i32, Option<JobId>), Flow> {
        let mut status = 0;
        let mut last_job = None;
        for item in list {
            check_cancelled(env)?;
            if item.background {
                last_job = Some(self.spawn_job(item, env, streams)?);
                status = 0;
            } else {
                last_job = None;
                status = self.run_and_or(&item.and_or, env, streams)?;
            }
            env.set_last_status(status);
        }
        Ok((status, last_job))
    }

    fn spawn_job(&self, item: &ListItem, env: &ShellEnv, streams: &Streams) -> Result<JobId, Flow> {
        let executor = self.clone();
        let and_or = item.and_or.clone();
        let base = env.clone();
        let mut job_streams = streams.clone();
        if matches!(job_streams.stdin, Source::Inherit) {
            // Background jobs never read the terminal
            job_streams.stdin = Source::Null;
        }

        env.jobs()
            .spawn(item.source.clone(), move |context| {
                let mut job_env = base.for_job(context);
                match executor.run_and_or(&and_or, &mut job_env, &job_streams) {
                    Ok(status) | Err(Flow::Exit(status)) => status,
                    Err(Flow::Fatal(e)) => {
                        job_streams.diagnostic(&e.to_string());
                        e.status()
                    }
                }
            })
            .map_err(|e| Flow::Fatal(ShellError::Job(e.to_string())))
    }

    fn run_and_or(&self, and_or: &AndOr, env: &mut ShellEnv, streams: &Streams) -> Status {
        let mut status = self.run_pipeline(&and_or.first, env, streams)?;
        for (connector, pipeline) in &and_or.rest {
            env.set_last_status(status);
            let run_next = match connector {
                Connector::And => status == 0,
                Connector::Or => status != 0,
            };
            if run_next {
                check_cancelled(env)?;
                status = self.run_pipeline(pipeline, env, streams)?;
            }
        }
        Ok(status)
    }

    fn run_pipeline(&self, pipeline: &Pipeline, env: &mut ShellEnv, streams: &Streams) -> Status {
        let status = match pipeline.commands.as_slice() {
            [single] => self.run_command(single, env, streams)?,
            stages => self.run_stages(stages, env, streams)?,
        };
        if pipeline.negated {
            Ok(i32::from(status == 0))
        } else {
            Ok(status)
        }
    }

    fn run_stages(&self, stages: &[Command], env: &mut ShellEnv, streams: &Streams) -> Status {
        let last = stages.len() - 1;
        let mut input = streams.stdin.clone();
        let mut running: Vec<Running> = Vec::new();
        let mut last_running = false;
        let mut status = 0;

        for (index, command) in stages.iter().enumerate() {
            let is_last = index == last;
            // Every stage behaves like a subshell
            let mut stage_env = env.clone();
            let stage_streams = Streams {
                stdin: std::mem::replace(&mut input, Source::Null),
                stdout: streams.stdout.clone(),
                stderr: streams.stderr.clone(),
            };

            match self.run_stage(command, &mut stage_env, stage_streams, is_last) {
                Ok(Stage::Finished(code, next)) => {
                    status = code;
                    input = next;
                }
                Ok(Stage::Spawned(child, next)) => {
                    running.push(child);
                    last_running = is_last;
                    input = next;
                }
                Err(flow) => {
                    drop(input);
                    for child in running {
                        child.wait(env);
                    }
                    return Err(flow);
                }
            }
        }
        drop(input);

        let count = running.len();
        for (index, child) in running.into_iter().enumerate() {
            let code = child.wait(env);
            if last_running && index + 1 == count {
                status = code;
            }
        }
        Ok(status)
    }

    fn run_stage(
        &self,
        command: &Command,
        env: &mut ShellEnv,
        mut streams: Streams,
        is_last: bool,
    ) -> Result<Stage, Flow> {
        let buffer = CaptureBuffer::new();
        if !is_last {
            streams.stdout = Sink::Capture(buffer.clone());
        }
        let collected = |buffer: &CaptureBuffer| Source::Bytes(Arc::new(buffer.take()));

        let simple = match command {
            Command::Simple(simple) => simple,
            Command::Compound(..) => {
                let status = match self.run_command(command, env, &streams) {
                    Ok(status) | Err(Flow::Exit(status)) => status,
                    Err(fatal) => return Err(fatal),
                };
                return Ok(Stage::Finished(status, collected(&buffer)));
            }
        };

        match self.prepare_simple(simple, env, &streams)? {
            Prepared::Failed(status) | Prepared::Assign { status, .. } => {
                Ok(Stage::Finished(status, collected(&buffer)))
            }
            Prepared::Builtin {
                argv,
                assignments,
                streams,
            } => {
                let status = match self.run_builtin(&argv, &assignments, env, &streams) {
                    Ok(status) | Err(Flow::Exit(status)) => status,
                    Err(fatal) => return Err(fatal),
                };
                Ok(Stage::Finished(status, collected(&buffer)))
            }
            Prepared::External {
                argv,
                assignments,
                streams,
            } => {
                // Straight OS pipe unless redirections moved stdout or merged stderr into it
                let pipe = !is_last
                    && matches!(&streams.stdout, Sink::Capture(b) if b.same_as(&buffer))
                    && !matches!(&streams.stderr, Sink::Capture(b) if b.same_as(&buffer));
                let (launch, piped) = self.spawn_external(&argv, &assignments, env, &streams, pipe)?;
                match launch {
                    Launch::Failed(status) => Ok(Stage::Finished(status, collected(&buffer))),
                    Launch::Running(child) if pipe => {
                        let next = piped
                            .map(|out| Source::Fd(Arc::new(OwnedFd::from(out))))
                            .unwrap_or(Source::Null);
                        Ok(Stage::Spawned(child, next))
                    }
                    Launch::Running(child) if is_last => Ok(Stage::Spawned(child, Source::Null)),
                    Launch::Running(child) => {
                        let status = child.wait(env);
                        Ok(Stage::Finished(status, collected(&buffer)))
                    }
                }
            }
        }
    }

    fn run_command(&self, command: &Command, env: &mut ShellEnv, streams: &Streams) -> Status {
        match command {
            Command::Simple(simple) => self.run_simple(simple, env, streams),
            Command::Compound(compound, redirects) => {
                let Some(streams) = self.redirect(redirects, env, streams)? else {
                    return Ok(1);
                };
                self.run_compound(compound, env, &streams)
            }
        }
    }

    fn run_compound(
        &self,
        compound: &CompoundCommand,
        env: &mut ShellEnv,
        streams: &Streams,
    ) -> Status {
        match compound {
            CompoundCommand::Group(list) => self.run_list(list, env, streams),
            CompoundCommand::Subshell(list) => {
                let mut sub = env.clone();
                match self.run_list(list, &mut sub, streams) {
                    Ok(status) | Err(Flow::Exit(status)) => Ok(status),
                    Err(fatal) => Err(fatal),
                }
            }
            CompoundCommand::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if self.run_list(condition, env, streams)? == 0 {
                        return self.run_list(body, env, streams);
                    }
                }
                match otherwise {
                    Some(body) => self.run_list(body, env, streams),
                    None => Ok(0),
                }
            }
            CompoundCommand::Loop {
                kind,
                condition,
                body,
            } => {
                let mut status = 0;
                loop {
                    check_cancelled(env)?;
                    let tested = self.run_list(condition, env, streams)?;
                    let proceed = match kind {
                        LoopKind::While => tested == 0,
                        LoopKind::Until => tested != 0,
                    };
                    if !proceed {
                        break;
                    }
                    status = self.run_list(body, env, streams)?;
                }
                Ok(status)
            }
            CompoundCommand::For {
                variable,
                words,
                body,
            } => {
                let items = match words {
                    Some(words) => Expander::new(env, streams, self).expand_words(words)?,
                    None => Vec::new(),
                };
                let mut status = 0;
                for item in items {
                    check_cancelled(env)?;
                    env.set(variable, item);
                    status = self.run_list(body, env, streams)?;
                }
                Ok(status)
            }
        }
    }

    fn run_simple(&self, command: &SimpleCommand, env: &mut ShellEnv, streams: &Streams) -> Status {
        match self.prepare_simple(command, env, streams)? {
            Prepared::Failed(status) => Ok(status),
            Prepared::Assign {
                assignments,
                status,
            } => {
                for (name, value) in assignments {
                    env.set(&name, value);
                }
                Ok(status)
            }
            Prepared::Builtin {
                argv,
                assignments,
                streams,
            } => self.run_builtin(&argv, &assignments, env, &streams),
            Prepared::External {
                argv,
                assignments,
                streams,
            } => match self.spawn_external(&argv, &assignments, env, &streams, false)?.0 {
                Launch::Failed(status) => Ok(status),
                Launch::Running(child) => Ok(child.wait(env)),
            },
        }
    }

    fn prepare_simple(
        &self,
        command: &SimpleCommand,
        env: &mut ShellEnv,
        streams: &Streams,
    ) -> Result<Prepared, Flow> {
        let (argv, assignments, substituted) = {
            let mut expander = Expander::new(env, streams, self);
            let argv = expander.expand_words(&command.words)?;
            let mut assignments = Vec::with_capacity(command.assignments.len());
            for assignment in &command.assignments {
                let value = expander.expand_word(&assignment.value)?;
                assignments.push((assignment.name.clone(), value));
            }
            (argv, assignments, expander.substitution_status())
        };

        let Some(redirected) = self.redirect(&command.redirects, env, streams)? else {
            return Ok(Prepared::Failed(1));
        };

        let Some(name) = argv.first() else {
            return Ok(Prepared::Assign {
                assignments,
                status: substituted.unwrap_or(0),
            });
        };

        if builtins::is_builtin(name) {
            Ok(Prepared::Builtin {
                argv,
                assignments,
                streams: redirected,
            })
        } else {
            Ok(Prepared::External {
                argv,
                assignments,
                streams: redirected,
            })
        }
    }

    /// Run a builtin with its prefix assignments in effect for its duration
    fn run_builtin(
        &self,
        argv: &[String],
        assignments: &[(String, String)],
        env: &mut ShellEnv,
        streams: &Streams,
    ) -> Status {
        let saved: Vec<_> = assignments
            .iter()
            .map(|(name, _)| (name.clone(), env.variable(name).cloned()))
            .collect();
        for (name, value) in assignments {
            env.set(name, value.clone());
        }

        let result = builtins::run(&argv[0], &argv[1..], env, streams);

        for (name, previous) in saved.into_iter().rev() {
            env.restore(&name, previous);
        }
        result
    }

    fn spawn_external(
        &self,
        argv: &[String],
        assignments: &[(String, String)],
        env: &ShellEnv,
        streams: &Streams,
        pipe_stdout: bool,
    ) -> Result<(Launch, Option<ChildStdout>), Flow> {
        let name = &argv[0];
        let Some(path) = env.lookup_program(name) else {
            return Err(ShellError::CommandNotFound(name.clone()).into());
        };
        if path.is_dir() {
            streams.diagnostic(&format!("{}: Is a directory", name));
            return Ok((Launch::Failed(126), None));
        }
        if !is_executable(&path) {
            streams.diagnostic(&format!("{}: Permission denied", name));
            return Ok((Launch::Failed(126), None));
        }

        let mut process = Process::new(&path);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            process.arg0(name);
        }
        process
            .args(&argv[1..])
            .env_clear()
            .envs(env.exported())
            .envs(assignments.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(env.cwd());

        let (stdin, feed) = streams.stdin.to_stdio()?;
        let (stdout, capture_out) = if pipe_stdout {
            (std::process::Stdio::piped(), None)
        } else {
            streams.stdout.to_stdio(1)?
        };
        let (stderr, capture_err) = streams.stderr.to_stdio(2)?;
        process.stdin(stdin).stdout(stdout).stderr(stderr);

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                streams.diagnostic(&format!("{}: {}", name, describe_io(&e)));
                return Ok((Launch::Failed(126), None));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Found on PATH but exec failed, e.g. a missing script interpreter
                streams.diagnostic(&format!("{}: {}", name, describe_io(&e)));
                return Ok((Launch::Failed(127), None));
            }
            Err(e) => {
                return Err(ShellError::Spawn {
                    program: name.clone(),
                    source: e,
                }
                .into())
            }
        };

        let pid = child.id();
        if let Some(job) = env.job() {
            job.track(pid);
        }
        debug!("Spawned {} (pid {})", name, pid);

        let feeder = match (feed, child.stdin.take()) {
            (Some(bytes), Some(mut stdin)) => Some(thread::spawn(move || {
                if let Err(e) = stdin.write_all(&bytes) {
                    trace!("stdin feed ended early: {}", e);
                }
            })),
            _ => None,
        };

        // Only take a pipe end that is actually captured; a piped stdout
        // is handed on to the next stage below.
        let mut readers = Vec::new();
        if let Some(buffer) = capture_out {
            if let Some(out) = child.stdout.take() {
                readers.push(spawn_reader(out, buffer));
            }
        }
        if let Some(buffer) = capture_err {
            if let Some(err) = child.stderr.take() {
                readers.push(spawn_reader(err, buffer));
            }
        }
        let piped = if pipe_stdout { child.stdout.take() } else { None };

        let running = Running {
            program: name.clone(),
            child,
            feeder,
            readers,
        };
        Ok((Launch::Running(running), piped))
    }

    /// Apply redirections to `streams`
    ///
    /// `None` means a redirection could not be performed; its diagnostic
    /// has already been written and the command must not run.
    fn redirect(
        &self,
        redirects: &[Redirect],
        env: &mut ShellEnv,
        streams: &Streams,
    ) -> Result<Option<Streams>, Flow> {
        let mut out = streams.clone();
        for redirect in redirects {
            let fd = redirect.target_fd();
            let applied = match &redirect.kind {
                RedirectKind::Input(word) => {
                    let target = self.expand_target(word, env, streams)?;
                    match File::open(env.resolve(&target)) {
                        Ok(file) => set_input(&mut out, fd, Source::File(Arc::new(file))),
                        Err(e) => Err(format!("{}: {}", target, describe_io(&e))),
                    }
                }
                RedirectKind::Output(word) | RedirectKind::Append(word) => {
                    let target = self.expand_target(word, env, streams)?;
                    let append = matches!(redirect.kind, RedirectKind::Append(_));
                    match open_output(&env.resolve(&target), append) {
                        Ok(file) => set_output(&mut out, fd, Sink::File(Arc::new(file))),
                        Err(e) => Err(format!("{}: {}", target, describe_io(&e))),
                    }
                }
                RedirectKind::DupOutput(word) => {
                    let target = self.expand_target(word, env, streams)?;
                    if target == "-" {
                        set_output(&mut out, fd, Sink::Null)
                    } else if let Ok(source) = target.parse::<u32>() {
                        match out.sink(source).cloned() {
                            Some(sink) => set_output(&mut out, fd, sink),
                            None => Err(format!("{}: bad file descriptor", source)),
                        }
                    } else if redirect.fd.is_none() {
                        // `>&file` sends both stdout and stderr to the file
                        match open_output(&env.resolve(&target), false) {
                            Ok(file) => {
                                let sink = Sink::File(Arc::new(file));
                                out.stdout = sink.clone();
                                out.stderr = sink;
                                Ok(())
                            }
                            Err(e) => Err(format!("{}: {}", target, describe_io(&e))),
                        }
                    } else {
                        Err(format!("{}: ambiguous redirect", target))
                    }
                }
                RedirectKind::DupInput(word) => {
                    let target = self.expand_target(word, env, streams)?;
                    match target.as_str() {
                        "-" => set_input(&mut out, fd, Source::Null),
                        "0" if fd == 0 => Ok(()),
                        other => Err(format!("{}: bad file descriptor", other)),
                    }
                }
                RedirectKind::HereDoc(doc) => {
                    let body = Expander::new(env, streams, self).expand_word(&doc.word)?;
                    set_input(&mut out, fd, Source::Bytes(Arc::new(body.into_bytes())))
                }
                RedirectKind::HereString(word) => {
                    let mut text = self.expand_target(word, env, streams)?;
                    text.push('\n');
                    set_input(&mut out, fd, Source::Bytes(Arc::new(text.into_bytes())))
                }
            };

            if let Err(message) = applied {
                streams.diagnostic(&message);
                return Ok(None);
            }
        }
        Ok(Some(out))
    }

    fn expand_target(&self, word: &Word, env: &mut ShellEnv, streams: &Streams) -> Result<String, Flow> {
        Ok(Expander::new(env, streams, self).expand_word(word)?)
    }
}

impl Substitute for Executor {
    fn substitute(
        &self,
        body: &CommandList,
        env: &mut ShellEnv,
        streams: &Streams,
    ) -> Result<String, ShellError> {
        let buffer = CaptureBuffer::new();
        let mut sub = env.clone();
        let status = match self.run_list(body, &mut sub, &streams.capturing(&buffer)) {
            Ok(status) | Err(Flow::Exit(status)) => status,
            Err(Flow::Fatal(e)) => return Err(e),
        };
        env.set_last_status(status);
        Ok(String::from_utf8_lossy(&buffer.take()).into_owned())
    }
}

fn check_cancelled(env: &ShellEnv) -> Result<(), Flow> {
    match env.job() {
        Some(job) if job.is_cancelled() => Err(Flow::Exit(CANCELLED_STATUS)),
        _ => Ok(()),
    }
}

fn set_input(streams: &mut Streams, fd: u32, source: Source) -> Result<(), String> {
    if fd != 0 {
        return Err(format!("{}: unsupported file descriptor", fd));
    }
    streams.stdin = source;
    Ok(())
}

fn set_output(streams: &mut Streams, fd: u32, sink: Sink) -> Result<(), String> {
    if streams.set_sink(fd, sink) {
        Ok(())
    } else {
        Err(format!("{}: unsupported file descriptor", fd))
    }
}

fn open_output(path: &std::path::Path, append: bool) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R, buffer: CaptureBuffer) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buffer.write_bytes(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    trace!("capture reader stopped: {}", e);
                    break;
                }
            }
        }
    })
}

/// I/O error text without the trailing `(os error N)`
fn describe_io(err: &io::Error) -> String {
    let text = err.to_string();
    match text.find(" (os error") {
        Some(index) => text[..index].to_string(),
        None => text,
    }
}

/// Shell exit status of a finished child: its code, or 128 + signal
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

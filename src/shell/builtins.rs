//! Builtin commands
//!
//! Builtins run inside the interpreter against the session's
//! [`ShellEnv`], which is how `cd` and `export` persist across calls.

use super::env::{is_valid_name, ShellEnv};
use super::exec::Flow;
use super::io::Streams;
use crate::jobs::JobId;
use std::path::{Component, Path, PathBuf};

const BUILTINS: &[&str] = &[
    "cd", "pwd", "echo", "export", "unset", "exit", "true", "false", ":", "jobs", "wait",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Run builtin `name`; `args` excludes the command name
pub(crate) fn run(
    name: &str,
    args: &[String],
    env: &mut ShellEnv,
    streams: &Streams,
) -> Result<i32, Flow> {
    trace!("builtin {} {:?}", name, args);
    let status = match name {
        "cd" => cd(args, env, streams),
        "pwd" => print(streams, &format!("{}\n", env.cwd().display())),
        "echo" => echo(args, streams),
        "export" => export(args, env, streams),
        "unset" => unset(args, env, streams),
        "exit" => return exit(args, env, streams),
        "true" | ":" => 0,
        "false" => 1,
        "jobs" => jobs(env, streams),
        "wait" => wait(args, env, streams),
        _ => {
            streams.diagnostic(&format!("{}: not a builtin", name));
            1
        }
    };
    Ok(status)
}

fn print(streams: &Streams, text: &str) -> i32 {
    match streams.stdout.write_all(text.as_bytes()) {
        Ok(()) => 0,
        Err(e) => {
            debug!("builtin write failed: {}", e);
            1
        }
    }
}

fn cd(args: &[String], env: &mut ShellEnv, streams: &Streams) -> i32 {
    let mut announce = false;
    let target = match args.first().map(String::as_str) {
        None => match env.home() {
            Some(home) => home,
            None => {
                streams.diagnostic("cd: HOME not set");
                return 1;
            }
        },
        Some("-") => match env.get("OLDPWD") {
            Some(old) if !old.is_empty() => {
                announce = true;
                PathBuf::from(old)
            }
            _ => {
                streams.diagnostic("cd: OLDPWD not set");
                return 1;
            }
        },
        Some(dir) => PathBuf::from(dir),
    };
    if args.len() > 1 {
        streams.diagnostic("cd: too many arguments");
        return 1;
    }

    let resolved = normalize(&env.resolve(&target));
    if !resolved.is_dir() {
        let reason = if resolved.exists() {
            "Not a directory"
        } else {
            "No such file or directory"
        };
        streams.diagnostic(&format!("cd: {}: {}", target.display(), reason));
        return 1;
    }

    let previous = env.cwd().to_string_lossy().into_owned();
    env.set_cwd(resolved.clone());
    env.set("OLDPWD", previous);
    env.set("PWD", resolved.to_string_lossy().into_owned());
    debug!("cd -> {}", resolved.display());

    if announce {
        return print(streams, &format!("{}\n", resolved.display()));
    }
    0
}

/// Lexically resolve `.` and `..` like a logical `cd`
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push("/");
    }
    out
}

fn echo(args: &[String], streams: &Streams) -> i32 {
    let mut newline = true;
    let mut rest = args;
    while let Some(first) = rest.first() {
        if first == "-n" {
            newline = false;
            rest = &rest[1..];
        } else {
            break;
        }
    }
    let mut text = rest.join(" ");
    if newline {
        text.push('\n');
    }
    print(streams, &text)
}

fn export(args: &[String], env: &mut ShellEnv, streams: &Streams) -> i32 {
    let names: Vec<&String> = args.iter().filter(|a| a.as_str() != "-p").collect();
    if names.is_empty() {
        let listing: String = env
            .exported()
            .map(|(name, value)| format!("export {}=\"{}\"\n", name, value.replace('"', "\\\"")))
            .collect();
        return print(streams, &listing);
    }

    let mut status = 0;
    for arg in names {
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (arg.as_str(), None),
        };
        if !is_valid_name(name) {
            streams.diagnostic(&format!("export: `{}': not a valid identifier", arg));
            status = 1;
            continue;
        }
        env.export(name, value);
    }
    status
}

fn unset(args: &[String], env: &mut ShellEnv, streams: &Streams) -> i32 {
    let mut status = 0;
    for name in args.iter().filter(|a| a.as_str() != "-v") {
        if !is_valid_name(name) {
            streams.diagnostic(&format!("unset: `{}': not a valid identifier", name));
            status = 1;
            continue;
        }
        env.unset(name);
    }
    status
}

fn exit(args: &[String], env: &ShellEnv, streams: &Streams) -> Result<i32, Flow> {
    match args {
        [] => Err(Flow::Exit(env.last_status())),
        [code] => match code.parse::<i64>() {
            Ok(n) => Err(Flow::Exit((n & 0xff) as i32)),
            Err(_) => {
                streams.diagnostic(&format!("exit: {}: numeric argument required", code));
                Err(Flow::Exit(2))
            }
        },
        _ => {
            streams.diagnostic("exit: too many arguments");
            Ok(1)
        }
    }
}

fn jobs(env: &ShellEnv, streams: &Streams) -> i32 {
    let listing: String = env
        .jobs()
        .list()
        .iter()
        .map(|info| format!("{}\n", info.status_line()))
        .collect();
    print(streams, &listing)
}

fn parse_job_id(spec: &str) -> Option<JobId> {
    spec.strip_prefix('%')
        .unwrap_or(spec)
        .parse::<u32>()
        .ok()
        .map(JobId)
}

fn wait(args: &[String], env: &ShellEnv, streams: &Streams) -> i32 {
    if let Some(job) = env.job() {
        if args.is_empty() || args.iter().any(|a| parse_job_id(a) == Some(job.id())) {
            streams.diagnostic("wait: cannot wait for the current job");
            return 1;
        }
    }

    if args.is_empty() {
        env.jobs().wait_all();
        return 0;
    }

    let mut status = 0;
    for spec in args {
        let Some(id) = parse_job_id(spec) else {
            streams.diagnostic(&format!("wait: `{}': not a valid job specification", spec));
            status = 2;
            continue;
        };
        status = match env.jobs().wait(id) {
            Ok(code) => code,
            Err(_) => {
                streams.diagnostic(&format!("wait: %{}: no such job", id));
                127
            }
        };
    }
    status
}

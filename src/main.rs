//! snail - line-oriented shell front end
//!
//! Reads command lines from stdin and runs them through one execution
//! session, or runs a single command given with `-e`.

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use snail::models::ResultState;
use snail::{Config, ExecutionResult, ExecutionSession};
use tracing::{debug, info, warn};

/// Command line options
#[derive(Debug, Default)]
struct AppArgs {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Enable debug logging
    debug: bool,
    /// Print every result as a JSON record on stdout
    json: bool,
    /// Run this text and exit
    command: Option<String>,
}

impl AppArgs {
    fn parse() -> Result<Self> {
        let args: Vec<String> = env::args().collect();
        let mut app_args = AppArgs::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    let Some(path) = args.get(i + 1) else {
                        bail!("Missing config file path");
                    };
                    app_args.config_path = Some(PathBuf::from(path));
                    i += 1;
                }
                "--debug" | "-d" => app_args.debug = true,
                "--json" | "-j" => app_args.json = true,
                "-e" => {
                    let Some(text) = args.get(i + 1) else {
                        bail!("Missing command text after -e");
                    };
                    app_args.command = Some(text.clone());
                    i += 1;
                }
                "--help" | "-h" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-v" => {
                    println!("{} v{}", snail::NAME, snail::VERSION);
                    process::exit(0);
                }
                arg => bail!("Unknown option: {}", arg),
            }
            i += 1;
        }

        Ok(app_args)
    }
}

fn print_help() {
    println!("{} - {}", snail::NAME, snail::DESCRIPTION);
    println!();
    println!("USAGE:");
    println!("    snail [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>    Path to configuration file");
    println!("    -d, --debug            Enable debug logging");
    println!("    -j, --json             Print each result as JSON on stdout");
    println!("    -e <TEXT>              Run TEXT and exit with its status");
    println!("    -h, --help             Print this help message");
    println!("    -v, --version          Print version information");
    println!();
    println!("CONFIGURATION:");
    println!("    snail looks for config.toml or config.json in:");
    println!("    1. Path specified with --config");
    println!("    2. $XDG_CONFIG_HOME/snail/");
    println!("    3. The platform configuration directory (snail/)");
    println!("    4. ~/.snail/ and ~/.config/snail/");
    println!("    5. ./.snail/");
    println!("    6. Built-in defaults");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG               Set logging level (error, warn, info, debug, trace)");
}

fn main() {
    let args = match AppArgs::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("snail: {}", e);
            print_help();
            process::exit(2);
        }
    };

    match run(args) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("snail: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(args: AppArgs) -> Result<i32> {
    let config = load_configuration(&args)?;
    init_logging(&args, &config);
    info!("Starting {} v{}", snail::NAME, snail::VERSION);

    let mut session =
        ExecutionSession::from_config(&config.session).context("Failed to create session")?;

    let code = match &args.command {
        Some(text) => run_once(&mut session, text, &args),
        None => repl(&mut session, &config, &args),
    };
    session.shutdown(config.jobs.kill_grace_period());
    code
}

fn load_configuration(args: &AppArgs) -> Result<Config> {
    match &args.config_path {
        Some(path) => snail::init_with_config(path)
            .map_err(|e| anyhow::anyhow!(snail::handle_startup_error(&e))),
        None => Ok(snail::init()),
    }
}

fn init_logging(args: &AppArgs, config: &Config) {
    let level = if args.debug {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let env_filter = env::var("RUST_LOG").unwrap_or(level);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run_once(session: &mut ExecutionSession, text: &str, args: &AppArgs) -> Result<i32> {
    let result = session.run(text)?;
    report(&result, args)?;
    Ok(match result.state() {
        ResultState::Continue { .. } => {
            eprintln!("snail: unexpected end of input");
            2
        }
        ResultState::Background => 0,
        ResultState::Exited(code) => code,
        ResultState::Failed(_) => session.env().last_status(),
    })
}

fn repl(session: &mut ExecutionSession, config: &Config, args: &AppArgs) -> Result<i32> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();

    loop {
        if config.jobs.notify_on_completion {
            for job in session.jobs().reap_finished() {
                eprintln!("{}", job.status_line());
            }
        }

        let prompt = if session.is_accumulating() {
            &config.prompt.continuation
        } else {
            &config.prompt.primary
        };
        eprint!("{}", prompt);
        io::stderr().flush()?;

        line.clear();
        if input.read_line(&mut line).context("Failed to read input")? == 0 {
            if session.is_accumulating() {
                eprintln!("snail: unexpected end of input");
                return Ok(2);
            }
            debug!("End of input");
            return Ok(session.env().last_status());
        }

        // Lines keep their terminator so multi-line quotes retain it
        let result = match session.run(&line) {
            Ok(result) => result,
            Err(e) => {
                warn!("{}", e);
                eprintln!("snail: {}", e);
                continue;
            }
        };
        report(&result, args)?;

        if let ResultState::Background = result.state() {
            if let Some(job) = result.job {
                eprintln!("[{}]", job);
            }
        }
        if let Some(code) = session.exit_requested() {
            return Ok(code);
        }
    }
}

fn report(result: &ExecutionResult, args: &AppArgs) -> Result<()> {
    if args.json {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", result.to_json()?)?;
        stdout.flush()?;
    }
    if let Some(message) = &result.error {
        eprintln!("snail: {}", message);
    }
    Ok(())
}

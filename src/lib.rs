//! snail - interactive shell execution sessions
//!
//! This library runs POSIX-style command lines on behalf of a host (a REPL,
//! a notebook kernel, an editor plugin) and reports every call as one
//! stable [`ExecutionResult`].
//!
//! ## Features
//!
//! - **Multi-line input:** Incomplete fragments (open quotes, trailing
//!   operators, pending here-documents) are held and joined with the next
//!   submission
//! - **Persistent state:** Working directory and variables survive between
//!   calls of one session
//! - **Background jobs:** `cmd &` returns immediately; jobs can be listed,
//!   waited for and signalled
//! - **Pluggable interpreter:** Any [`shell::Interpreter`] can back a session
//! - **Configuration:** TOML or JSON configuration files
//!
//! ## Module Organization
//!
//! - [`session`] - Execution sessions, input accumulation, result
//!   classification and the session registry
//! - [`shell`] - The interpreter capability and the built-in interpreter
//! - [`jobs`] - Background job table and signals
//! - [`models`] - Data structures (ExecutionResult, JobInfo)
//! - [`config`] - Configuration loading and validation
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use snail::ExecutionSession;
//!
//! # fn main() -> snail::Result<()> {
//! let mut session = ExecutionSession::new();
//! let result = session.run("echo 'hello")?;
//! assert!(result.continue_input);
//! let result = session.run("world'")?;
//! println!("{}", result.to_json()?);
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate tracing;

pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod session;
pub mod shell;

// Re-exports for core functionality
pub use config::{Config, ConfigLoader};
pub use error::{Error, Result};
pub use models::{ExecutionResult, JobId, JobStatus};
pub use session::{ExecutionSession, SessionHandle, SessionRegistry};
pub use shell::{Interpreter, Outcome, ShellEnv, ShellInterpreter};

// Version information
/// The current version of snail from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The application name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// The application description from Cargo.toml
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Load configuration from the default locations
///
/// Falls back to the built-in defaults when no file is found or the file
/// that was found cannot be used.
///
/// ```no_run
/// let config = snail::init();
/// let registry = snail::SessionRegistry::new(config);
/// ```
pub fn init() -> Config {
    info!("🐌 Initializing {} v{}", NAME, VERSION);

    let config = match ConfigLoader::load() {
        Ok(config) => {
            info!("✅ Configuration loaded");
            config
        }
        Err(e) => {
            warn!("Failed to load configuration: {}. Using defaults", e);
            Config::default()
        }
    };

    if std::env::var("HOME").is_err() {
        warn!("⚠️  HOME environment variable not set");
    }
    config
}

/// Load configuration from an explicit file
///
/// Unlike [`init`], a missing or invalid file is an error.
pub fn init_with_config(config_path: &std::path::Path) -> Result<Config> {
    info!(
        "🐌 Initializing {} v{} with config: {}",
        NAME,
        VERSION,
        config_path.display()
    );
    let config = ConfigLoader::load_from_path(config_path)?;
    info!("✅ Configuration loaded from: {}", config_path.display());
    Ok(config)
}

/// User-facing explanation of a startup failure
pub fn handle_startup_error(error: &Error) -> String {
    match error {
        Error::ConfigLoadFailed { path, reason } => {
            format!(
                "Configuration Error: Failed to load config from '{}': {}\n\nTry:\n• Check the path\n• Ensure file permissions are correct",
                path.display(),
                reason
            )
        }
        Error::ConfigParseFailed { format, reason } => {
            format!(
                "Configuration Error: Failed to parse {} config: {}\n\nTry:\n• Check configuration file syntax",
                format, reason
            )
        }
        Error::ConfigValidationFailed { field, reason } => {
            format!(
                "Configuration Error: Validation failed for '{}': {}",
                field, reason
            )
        }
        _ => format!("Startup Error: {}", error),
    }
}

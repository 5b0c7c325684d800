//! CLI argument parsing for runsolo.
//!
//! Uses clap derive macros for declarative argument definitions. This module
//! owns pure invocation policy — default lock path derivation, shell-string
//! splitting — and hands the engine a fully-resolved `Invocation`.

use crate::engine::Invocation;
use crate::error::{Result, RunError};
use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};

/// Runsolo: run a command while holding an exclusive on-disk lock.
///
/// At most one instance of the protected command runs at a time across the
/// host. Intended for recurring jobs (cron entries) that must not overlap:
/// a second invocation either waits for the first, waits up to a bound, or
/// fails fast. The wrapped command can additionally be held to an execution
/// deadline.
#[derive(Parser, Debug)]
#[command(name = "runsolo")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the lock file. Derived from the command name when omitted.
    #[arg(short = 'f', long)]
    pub lock_file: Option<PathBuf>,

    /// Maximum seconds to wait for the lock before giving up.
    #[arg(short, long, conflicts_with = "nonblock")]
    pub wait: Option<u32>,

    /// Fail immediately when the lock is already held.
    #[arg(short, long)]
    pub nonblock: bool,

    /// Maximum seconds the command may run before it is interrupted.
    #[arg(short, long)]
    pub timeout: Option<u32>,

    /// Run a single shell-style string instead of COMMAND [ARGS]...
    #[arg(short, long, conflicts_with = "argv")]
    pub command: Option<String>,

    /// Print the blocking process tree when the lock is contended.
    #[arg(long)]
    pub tree: bool,

    /// Enable debug logging to stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Command and arguments to run while holding the lock.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub argv: Vec<String>,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Resolve the parsed arguments into an engine invocation.
    ///
    /// Splits `--command` shell-style when given, otherwise takes the
    /// trailing argv verbatim; derives the default lock path from the
    /// command name when `--lock-file` is omitted.
    pub fn into_invocation(self) -> Result<Invocation> {
        let argv = match &self.command {
            Some(command) => shell_words::split(command).map_err(|e| RunError::Command {
                detail: format!("failed to parse command '{}': {}", command, e),
            })?,
            None => self.argv.clone(),
        };

        let Some(program) = argv.first() else {
            return Err(RunError::Command {
                detail: "no command given; pass COMMAND [ARGS]... or --command".to_string(),
            });
        };

        let lock_path = self
            .lock_file
            .clone()
            .unwrap_or_else(|| default_lock_path(program));

        Ok(Invocation {
            lock_path,
            wait: self.wait,
            nonblock: self.nonblock,
            timeout: self.timeout,
            argv,
        })
    }
}

/// Default lock path for `command`: `runsolo-<basename>.lock` under
/// `$XDG_RUNTIME_DIR`, falling back to the system temp dir.
pub fn default_lock_path(command: &str) -> PathBuf {
    let name = Path::new(command)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "command".to_string());

    let dir = env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .filter(|d| d.is_dir())
        .unwrap_or_else(env::temp_dir);

    dir.join(format!("runsolo-{}.lock", name))
}

//! Runsolo: run a command while holding an exclusive on-disk lock.
//!
//! This is the main entry point for the `runsolo` CLI. It parses arguments,
//! hands the resolved invocation to the engine, and renders errors with
//! their recommended exit codes. The wrapped command's own exit status is
//! passed through on success.

mod child;
mod cli;
mod deadline;
mod diagnose;
mod engine;
mod error;
mod exit_codes;
mod lock;
mod signals;

use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let show_tree = cli.tree;
    let invocation = match cli.into_invocation() {
        Ok(invocation) => invocation,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    match engine::run(&invocation) {
        Ok(exit_codes::SUCCESS) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(exit_codes::clamp_status(code)),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            if show_tree && let Some(pid) = err.held_by() {
                diagnose::print_process_tree(pid);
            }

            ExitCode::from(err.exit_code() as u8)
        }
    }
}

/// Route tracing output to stderr; `--verbose` raises the default level to
/// debug, `RUST_LOG` overrides either way.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

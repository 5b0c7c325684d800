//! Error types for the runsolo CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for runsolo operations.
///
/// Each variant maps to a recommended process exit code. The two lock-contention
/// variants carry the pid recorded in the lock file so the caller can point at
/// the blocking process.
#[derive(Error, Debug)]
pub enum RunError {
    /// Non-blocking acquisition found the lock already held.
    #[error("lock is held by another process{}", fmt_holder(.held_by))]
    LockBusy { held_by: Option<u32> },

    /// Blocking-with-deadline acquisition did not succeed before its deadline.
    #[error("timed out waiting for the lock{}", fmt_holder(.held_by))]
    LockTimeout { held_by: Option<u32> },

    /// The child process did not finish before its execution deadline.
    #[error("command did not finish before the execution deadline")]
    ExecuteTimeout,

    /// The child process could not be spawned at all.
    #[error("{detail}")]
    Command { detail: String },

    /// The lock file could not be created, written, or unlocked.
    #[error("{detail}")]
    Lock { detail: String },

    /// Signal handlers could not be installed.
    #[error("{detail}")]
    Signals { detail: String },
}

impl RunError {
    /// Returns the recommended exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::ExecuteTimeout => exit_codes::EXECUTE_TIMEOUT,
            RunError::LockBusy { .. }
            | RunError::LockTimeout { .. }
            | RunError::Command { .. }
            | RunError::Lock { .. }
            | RunError::Signals { .. } => exit_codes::FAILURE,
        }
    }

    /// The pid of the blocking lock holder, for contention errors.
    pub fn held_by(&self) -> Option<u32> {
        match self {
            RunError::LockBusy { held_by } | RunError::LockTimeout { held_by } => *held_by,
            _ => None,
        }
    }
}

/// Result type alias for runsolo operations.
pub type Result<T> = std::result::Result<T, RunError>;

/// Renders ` (pid N)` when the holder pid is known, nothing otherwise.
fn fmt_holder(held_by: &Option<u32>) -> String {
    held_by
        .map(|pid| format!(" (pid {})", pid))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_errors_have_exit_code_one() {
        let busy = RunError::LockBusy { held_by: Some(42) };
        assert_eq!(busy.exit_code(), exit_codes::FAILURE);

        let timeout = RunError::LockTimeout { held_by: None };
        assert_eq!(timeout.exit_code(), exit_codes::FAILURE);
    }

    #[test]
    fn execute_timeout_has_conventional_exit_code() {
        let err = RunError::ExecuteTimeout;
        assert_eq!(err.exit_code(), exit_codes::EXECUTE_TIMEOUT);
    }

    #[test]
    fn command_error_has_exit_code_one() {
        let err = RunError::Command {
            detail: "failed to run 'nope'".to_string(),
        };
        assert_eq!(err.exit_code(), exit_codes::FAILURE);
    }

    #[test]
    fn holder_pid_appears_in_message() {
        let err = RunError::LockBusy { held_by: Some(4242) };
        assert_eq!(err.to_string(), "lock is held by another process (pid 4242)");

        let err = RunError::LockBusy { held_by: None };
        assert_eq!(err.to_string(), "lock is held by another process");
    }

    #[test]
    fn held_by_is_exposed_only_for_contention() {
        let busy = RunError::LockBusy { held_by: Some(7) };
        assert_eq!(busy.held_by(), Some(7));

        let timeout = RunError::LockTimeout { held_by: Some(8) };
        assert_eq!(timeout.held_by(), Some(8));

        assert_eq!(RunError::ExecuteTimeout.held_by(), None);
    }
}

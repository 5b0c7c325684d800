//! The once-per-invocation engine sequence for runsolo.
//!
//! Configure signal handling, acquire the lock (optionally deadline-bound),
//! arm the execution deadline, spawn and wait, disarm, release. Any deadline
//! expiry or spawn failure aborts the sequence with a typed error, and the
//! lock is released on every path out of the held phase.

use crate::child;
use crate::deadline::{self, DeadlineKind};
use crate::error::Result;
use crate::lock::{AcquireMode, Lock, LockState};
use crate::signals;
use std::path::PathBuf;
use tracing::debug;

/// A fully-parsed request: where to lock, how long to wait, how long to let
/// the command run, and what to run. Produced by the CLI layer.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Lock/pid file location.
    pub lock_path: PathBuf,
    /// Lock-wait deadline in seconds; `None` waits indefinitely.
    pub wait: Option<u32>,
    /// Fail immediately on contention instead of waiting.
    pub nonblock: bool,
    /// Execution deadline in seconds; `None` lets the command run freely.
    pub timeout: Option<u32>,
    /// The command and its arguments, opaque to the engine.
    pub argv: Vec<String>,
}

impl Invocation {
    /// The acquisition mode this invocation asks for. `nonblock` wins over
    /// `wait`; the CLI rejects the combination up front.
    pub fn acquire_mode(&self) -> AcquireMode {
        if self.nonblock {
            AcquireMode::NonBlocking
        } else if let Some(secs) = self.wait {
            AcquireMode::BlockingWithDeadline(secs)
        } else {
            AcquireMode::Blocking
        }
    }
}

/// Run `invocation` to completion and return the wrapped command's exit
/// status.
///
/// The lock is released even when execution fails; the execution error takes
/// precedence over a release error.
pub fn run(invocation: &Invocation) -> Result<i32> {
    signals::install()?;

    let mut lock = Lock::new(&invocation.lock_path);
    lock.acquire(invocation.acquire_mode())?;
    debug_assert_eq!(lock.state(), LockState::Held);

    let status = execute_locked(invocation);
    let released = lock.release();

    let code = status?;
    released?;
    debug!(code, "command completed");
    Ok(code)
}

/// The held phase: bound the run time, execute, disarm before leaving.
fn execute_locked(invocation: &Invocation) -> Result<i32> {
    deadline::arm(DeadlineKind::Execution, invocation.timeout);
    let status = child::execute(&invocation.argv);
    deadline::disarm();
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunError;
    use crate::lock::LockState;
    use serial_test::serial;
    use tempfile::TempDir;

    fn invocation(dir: &TempDir, argv: &[&str]) -> Invocation {
        Invocation {
            lock_path: dir.path().join("job.lock"),
            wait: None,
            nonblock: false,
            timeout: None,
            argv: argv.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    #[serial]
    fn run_passes_through_the_exit_code() {
        let dir = TempDir::new().unwrap();
        let code = run(&invocation(&dir, &["sh", "-c", "exit 3"])).unwrap();
        assert_eq!(code, 3);
    }

    #[test]
    #[serial]
    fn run_holds_the_lock_while_the_command_runs() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("job.lock");
        let probe = dir.path().join("probe");

        // The child reads the lock file while it is held: the recorded pid
        // must be ours for the whole execution window.
        let inv = Invocation {
            lock_path: lock_path.clone(),
            wait: None,
            nonblock: false,
            timeout: None,
            argv: vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("cat '{}' > '{}'", lock_path.display(), probe.display()),
            ],
        };

        assert_eq!(run(&inv).unwrap(), 0);
        let recorded = std::fs::read_to_string(&probe).unwrap();
        assert_eq!(recorded.trim().parse::<u32>().unwrap(), std::process::id());
    }

    #[test]
    #[serial]
    fn run_releases_the_lock_on_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let inv = invocation(&dir, &["runsolo-test-no-such-binary"]);

        let err = run(&inv).unwrap_err();
        assert!(matches!(err, RunError::Command { .. }));

        let mut lock = Lock::new(&inv.lock_path);
        lock.acquire(AcquireMode::NonBlocking).unwrap();
        assert_eq!(lock.state(), LockState::Held);
        lock.release().unwrap();
    }

    #[test]
    #[serial]
    fn run_with_an_unused_timeout_completes_normally() {
        let dir = TempDir::new().unwrap();
        let mut inv = invocation(&dir, &["true"]);
        inv.timeout = Some(600);

        assert_eq!(run(&inv).unwrap(), 0);
        // The execution deadline was disarmed on the way out.
        assert_eq!(deadline::fired(), None);
    }

    #[test]
    #[serial]
    fn nonblocking_contention_aborts_before_executing() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("should-not-exist");
        let mut inv = invocation(&dir, &[]);
        inv.argv = vec![
            "touch".to_string(),
            marker.display().to_string(),
        ];
        inv.nonblock = true;

        let mut holder = Lock::new(&inv.lock_path);
        holder.acquire(AcquireMode::NonBlocking).unwrap();

        let err = run(&inv).unwrap_err();
        assert!(matches!(err, RunError::LockBusy { .. }));
        assert!(!marker.exists());

        holder.release().unwrap();
    }

    #[test]
    fn acquire_mode_prefers_nonblock() {
        let dir = TempDir::new().unwrap();
        let mut inv = invocation(&dir, &["true"]);
        assert_eq!(inv.acquire_mode(), AcquireMode::Blocking);

        inv.wait = Some(5);
        assert_eq!(inv.acquire_mode(), AcquireMode::BlockingWithDeadline(5));

        inv.nonblock = true;
        assert_eq!(inv.acquire_mode(), AcquireMode::NonBlocking);
    }
}

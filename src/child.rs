//! Child-process supervision for runsolo.
//!
//! Spawns the wrapped command, publishes its pid for the signal router, and
//! waits for completion. The wait uses `waitpid(2)` directly because
//! `std::process::Child::wait` retries `EINTR` internally, and the engine
//! must observe the interrupt to tell an execution-deadline expiry from an
//! ordinary forwarded signal.
//!
//! # Teardown escalation
//!
//! When the execution deadline fires, the child is not killed outright. It
//! first gets `SIGTERM` and an immediate non-blocking poll; while it stays
//! alive the polite attempt is repeated every [`TERM_POLL_INTERVAL`]. Only
//! after [`TERM_ATTEMPTS`] unsuccessful polls does `SIGKILL` go out, followed
//! by a blocking reap. The loop is a plain bounded state machine in the main
//! flow, not signal-driven re-entrancy, so its timing is testable and the
//! total wait is bounded.

use crate::deadline::{self, DeadlineKind};
use crate::error::{Result, RunError};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::process::Command;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Polite termination attempts before the forced kill.
pub(crate) const TERM_ATTEMPTS: u32 = 10;

/// Pause between polite attempts.
pub(crate) const TERM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Pid of the running child, 0 when none. Written by the active invocation,
/// read by the signal router at delivery time.
static ACTIVE_CHILD: AtomicI32 = AtomicI32::new(0);

/// The pid the signal router should forward to, 0 when no child is active.
pub(crate) fn active_pid() -> i32 {
    ACTIVE_CHILD.load(Ordering::SeqCst)
}

fn set_active(pid: Pid) {
    ACTIVE_CHILD.store(pid.as_raw(), Ordering::SeqCst);
}

fn clear_active() {
    ACTIVE_CHILD.store(0, Ordering::SeqCst);
}

/// Spawn `argv` and wait for it, returning the child's exit status.
///
/// Only ever called while the lock is held. Spawn failure (e.g. a missing
/// executable) fails immediately with `RunError::Command` and is not
/// retried. A child terminated by a signal maps to `128 + signo`, the shell
/// convention. The active-child slot is cleared on every exit path,
/// including the interrupted one.
pub fn execute(argv: &[String]) -> Result<i32> {
    let (program, args) = argv.split_first().ok_or_else(|| RunError::Command {
        detail: "no command given".to_string(),
    })?;

    let child = Command::new(program)
        .args(args)
        .spawn()
        .map_err(|e| RunError::Command {
            detail: format!("failed to run '{}': {}", program, e),
        })?;

    let pid = Pid::from_raw(child.id() as i32);
    debug!(pid = child.id(), command = %program, "child spawned");

    set_active(pid);
    let outcome = wait_for(pid);
    clear_active();
    outcome
}

/// Wait until the child exits, escalating on an execution-deadline expiry.
fn wait_for(pid: Pid) -> Result<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(128 + sig as i32),
            Ok(_) => {}
            Err(Errno::EINTR) => {
                if deadline::fired() == Some(DeadlineKind::Execution) {
                    debug!(pid = pid.as_raw(), "execution deadline expired");
                    escalate(pid);
                    // The engine's timeout takes precedence over whatever
                    // status the shutdown produced.
                    return Err(RunError::ExecuteTimeout);
                }
                // A forwarded signal interrupted the wait; keep waiting.
            }
            Err(e) => {
                return Err(RunError::Command {
                    detail: format!("failed waiting for child: {}", e),
                });
            }
        }
    }
}

/// Polite-then-forced teardown: SIGTERM with an immediate poll, repeated
/// every half second; SIGKILL and a blocking reap after the tenth
/// unsuccessful poll.
fn escalate(pid: Pid) {
    for attempt in 1..=TERM_ATTEMPTS {
        let _ = signal::kill(pid, Signal::SIGTERM);
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {
                debug!(pid = pid.as_raw(), attempt, "child still running after SIGTERM");
                thread::sleep(TERM_POLL_INTERVAL);
            }
            // Exited, signaled, or already reaped: done.
            Ok(_) | Err(_) => return,
        }
    }

    warn!(pid = pid.as_raw(), "child ignored SIGTERM, sending SIGKILL");
    let _ = signal::kill(pid, Signal::SIGKILL);
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => {}
            _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Instant;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    #[serial]
    fn execute_passes_through_exit_code() {
        let code = execute(&argv(&["sh", "-c", "exit 7"])).unwrap();
        assert_eq!(code, 7);
    }

    #[test]
    #[serial]
    fn execute_reports_success() {
        let code = execute(&argv(&["true"])).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    #[serial]
    fn signal_death_maps_to_shell_convention() {
        let code = execute(&argv(&["sh", "-c", "kill -TERM $$"])).unwrap();
        assert_eq!(code, 128 + 15);
    }

    #[test]
    #[serial]
    fn spawn_failure_is_a_command_error() {
        let err = execute(&argv(&["runsolo-test-no-such-binary"])).unwrap_err();
        assert!(matches!(err, RunError::Command { .. }));
        assert!(err.to_string().contains("failed to run"));
    }

    #[test]
    #[serial]
    fn active_slot_is_cleared_after_completion() {
        execute(&argv(&["true"])).unwrap();
        assert_eq!(active_pid(), 0);
    }

    #[test]
    #[serial]
    fn empty_argv_is_rejected() {
        let err = execute(&[]).unwrap_err();
        assert!(matches!(err, RunError::Command { .. }));
    }

    #[test]
    #[serial]
    fn escalate_reaps_a_cooperative_child() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        let start = Instant::now();
        escalate(pid);

        // One polite attempt suffices; nowhere near the forced-kill window.
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(signal::kill(pid, None), Err(Errno::ESRCH));
    }

    #[test]
    #[serial]
    fn escalate_forces_a_stubborn_child() {
        let child = Command::new("sh")
            .args(["-c", "trap '' TERM; while :; do sleep 1; done"])
            .spawn()
            .unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        let start = Instant::now();
        escalate(pid);
        let elapsed = start.elapsed();

        // Ten polite polls at 500ms, then the forced kill. Bounded either way.
        assert!(elapsed >= Duration::from_secs(4));
        assert!(elapsed < Duration::from_secs(15));
        assert_eq!(signal::kill(pid, None), Err(Errno::ESRCH));
    }
}

//! Signal routing for runsolo.
//!
//! One handler serves two jobs:
//! - `SIGALRM` is the countdown-timer expiry and belongs to the deadline
//!   supervisor; it is never forwarded to a child.
//! - Every other forwarded signal is relayed verbatim to the currently
//!   active child process, if one exists. With no child, delivery is a
//!   no-op; the interrupted syscall in the main sequence simply returns
//!   `EINTR` and is retried.
//!
//! The forwarded set excludes `SIGKILL`/`SIGSTOP` (uncatchable), `SIGCHLD`
//! (child-state notifications), `SIGALRM` (routed above), and the
//! synchronous fault signals. Handlers are installed without `SA_RESTART`
//! so a blocked `flock(2)` or `waitpid(2)` observes the interrupt.
//!
//! The handler runs asynchronously with respect to the main sequence and
//! cannot receive call-local parameters, so it consults the process-wide
//! active-child slot (see `child`) at delivery time. Its body is limited to
//! async-signal-safe operations: atomic loads and `kill(2)`.

use crate::error::{Result, RunError};
use crate::{child, deadline};
use nix::libc;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

/// Signals relayed verbatim to the active child.
const FORWARDED: &[Signal] = &[
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGPIPE,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGCONT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the router once per process, before any lock/execute phase.
///
/// Subsequent calls are no-ops.
pub fn install() -> Result<()> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    // No SA_RESTART: blocking lock waits and child waits must return EINTR.
    let action = SigAction::new(SigHandler::Handler(route), SaFlags::empty(), SigSet::empty());

    let install_one = |sig: Signal| -> Result<()> {
        // SAFETY: `route` is async-signal-safe (atomics and kill only).
        unsafe { signal::sigaction(sig, &action) }
            .map(|_| ())
            .map_err(|e| RunError::Signals {
                detail: format!("failed to install handler for {}: {}", sig, e),
            })
    };

    install_one(Signal::SIGALRM)?;
    for sig in FORWARDED {
        install_one(*sig)?;
    }

    Ok(())
}

/// The shared handler: timer expiries go to the deadline supervisor,
/// everything else chases the active child.
extern "C" fn route(signum: libc::c_int) {
    if signum == libc::SIGALRM {
        deadline::note_expiry();
        return;
    }

    let pid = child::active_pid();
    if pid > 0 {
        // SAFETY: kill(2) is async-signal-safe; a stale pid at worst hits
        // an already-reaped process and returns ESRCH, which is ignored.
        unsafe {
            libc::kill(pid, signum);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::DeadlineKind;
    use serial_test::serial;

    #[test]
    #[serial]
    fn install_is_idempotent() {
        install().unwrap();
        install().unwrap();
    }

    #[test]
    #[serial]
    fn forwarding_without_child_is_a_noop() {
        install().unwrap();

        // No active child: the process must survive its own signal.
        signal::raise(Signal::SIGUSR1).unwrap();
    }

    #[test]
    #[serial]
    fn alarm_is_routed_to_the_deadline_supervisor() {
        install().unwrap();

        deadline::arm(DeadlineKind::LockWait, Some(600));
        signal::raise(Signal::SIGALRM).unwrap();
        assert_eq!(deadline::fired(), Some(DeadlineKind::LockWait));

        deadline::disarm();
    }
}

//! Deadline supervision for runsolo.
//!
//! A single process-wide countdown timer (`alarm(2)`) is reused for two
//! distinct bounds: the time allowed to wait for the lock, and the time the
//! wrapped command is allowed to run. The two phases are sequential, so only
//! one deadline is ever armed at a time.
//!
//! # Expiry bookkeeping
//!
//! The meaning of an expiry is carried by an explicit kind tag rather than
//! inferred from program phase at delivery time. `arm` records the kind in a
//! process-wide slot before setting the timer; the `SIGALRM` handler copies
//! armed → fired (see [`note_expiry`]). An expiry that races a `disarm`
//! therefore observes nothing armed and lands as a no-op. Both slots are
//! atomics because the handler runs without access to any call-local state.

use nix::unistd::alarm;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// What an armed (or fired) deadline bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineKind {
    /// Waiting for the lock to become free.
    LockWait,
    /// The wrapped command is running.
    Execution,
}

const KIND_NONE: u8 = 0;
const KIND_LOCK_WAIT: u8 = 1;
const KIND_EXECUTION: u8 = 2;

/// Kind of the currently armed deadline, `KIND_NONE` when disarmed.
static ARMED: AtomicU8 = AtomicU8::new(KIND_NONE);

/// Kind of the last expiry since arming, `KIND_NONE` when nothing fired.
static FIRED: AtomicU8 = AtomicU8::new(KIND_NONE);

impl DeadlineKind {
    fn as_tag(self) -> u8 {
        match self {
            DeadlineKind::LockWait => KIND_LOCK_WAIT,
            DeadlineKind::Execution => KIND_EXECUTION,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            KIND_LOCK_WAIT => Some(DeadlineKind::LockWait),
            KIND_EXECUTION => Some(DeadlineKind::Execution),
            _ => None,
        }
    }
}

/// Arm the process-wide countdown for `seconds`.
///
/// No-op when `seconds` is `None` or zero. Arming while a deadline is already
/// armed replaces it; there is only one timer.
pub fn arm(kind: DeadlineKind, seconds: Option<u32>) {
    let Some(secs) = seconds.filter(|s| *s > 0) else {
        return;
    };
    FIRED.store(KIND_NONE, Ordering::SeqCst);
    ARMED.store(kind.as_tag(), Ordering::SeqCst);
    alarm::set(secs);
    debug!(?kind, secs, "deadline armed");
}

/// Cancel any pending countdown and clear the expiry slot.
///
/// Safe to call when none is pending. Callers that care about an expiry must
/// read [`fired`] before disarming.
pub fn disarm() {
    alarm::cancel();
    ARMED.store(KIND_NONE, Ordering::SeqCst);
    FIRED.store(KIND_NONE, Ordering::SeqCst);
}

/// What the last expiry, if any, was armed for.
pub fn fired() -> Option<DeadlineKind> {
    DeadlineKind::from_tag(FIRED.load(Ordering::SeqCst))
}

/// Record an expiry. Called from the `SIGALRM` handler, so the body is
/// restricted to atomic operations.
pub(crate) fn note_expiry() {
    FIRED.store(ARMED.load(Ordering::SeqCst), Ordering::SeqCst);
}

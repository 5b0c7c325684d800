//! Exit code constants for the runsolo CLI.
//!
//! - 0: the wrapped command succeeded (its own code is passed through)
//! - 1: lock contention, lock-file failure, or the command could not start
//! - 124: the command was interrupted by the execution deadline
//!
//! 124 is the conventional "timed out" code, shared with GNU timeout, so
//! cron wrappers and shell scripts can distinguish a deadline kill from an
//! ordinary failure.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Lock contention, lock-file I/O failure, or spawn failure.
pub const FAILURE: i32 = 1;

/// The wrapped command exceeded its execution deadline.
pub const EXECUTE_TIMEOUT: i32 = 124;

/// Clamp a child exit status into the range a process can actually return.
pub fn clamp_status(code: i32) -> u8 {
    code.clamp(0, 255) as u8
}

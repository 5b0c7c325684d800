//! Locking subsystem for runsolo.
//!
//! One advisory file lock keyed by a filesystem path serializes all
//! cooperating invocations on the host. Mutual exclusion comes from
//! `flock(2)` on the open descriptor (via `fs2`), not from this process's
//! own bookkeeping: the OS releases the lock automatically if the holder
//! dies, so a crashed job can never wedge the schedule.
//!
//! # Lock Files
//!
//! The file at `path` holds the decimal pid of the current holder followed
//! by a newline, truncated and rewritten on each successful acquisition.
//! The pid is advisory diagnostic data for contention messages, nothing
//! more. The file is left in place on release: unlinking it would let a
//! late waiter lock a stale inode while a newcomer re-creates the path,
//! silently breaking the one-holder invariant.
//!
//! # Acquisition Modes
//!
//! - `Blocking`: wait indefinitely.
//! - `BlockingWithDeadline(secs)`: wait until the lock-wait deadline
//!   interrupts the blocked `flock`; see the `deadline` module.
//! - `NonBlocking`: one attempt, contention fails immediately.

use crate::deadline::{self, DeadlineKind};
use crate::error::{Result, RunError};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process;
use tracing::{debug, warn};

/// Where a lock is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No descriptor is held.
    Unacquired,
    /// The file is open and an acquisition attempt is in flight.
    Acquiring,
    /// This process holds the exclusive lock.
    Held,
}

/// How to behave when the lock is already held elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Block until the lock is free.
    Blocking,
    /// Block, but give up after this many seconds.
    BlockingWithDeadline(u32),
    /// Fail immediately on contention.
    NonBlocking,
}

/// A single advisory file lock and its pid bookkeeping.
#[derive(Debug)]
pub struct Lock {
    path: PathBuf,
    file: Option<File>,
    state: LockState,
}

impl Lock {
    /// Create an unacquired lock for `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            file: None,
            state: LockState::Unacquired,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Acquire the exclusive lock per `mode`.
    ///
    /// Creates the parent directory if necessary, opens/creates the lock
    /// file, and on success records the current pid in it (synced to stable
    /// storage) before transitioning to `Held`.
    pub fn acquire(&mut self, mode: AcquireMode) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| RunError::Lock {
                detail: format!(
                    "failed to create lock directory '{}': {}",
                    parent.display(),
                    e
                ),
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| RunError::Lock {
                detail: format!("failed to open lock file '{}': {}", self.path.display(), e),
            })?;

        self.state = LockState::Acquiring;
        debug!(path = %self.path.display(), ?mode, "acquiring lock");

        let locked = match mode {
            AcquireMode::NonBlocking => self.lock_once(&file),
            AcquireMode::Blocking => self.lock_blocking(&file),
            AcquireMode::BlockingWithDeadline(secs) => self.lock_with_deadline(&file, secs),
        };
        if let Err(e) = locked {
            self.state = LockState::Unacquired;
            return Err(e);
        }

        if let Err(e) = self.write_pid(&file) {
            let _ = file.unlock();
            self.state = LockState::Unacquired;
            return Err(e);
        }

        self.file = Some(file);
        self.state = LockState::Held;
        debug!(path = %self.path.display(), "lock acquired");
        Ok(())
    }

    /// Unlock and close the descriptor. Idempotent no-op when unacquired.
    pub fn release(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            self.state = LockState::Unacquired;
            return Ok(());
        };

        self.state = LockState::Unacquired;
        file.unlock().map_err(|e| RunError::Lock {
            detail: format!("failed to unlock '{}': {}", self.path.display(), e),
        })?;
        debug!(path = %self.path.display(), "lock released");
        Ok(())
    }

    /// The pid recorded in the lock file, if any. Diagnostics only: the
    /// content is advisory and may be stale once the holder released.
    pub fn held_by_pid(&self) -> Option<u32> {
        let content = fs::read_to_string(&self.path).ok()?;
        content.trim().parse().ok()
    }

    fn lock_once(&self, file: &File) -> Result<()> {
        file.try_lock_exclusive().map_err(|e| {
            if e.kind() == io::ErrorKind::WouldBlock {
                RunError::LockBusy {
                    held_by: self.held_by_pid(),
                }
            } else {
                self.lock_failed(e)
            }
        })
    }

    fn lock_blocking(&self, file: &File) -> Result<()> {
        loop {
            match file.lock_exclusive() {
                Ok(()) => return Ok(()),
                // A forwarded signal interrupted the wait; keep waiting.
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(self.lock_failed(e)),
            }
        }
    }

    fn lock_with_deadline(&self, file: &File, seconds: u32) -> Result<()> {
        deadline::arm(DeadlineKind::LockWait, Some(seconds));
        let outcome = loop {
            match file.lock_exclusive() {
                Ok(()) => break Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if deadline::fired() == Some(DeadlineKind::LockWait) {
                        break Err(RunError::LockTimeout {
                            held_by: self.held_by_pid(),
                        });
                    }
                    // Some other signal; the deadline is still pending.
                }
                Err(e) => break Err(self.lock_failed(e)),
            }
        };
        deadline::disarm();
        outcome
    }

    /// Truncate the file and record `{pid}\n`, synced to stable storage.
    fn write_pid(&self, file: &File) -> Result<()> {
        let record = |e: io::Error| RunError::Lock {
            detail: format!("failed to record pid in '{}': {}", self.path.display(), e),
        };

        let mut handle = file;
        file.set_len(0).map_err(record)?;
        handle.seek(SeekFrom::Start(0)).map_err(record)?;
        writeln!(handle, "{}", process::id()).map_err(record)?;
        file.sync_all().map_err(record)
    }

    fn lock_failed(&self, e: io::Error) -> RunError {
        RunError::Lock {
            detail: format!("failed to lock '{}': {}", self.path.display(), e),
        }
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("{}", e);
        }
    }
}

//! Contention diagnostics for runsolo.
//!
//! When acquisition fails because another process holds the lock, the caller
//! can ask for a `pstree` dump of the holder to see at a glance which job is
//! in the way. Purely for human inspection; a missing or failing `pstree`
//! is tolerated.

use std::process::Command;
use tracing::debug;

/// Print the process tree rooted at `pid` to stderr.
pub fn print_process_tree(pid: u32) {
    match Command::new("pstree").args(["-p", &pid.to_string()]).output() {
        Ok(output) if output.status.success() => {
            eprintln!("Lock is blocked by:");
            eprint!("{}", String::from_utf8_lossy(&output.stdout));
        }
        Ok(output) => {
            debug!(code = output.status.code(), "pstree exited nonzero");
        }
        Err(e) => {
            debug!("pstree unavailable: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerates_a_nonexistent_pid() {
        // pstree for a pid that cannot exist either errors or prints
        // nothing useful; both paths must come back without panicking.
        print_process_tree(u32::MAX);
    }
}

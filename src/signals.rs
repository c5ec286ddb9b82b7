//! Unix signal delivery to process groups
//!
//! Children started by the runner and the terminal registry lead their own
//! process group, so signalling `-pid` reaches everything they forked.

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;

/// Send `signal` to the process group led by `pid`.
///
/// A group that is already gone is not an error. Returns whether the signal
/// was delivered.
pub fn signal_process_group(pid: u32, signal: Signal) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            warn!(
                "Failed to send {} to process group {}: {}",
                signal.as_str(),
                pid,
                e
            );
            false
        }
    }
}

/// Whether any process of the group led by `pid` is still alive
pub fn process_group_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    raw > 0 && killpg(Pid::from_raw(raw), None).is_ok()
}

//! OS scheduling-priority facility and the target-priority computation.

use nix::errno::Errno;
use nix::libc;

use super::WatchError;

/// How the target priority is derived from a process's current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityChange {
    /// Add the delta to the current nice value.
    Add(i32),
    /// Use the value outright.
    Set(i32),
}

impl PriorityChange {
    /// Target priority for a process currently at `original`.
    pub fn target(self, original: i32) -> i32 {
        match self {
            Self::Add(delta) => original + delta,
            Self::Set(value) => value,
        }
    }
}

/// OS priority facility, process granularity. A trait so transition
/// handling is testable without issuing syscalls.
pub trait PriorityControl {
    fn get(&self, pid: u32) -> Result<i32, WatchError>;
    fn set(&self, pid: u32, priority: i32) -> Result<(), WatchError>;
}

/// Read a process's nice value.
///
/// getpriority(2) legitimately returns -1, so errno is cleared first
/// and consulted afterwards to tell that apart from a failure.
pub fn get_priority(pid: u32) -> Result<i32, WatchError> {
    Errno::clear();
    // SAFETY: plain syscall, no pointers involved.
    let nice = unsafe { libc::getpriority(libc::PRIO_PROCESS, pid as libc::id_t) };
    if nice == -1 && Errno::last_raw() != 0 {
        return Err(WatchError::PriorityRead {
            pid,
            errno: Errno::last(),
        });
    }
    Ok(nice)
}

/// Set a process's nice value.
pub fn set_priority(pid: u32, priority: i32) -> Result<(), WatchError> {
    // SAFETY: plain syscall, no pointers involved.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid as libc::id_t, priority) };
    if rc == -1 {
        return Err(WatchError::PriorityWrite {
            pid,
            errno: Errno::last(),
        });
    }
    Ok(())
}

/// Production facility over getpriority(2)/setpriority(2).
pub struct SysPriority;

impl PriorityControl for SysPriority {
    fn get(&self, pid: u32) -> Result<i32, WatchError> {
        get_priority(pid)
    }

    fn set(&self, pid: u32, priority: i32) -> Result<(), WatchError> {
        set_priority(pid, priority)
    }
}

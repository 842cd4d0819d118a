//! Single-slot record of the one process currently holding an adjusted
//! priority, shared between the event loop and the signal path.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use nix::libc;

/// The process last adjusted and the priority it had beforehand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityRecord {
    pub pid: u32,
    /// Nice value the process had before adjustment.
    pub nice: i32,
}

/// Lock-free single-slot store.
///
/// Backed by atomics so the termination-signal handler can read it on
/// the very thread it interrupts. `put` deactivates before writing and
/// `take` deactivates before reading, so an interrupting handler
/// observes either a whole record or an empty slot, never a partial
/// one.
pub struct Slot {
    active: AtomicBool,
    pid: AtomicU32,
    nice: AtomicI32,
}

impl Slot {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            pid: AtomicU32::new(0),
            nice: AtomicI32::new(0),
        }
    }

    /// Record a process, replacing any previous record.
    pub fn put(&self, record: PriorityRecord) {
        self.active.store(false, Ordering::SeqCst);
        self.pid.store(record.pid, Ordering::SeqCst);
        self.nice.store(record.nice, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
    }

    /// Clear the slot, returning the record it held.
    pub fn take(&self) -> Option<PriorityRecord> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return None;
        }
        Some(PriorityRecord {
            pid: self.pid.load(Ordering::SeqCst),
            nice: self.nice.load(Ordering::SeqCst),
        })
    }
}

/// The process-wide slot. Static because the signal handler has to
/// reach it.
pub static SLOT: Slot = Slot::new();

/// Revert the recorded adjustment, best-effort.
///
/// Async-signal-safe: an atomic swap, two loads and a setpriority(2)
/// call, no allocation. The syscall result is ignored since the target
/// process may already be gone. Returns the record that was restored so
/// callers outside the signal path can report the action.
pub fn restore(slot: &Slot) -> Option<PriorityRecord> {
    let record = slot.take()?;
    // SAFETY: plain syscall, no pointers involved.
    unsafe {
        libc::setpriority(libc::PRIO_PROCESS, record.pid as libc::id_t, record.nice);
    }
    Some(record)
}

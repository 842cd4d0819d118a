//! Focus transition handling: revert the previous adjustment, then
//! elevate whichever process owns the newly focused window.

use x11rb::protocol::xproto::Window;

use super::WatchError;
use super::priority::{PriorityChange, PriorityControl};
use super::store::{PriorityRecord, Slot};

/// Source of focus information.
///
/// The production implementation is the X11 context; tests substitute a
/// scripted one.
pub trait FocusSource {
    /// Window currently holding focus, if any.
    fn active_window(&self) -> Result<Option<Window>, WatchError>;
    /// Owning process of a window, if it advertises one.
    fn window_pid(&self, window: Window) -> Result<Option<u32>, WatchError>;
}

/// Drives the revert/acquire protocol on every focus change.
pub struct Tracker<'a> {
    focus: &'a dyn FocusSource,
    priority: &'a dyn PriorityControl,
    slot: &'a Slot,
    change: PriorityChange,
}

impl<'a> Tracker<'a> {
    pub fn new(
        focus: &'a dyn FocusSource,
        priority: &'a dyn PriorityControl,
        slot: &'a Slot,
        change: PriorityChange,
    ) -> Self {
        Self {
            focus,
            priority,
            slot,
            change,
        }
    }

    /// Undo the previous adjustment, if one is recorded.
    ///
    /// Best-effort: the target process may be gone, so a failed write is
    /// not retried or escalated. The slot is cleared either way.
    pub fn restore(&self) {
        let Some(record) = self.slot.take() else {
            return;
        };
        println!("restoring pid {} to priority {}", record.pid, record.nice);
        tracing::info!(pid = record.pid, priority = record.nice, "restored priority");
        if let Err(e) = self.priority.set(record.pid, record.nice) {
            tracing::debug!(error = %e, "restore write failed");
        }
    }

    /// Run one focus transition.
    ///
    /// Always opens by reverting the previous adjustment. A failure in
    /// any step up to and including the priority read leaves the slot
    /// empty, so the next restore is a guaranteed no-op. A failed
    /// priority write in the final step keeps the record: the value that
    /// was actually read is still what a later restore must revert to.
    pub fn handle_focus_change(&self) {
        self.restore();

        let window = match self.focus.active_window() {
            Ok(Some(window)) => window,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "active window lookup failed");
                return;
            }
        };

        let pid = match self.focus.window_pid(window) {
            Ok(Some(pid)) => pid,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "window pid lookup failed");
                return;
            }
        };

        let original = match self.priority.get(pid) {
            Ok(original) => original,
            Err(e) => {
                eprintln!("{e}");
                tracing::warn!(error = %e, "priority read failed");
                return;
            }
        };
        self.slot.put(PriorityRecord {
            pid,
            nice: original,
        });

        let target = self.change.target(original);
        println!("setting pid {pid} from priority {original} to priority {target}");
        tracing::info!(pid, from = original, to = target, "priority adjusted");
        if let Err(e) = self.priority.set(pid, target) {
            eprintln!("{e}");
            tracing::warn!(error = %e, "priority write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use nix::errno::Errno;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Get(u32),
        Set(u32, i32),
    }

    /// Scripted focus source: a fixed window/pid answer.
    struct FakeFocus {
        window: Option<Window>,
        pid: Option<u32>,
    }

    impl FocusSource for FakeFocus {
        fn active_window(&self) -> Result<Option<Window>, WatchError> {
            Ok(self.window)
        }

        fn window_pid(&self, _window: Window) -> Result<Option<u32>, WatchError> {
            Ok(self.pid)
        }
    }

    /// Recording priority facility with a scripted current value.
    struct FakePriority {
        current: i32,
        fail_get: bool,
        fail_set: bool,
        calls: RefCell<Vec<Call>>,
    }

    impl FakePriority {
        fn new(current: i32) -> Self {
            Self {
                current,
                fail_get: false,
                fail_set: false,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl PriorityControl for FakePriority {
        fn get(&self, pid: u32) -> Result<i32, WatchError> {
            self.calls.borrow_mut().push(Call::Get(pid));
            if self.fail_get {
                return Err(WatchError::PriorityRead {
                    pid,
                    errno: Errno::ESRCH,
                });
            }
            Ok(self.current)
        }

        fn set(&self, pid: u32, priority: i32) -> Result<(), WatchError> {
            self.calls.borrow_mut().push(Call::Set(pid, priority));
            if self.fail_set {
                return Err(WatchError::PriorityWrite {
                    pid,
                    errno: Errno::EPERM,
                });
            }
            Ok(())
        }
    }

    fn focus(window: Window, pid: u32) -> FakeFocus {
        FakeFocus {
            window: Some(window),
            pid: Some(pid),
        }
    }

    // -- Transition protocol --

    #[test]
    fn first_transition_elevates_and_records() {
        let slot = Slot::new();
        let f = focus(7, 100);
        let p = FakePriority::new(5);
        let t = Tracker::new(&f, &p, &slot, PriorityChange::Add(-10));
        t.handle_focus_change();
        assert_eq!(*p.calls.borrow(), vec![Call::Get(100), Call::Set(100, -5)]);
        assert_eq!(slot.take(), Some(PriorityRecord { pid: 100, nice: 5 }));
    }

    #[test]
    fn restore_runs_before_acquire() {
        let slot = Slot::new();
        slot.put(PriorityRecord { pid: 42, nice: 3 });
        let f = focus(7, 100);
        let p = FakePriority::new(5);
        let t = Tracker::new(&f, &p, &slot, PriorityChange::Add(-1));
        t.handle_focus_change();
        assert_eq!(
            *p.calls.borrow(),
            vec![Call::Set(42, 3), Call::Get(100), Call::Set(100, 4)]
        );
    }

    #[test]
    fn absolute_mode_ignores_original() {
        let slot = Slot::new();
        let f = focus(7, 100);
        let p = FakePriority::new(5);
        let t = Tracker::new(&f, &p, &slot, PriorityChange::Set(-10));
        t.handle_focus_change();
        assert_eq!(*p.calls.borrow(), vec![Call::Get(100), Call::Set(100, -10)]);
    }

    // -- Idle paths --

    #[test]
    fn empty_slot_restore_is_silent() {
        let slot = Slot::new();
        let f = FakeFocus {
            window: None,
            pid: None,
        };
        let p = FakePriority::new(0);
        let t = Tracker::new(&f, &p, &slot, PriorityChange::Add(-1));
        t.restore();
        assert!(p.calls.borrow().is_empty());
    }

    #[test]
    fn no_active_window_stays_idle() {
        let slot = Slot::new();
        let f = FakeFocus {
            window: None,
            pid: None,
        };
        let p = FakePriority::new(0);
        let t = Tracker::new(&f, &p, &slot, PriorityChange::Add(-1));
        t.handle_focus_change();
        assert!(p.calls.borrow().is_empty());
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn no_pid_stays_idle() {
        let slot = Slot::new();
        let f = FakeFocus {
            window: Some(7),
            pid: None,
        };
        let p = FakePriority::new(0);
        let t = Tracker::new(&f, &p, &slot, PriorityChange::Add(-1));
        t.handle_focus_change();
        assert!(p.calls.borrow().is_empty());
        assert_eq!(slot.take(), None);
    }

    // -- Partial failure --

    #[test]
    fn failed_read_leaves_slot_empty() {
        let slot = Slot::new();
        let f = focus(7, 100);
        let mut p = FakePriority::new(5);
        p.fail_get = true;
        let t = Tracker::new(&f, &p, &slot, PriorityChange::Add(-1));
        t.handle_focus_change();
        assert_eq!(*p.calls.borrow(), vec![Call::Get(100)]);
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn failed_read_makes_next_restore_a_noop() {
        let slot = Slot::new();
        let f = focus(7, 100);
        let mut p = FakePriority::new(5);
        p.fail_get = true;
        let t = Tracker::new(&f, &p, &slot, PriorityChange::Add(-1));
        t.handle_focus_change();
        t.handle_focus_change();
        // No Set between the two Gets: the second transition opened with
        // an empty slot.
        assert_eq!(*p.calls.borrow(), vec![Call::Get(100), Call::Get(100)]);
    }

    #[test]
    fn failed_write_keeps_record_for_restore() {
        let slot = Slot::new();
        let f = focus(7, 100);
        let mut p = FakePriority::new(5);
        p.fail_set = true;
        let t = Tracker::new(&f, &p, &slot, PriorityChange::Add(-10));
        t.handle_focus_change();
        // The elevation never took effect, but the original value read
        // from the process is still what restore must put back.
        assert_eq!(slot.take(), Some(PriorityRecord { pid: 100, nice: 5 }));
    }

    #[test]
    fn restore_reverts_to_true_original_after_failed_write() {
        let slot = Slot::new();
        let f = focus(7, 100);
        let mut p = FakePriority::new(5);
        p.fail_set = true;
        let t = Tracker::new(&f, &p, &slot, PriorityChange::Add(-10));
        t.handle_focus_change();
        t.restore();
        assert_eq!(
            *p.calls.borrow(),
            vec![Call::Get(100), Call::Set(100, -5), Call::Set(100, 5)]
        );
    }
}

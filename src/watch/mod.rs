//! Focus watcher: property-change event loop and signal glue.
//!
//! Watches the root window for `_NET_ACTIVE_WINDOW` updates and renices
//! the process owning whichever window holds focus, undoing the
//! adjustment when focus moves on and when the watcher is terminated.
//!
//! Raising priority above the default requires the nice rlimit, e.g. a
//! `username - nice -10` entry in /etc/security/limits.conf. Run inside
//! the X session the adjustment should apply to.

pub mod priority;
pub mod store;
pub mod tracker;
pub mod x11;

use nix::libc;
use nix::sys::signal::{self, SigHandler, Signal};
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{Atom, Property, Window};

use priority::{PriorityChange, SysPriority};
use tracker::Tracker;
use x11::X11Context;

/// Focus watcher errors.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The target window no longer exists.
    #[error("window 0x{0:x} does not exist")]
    InvalidWindow(Window),
    /// An X11 request failed for another reason.
    #[error("X11: {0}")]
    Protocol(String),
    /// getpriority(2) failed.
    #[error("failed to get priority of pid {pid} ({errno})")]
    PriorityRead { pid: u32, errno: nix::errno::Errno },
    /// setpriority(2) failed.
    #[error("failed to set priority of pid {pid} ({errno})")]
    PriorityWrite { pid: u32, errno: nix::errno::Errno },
    /// Signal handler installation failed.
    #[error("signal setup: {0}")]
    Signal(nix::Error),
}

/// Run the focus watcher until a termination signal arrives.
///
/// Connects to the display, installs the restore-on-signal handlers,
/// adjusts the currently focused window's process once, then blocks on
/// root-window property events indefinitely. The only normal exit path
/// is the signal handler, which re-raises after restoring; an `Err`
/// return means the display could not be reached or went away.
pub fn run(change: PriorityChange, display: Option<&str>) -> Result<(), WatchError> {
    let x11 = X11Context::connect(display)?;
    tracing::info!(screen = x11.screen_num(), "connected to X11 display");

    install_cleanup_handlers()?;

    let sys = SysPriority;
    let tracker = Tracker::new(&x11, &sys, &store::SLOT, change);

    // Adjust whatever is focused right now, before any event arrives.
    tracker.handle_focus_change();

    x11.watch_root_properties()?;

    loop {
        let event = match x11.wait_for_event() {
            Ok(event) => event,
            Err(e) => {
                // The display went away; undo the adjustment and bail.
                tracker.restore();
                return Err(e);
            }
        };

        if is_focus_change(&event, x11.net_active_window()) {
            tracker.handle_focus_change();
        }
    }
}

/// Restore the recorded priority, then die by the signal's default
/// disposition. Everything here must stay async-signal-safe: atomics
/// and raw syscalls only, no allocation, no logging.
extern "C" fn on_signal(signum: libc::c_int) {
    let _ = store::restore(&store::SLOT);
    if let Ok(sig) = Signal::try_from(signum) {
        // SAFETY: installing the default disposition from the handler
        // itself is permitted and signal-safe.
        unsafe {
            let _ = signal::signal(sig, SigHandler::SigDfl);
        }
        let _ = signal::raise(sig);
    }
}

/// Install the cleanup handler for the usual termination signals.
///
/// A pre-existing `SIG_IGN` disposition is put back, so an ignored
/// signal (e.g. SIGHUP under nohup) stays ignored.
fn install_cleanup_handlers() -> Result<(), WatchError> {
    for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        // SAFETY: on_signal only touches atomics and issues syscalls.
        let previous = unsafe { signal::signal(sig, SigHandler::Handler(on_signal)) }
            .map_err(WatchError::Signal)?;
        if previous == SigHandler::SigIgn {
            // SAFETY: reinstates the disposition that was just replaced.
            unsafe { signal::signal(sig, SigHandler::SigIgn) }.map_err(WatchError::Signal)?;
        }
    }
    Ok(())
}

/// True for a new-value change of `_NET_ACTIVE_WINDOW`. Everything else
/// arriving on the root window is noise.
fn is_focus_change(event: &Event, net_active_window: Atom) -> bool {
    match event {
        Event::PropertyNotify(e) => e.atom == net_active_window && e.state == Property::NEW_VALUE,
        _ => false,
    }
}

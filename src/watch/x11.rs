//! X11 integration: connection context, atom interning, property reads.
//!
//! Wraps `x11rb::rust_connection::RustConnection` for the two EWMH
//! properties the watcher cares about, `_NET_ACTIVE_WINDOW` on the root
//! and `_NET_WM_PID` on whichever window it points at.

use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::{ErrorKind, Event};
use x11rb::protocol::xproto::{
    self, Atom, AtomEnum, ChangeWindowAttributesAux, EventMask, Window,
};
use x11rb::rust_connection::RustConnection;

use super::WatchError;
use super::tracker::FocusSource;

/// Atoms interned once at connect time.
struct Atoms {
    net_active_window: Atom,
    net_wm_pid: Atom,
}

/// A property value as returned by the server, with the metadata needed
/// to interpret it.
pub struct PropertyData {
    pub value: Vec<u8>,
    /// Item count reported by the server.
    pub items: u32,
    /// Bits per item (8, 16 or 32).
    pub format: u8,
    pub type_: Atom,
}

impl PropertyData {
    /// The first item as a 32-bit value, native byte order.
    ///
    /// `None` unless the property holds format-32 items and the buffer
    /// is long enough, so malformed data is never misread as an id.
    pub fn first_u32(&self) -> Option<u32> {
        if self.format != 32 || self.items == 0 || self.value.len() < 4 {
            return None;
        }
        Some(u32::from_ne_bytes([
            self.value[0],
            self.value[1],
            self.value[2],
            self.value[3],
        ]))
    }
}

/// X11 connection context for the focus watcher.
pub struct X11Context {
    conn: RustConnection,
    screen_num: usize,
    root: Window,
    atoms: Atoms,
}

impl X11Context {
    /// Connect to the X11 display and intern the required atoms.
    pub fn connect(display: Option<&str>) -> Result<Self, WatchError> {
        let (conn, screen_num) = RustConnection::connect(display)
            .map_err(|e| WatchError::Protocol(format!("connect failed: {e}")))?;

        let root = conn.setup().roots[screen_num].root;

        let net_active_window = intern_atom(&conn, b"_NET_ACTIVE_WINDOW")?;
        let net_wm_pid = intern_atom(&conn, b"_NET_WM_PID")?;

        Ok(Self {
            conn,
            screen_num,
            root,
            atoms: Atoms {
                net_active_window,
                net_wm_pid,
            },
        })
    }

    /// Get the screen number.
    pub fn screen_num(&self) -> usize {
        self.screen_num
    }

    /// Atom of the active-window root property, for event filtering.
    pub fn net_active_window(&self) -> Atom {
        self.atoms.net_active_window
    }

    /// Subscribe to property-change notifications on the root window.
    pub fn watch_root_properties(&self) -> Result<(), WatchError> {
        xproto::change_window_attributes(
            &self.conn,
            self.root,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )
        .map_err(|e| WatchError::Protocol(format!("change_window_attributes send: {e}")))?
        .check()
        .map_err(|e| WatchError::Protocol(format!("change_window_attributes: {e}")))?;

        self.conn
            .flush()
            .map_err(|e| WatchError::Protocol(format!("flush: {e}")))?;

        Ok(())
    }

    /// Block until the next event arrives.
    pub fn wait_for_event(&self) -> Result<Event, WatchError> {
        self.conn
            .wait_for_event()
            .map_err(|e| WatchError::Protocol(format!("wait_for_event: {e}")))
    }

    /// Read the full value of a property without deleting it.
    ///
    /// `Ok(None)` means the property is not set at all, a legitimate
    /// state rather than an error. A window that no longer exists
    /// surfaces as `InvalidWindow`, any other failure as `Protocol`;
    /// both are also reported on stderr here, at the point of failure.
    fn read_property(
        &self,
        window: Window,
        atom: Atom,
        name: &str,
    ) -> Result<Option<PropertyData>, WatchError> {
        let cookie = xproto::get_property(&self.conn, false, window, atom, AtomEnum::ANY, 0, u32::MAX)
            .map_err(|e| {
                eprintln!("GetProperty {name} on window 0x{window:x} failed ({e})");
                WatchError::Protocol(format!("get_property send: {e}"))
            })?;

        let reply = match cookie.reply() {
            Ok(reply) => reply,
            Err(ReplyError::X11Error(e)) if e.error_kind == ErrorKind::Window => {
                eprintln!("window 0x{window:x} does not exist");
                return Err(WatchError::InvalidWindow(window));
            }
            Err(e) => {
                eprintln!("GetProperty {name} on window 0x{window:x} failed ({e})");
                return Err(WatchError::Protocol(format!("get_property reply: {e}")));
            }
        };

        if reply.type_ == u32::from(AtomEnum::NONE) {
            return Ok(None);
        }

        Ok(Some(PropertyData {
            items: reply.value_len,
            format: reply.format,
            type_: reply.type_,
            value: reply.value,
        }))
    }
}

impl FocusSource for X11Context {
    /// Window currently holding focus, per `_NET_ACTIVE_WINDOW` on root.
    ///
    /// `None` when the property is unset (nothing has been focused since
    /// the window manager started) or holds no usable window id.
    fn active_window(&self) -> Result<Option<Window>, WatchError> {
        let data = match self.read_property(
            self.root,
            self.atoms.net_active_window,
            "_NET_ACTIVE_WINDOW",
        )? {
            Some(data) => data,
            None => return Ok(None),
        };

        match data.first_u32() {
            Some(window) if window != 0 => Ok(Some(window)),
            _ => {
                eprintln!("could not get active window");
                tracing::warn!(
                    items = data.items,
                    format = data.format,
                    type_ = data.type_,
                    "active-window property present but unusable"
                );
                Ok(None)
            }
        }
    }

    /// Owning process of a window, per its `_NET_WM_PID` property.
    ///
    /// `None` when the window does not advertise an owning process.
    fn window_pid(&self, window: Window) -> Result<Option<u32>, WatchError> {
        let data = match self.read_property(window, self.atoms.net_wm_pid, "_NET_WM_PID")? {
            Some(data) => data,
            None => return Ok(None),
        };

        match data.first_u32() {
            Some(pid) if pid != 0 => Ok(Some(pid)),
            _ => {
                eprintln!("could not get pid of owner of window 0x{window:x}");
                tracing::warn!(
                    window = format_args!("0x{window:x}"),
                    "pid property present but unusable"
                );
                Ok(None)
            }
        }
    }
}

/// Intern one atom, waiting for the reply.
fn intern_atom(conn: &RustConnection, name: &[u8]) -> Result<Atom, WatchError> {
    Ok(xproto::intern_atom(conn, false, name)
        .map_err(|e| WatchError::Protocol(format!("intern_atom send: {e}")))?
        .reply()
        .map_err(|e| WatchError::Protocol(format!("intern_atom reply: {e}")))?
        .atom)
}

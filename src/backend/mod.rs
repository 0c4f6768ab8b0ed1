//! Display server backends
//!
//! A backend owns the connection, the control window or data device, and
//! the selection store. The protocol logic itself lives in
//! `lamco_selection_core`; backends only move bytes and events.
//!
//! | Backend | Protocol | Selections |
//! |---------|----------|------------|
//! | `x11` | ICCCM selections | PRIMARY, SECONDARY, CLIPBOARD |
//! | `wayland` | wlr-data-control | CLIPBOARD, PRIMARY (v2+) |
//! | `headless` | none, in-process | all |

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use lamco_selection_core::{SelectionKind, SelectionStore, SelectionTransport};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::clipboard::{ClipboardError, Result};
use crate::config::{BackendKind, SelectionConfig};
use crate::driver::EventPump;
use crate::utils::SessionInfo;

pub mod headless;

#[cfg(feature = "wayland")]
pub mod wayland;

#[cfg(feature = "x11")]
pub mod x11;

/// Ownership changes reported to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionEvent {
    /// The display server confirmed us as owner
    OwnershipAcquired(SelectionKind),
    /// Another client took the selection, or it was cleared
    OwnershipLost(SelectionKind),
}

/// Fan-out of [`SelectionEvent`]s to any number of subscribers
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    subscribers: Arc<Mutex<Vec<Sender<SelectionEvent>>>>,
}

impl EventHub {
    /// Create a hub with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<SelectionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event; subscribers that hung up are dropped
    pub fn emit(&self, event: SelectionEvent) {
        debug!(?event, "Selection event");
        self.subscribers.lock().retain(|tx| tx.send(event).is_ok());
    }
}

/// A connected display server backend
pub trait SelectionBackend: Send + Sync {
    /// Short backend name for logs and status output
    fn name(&self) -> &'static str;

    /// False once the connection failed or was shut down
    fn is_alive(&self) -> bool;

    /// Whether this backend can own and read `kind`
    fn supports(&self, kind: SelectionKind) -> bool;

    /// Transport used by the fetch coordinator and for ownership
    fn transport(&self) -> &dyn SelectionTransport;

    /// Selection slots
    fn store(&self) -> &SelectionStore;

    /// Event pump to register with a host loop; `None` when a dedicated
    /// thread drives the connection
    fn pump(&self) -> Option<Arc<dyn EventPump>>;

    /// Hand over owned selections, release protocol objects and close
    fn shutdown(&mut self) -> Result<()>;
}

/// Open the backend selected by `config`
pub fn open(config: &SelectionConfig, events: EventHub) -> Result<Box<dyn SelectionBackend>> {
    let kind = match config.backend {
        BackendKind::Auto => detect(&SessionInfo::detect())?,
        explicit => explicit,
    };
    info!("Opening {} selection backend", kind);

    match kind {
        BackendKind::Headless => Ok(Box::new(headless::HeadlessBackend::new(events))),
        BackendKind::X11 => open_x11(config, events),
        BackendKind::Wayland => match open_wayland(config, events.clone()) {
            // XWayland still serves selections when the compositor lacks data-control
            Err(ClipboardError::ProtocolUnsupported(what))
                if config.backend == BackendKind::Auto && SessionInfo::detect().display.is_some() =>
            {
                info!("{} unavailable, falling back to X11 via XWayland", what);
                open_x11(config, events)
            }
            other => other,
        },
        BackendKind::Auto => Err(ClipboardError::NoDisplay("backend detection returned auto".to_string())),
    }
}

/// Pick a backend from the session environment
pub fn detect(session: &SessionInfo) -> Result<BackendKind> {
    if session.wayland_display.is_some() && cfg!(feature = "wayland") {
        return Ok(BackendKind::Wayland);
    }
    if session.display.is_some() && cfg!(feature = "x11") {
        return Ok(BackendKind::X11);
    }
    Err(ClipboardError::NoDisplay(
        "neither WAYLAND_DISPLAY nor DISPLAY is set".to_string(),
    ))
}

#[cfg(feature = "x11")]
fn open_x11(config: &SelectionConfig, events: EventHub) -> Result<Box<dyn SelectionBackend>> {
    Ok(Box::new(x11::X11Backend::open(config, events)?))
}

#[cfg(not(feature = "x11"))]
fn open_x11(_config: &SelectionConfig, _events: EventHub) -> Result<Box<dyn SelectionBackend>> {
    Err(ClipboardError::ProtocolUnsupported(
        "X11 support not compiled in (enable the `x11` feature)".to_string(),
    ))
}

#[cfg(feature = "wayland")]
fn open_wayland(config: &SelectionConfig, events: EventHub) -> Result<Box<dyn SelectionBackend>> {
    Ok(Box::new(wayland::WaylandBackend::open(config, events)?))
}

#[cfg(not(feature = "wayland"))]
fn open_wayland(_config: &SelectionConfig, _events: EventHub) -> Result<Box<dyn SelectionBackend>> {
    Err(ClipboardError::ProtocolUnsupported(
        "Wayland support not compiled in (enable the `wayland` feature)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(display: Option<&str>, wayland: Option<&str>) -> SessionInfo {
        SessionInfo {
            session_type: None,
            display: display.map(String::from),
            wayland_display: wayland.map(String::from),
            desktop: None,
        }
    }

    #[test]
    fn test_event_hub_fan_out() {
        let hub = EventHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();
        hub.emit(SelectionEvent::OwnershipLost(SelectionKind::Clipboard));
        assert_eq!(a.try_recv().unwrap(), SelectionEvent::OwnershipLost(SelectionKind::Clipboard));
        assert_eq!(b.try_recv().unwrap(), SelectionEvent::OwnershipLost(SelectionKind::Clipboard));
    }

    #[test]
    fn test_event_hub_drops_closed_subscribers() {
        let hub = EventHub::new();
        drop(hub.subscribe());
        let live = hub.subscribe();
        hub.emit(SelectionEvent::OwnershipAcquired(SelectionKind::Primary));
        assert_eq!(hub.subscribers.lock().len(), 1);
        assert!(live.try_recv().is_ok());
    }

    #[test]
    fn test_detect_without_display() {
        assert!(matches!(detect(&session(None, None)), Err(ClipboardError::NoDisplay(_))));
    }

    #[cfg(all(feature = "x11", feature = "wayland"))]
    #[test]
    fn test_detect_prefers_wayland() {
        assert_eq!(detect(&session(Some(":0"), Some("wayland-0"))).unwrap(), BackendKind::Wayland);
        assert_eq!(detect(&session(Some(":0"), None)).unwrap(), BackendKind::X11);
    }

    #[test]
    fn test_open_headless() {
        let config = SelectionConfig {
            backend: BackendKind::Headless,
            ..SelectionConfig::default()
        };
        let backend = open(&config, EventHub::new()).unwrap();
        assert_eq!(backend.name(), "headless");
        assert!(backend.is_alive());
        assert!(backend.pump().is_none());
    }
}

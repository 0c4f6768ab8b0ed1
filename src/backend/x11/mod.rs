//! X11 selection backend (ICCCM)
//!
//! One connection, one input-only control window. All protocol traffic is
//! handled by whoever drives the [`EventPump`]: the dedicated event thread,
//! or the host loop. API calls never touch replies directly; they post
//! self-addressed ClientMessage commands to the control window and wait on
//! the store rendezvous (or the control rendezvous for ownership queries).
//!
//! # Commands
//!
//! | Type | data\[0..\] |
//! |------|-------------|
//! | `LAMCO_CONVERT` | selection, target, serial, time |
//! | `LAMCO_CONTINUE` | selection, serial |
//! | `LAMCO_OFFER` | selection, serial |
//! | `LAMCO_QUERY` | selection, serial |
//! | `WM_PROTOCOLS` | `WM_DELETE_WINDOW` (stop, with clipboard manager handover) |

mod atoms;
mod clock;
mod events;
mod transport;
mod wire;

use std::collections::HashMap;
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lamco_selection_core::{
    Format, FormatConverter, FormatRegistry, Owner, Rendezvous, RequestHandler, SelectionError, SelectionKind,
    SelectionResult, SelectionStore, SelectionTransport, Timestamp,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use x11rb::connection::Connection as _;
use x11rb::connection::RequestConnection as _;
use x11rb::protocol::xproto::{
    Atom, ClientMessageEvent, ConnectionExt as _, CreateWindowAux, EventMask, Window, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT};

use self::atoms::{intern_formats, Atoms};
use self::clock::ServerClock;
use super::{EventHub, SelectionBackend};
use crate::clipboard::{ClipboardError, Result};
use crate::config::{Scheduling, SelectionConfig};
use crate::driver::{pump_until, EventPump, PumpStatus, ThreadDriver};

/// Upper bound on one poll: x11rb may queue events while another thread
/// waits for a reply, and those never show on the socket
const EVENT_QUEUE_TICK: Duration = Duration::from_millis(250);

/// Extra time for the event thread to wind down after the handover bound
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Fetch in progress for one selection
#[derive(Debug, Clone, Copy)]
struct InboundTransfer {
    serial: u32,
    format: Format,
    /// Atom and time of the ConvertSelection, matched against the notify
    target: Atom,
    time: Timestamp,
    incremental: bool,
}

/// Answers to ownership commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlReply {
    Owner(Owner),
    Offered(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handover {
    Idle,
    InProgress {
        deadline: Instant,
        written: bool,
        notified: bool,
    },
}

/// Connection state shared by the API side and the event side
pub(crate) struct X11Shared<C = RustConnection> {
    conn: C,
    window: Window,
    atoms: Atoms,
    registry: FormatRegistry<Atom>,
    clock: ServerClock,
    store: SelectionStore,
    handler: RequestHandler,
    events: EventHub,
    scheduling: Scheduling,
    inbound: Mutex<HashMap<SelectionKind, InboundTransfer>>,
    control: Rendezvous<ControlReply>,
    control_lock: Mutex<()>,
    control_timeout: Duration,
    handover: Mutex<Handover>,
    handover_enabled: bool,
    handover_timeout: Duration,
    max_request_bytes: usize,
    alive: AtomicBool,
}

impl<C: wire::SelectionWire> X11Shared<C> {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Shorter poll bound while a handover deadline is running
    fn handover_remaining(&self) -> Option<Duration> {
        match *self.handover.lock() {
            Handover::InProgress { deadline, .. } => Some(deadline.saturating_duration_since(Instant::now())),
            Handover::Idle => None,
        }
    }

    fn handover_status(&self) -> PumpStatus {
        match *self.handover.lock() {
            Handover::Idle => PumpStatus::Continue,
            Handover::InProgress {
                written: true,
                notified: true,
                ..
            } => {
                info!("Clipboard manager took over the selections");
                PumpStatus::Exit
            }
            Handover::InProgress { deadline, .. } if Instant::now() >= deadline => {
                warn!("Clipboard manager handover timed out");
                PumpStatus::Exit
            }
            Handover::InProgress { .. } => PumpStatus::Continue,
        }
    }
}

impl X11Shared {
    /// Post a command to our own control window
    fn send_command(&self, command: Atom, data: [u32; 5]) -> Result<()> {
        let event = ClientMessageEvent::new(32, self.window, command, data);
        self.conn
            .send_event(false, self.window, EventMask::NO_EVENT, event)?;
        self.conn.flush()?;
        Ok(())
    }

    /// Run an ownership command on the event side and wait for its answer
    fn control(&self, command: Atom, kind: SelectionKind) -> SelectionResult<ControlReply> {
        if !self.is_alive() {
            return Err(SelectionError::Transport("X11 connection closed".to_string()));
        }

        let _exclusive = self.control_lock.lock();
        let serial = self.store.next_serial();
        self.control.arm(serial);
        let sent = self.send_command(command, [self.atoms.selection(kind), serial, 0, 0, 0]);

        let reply = match sent {
            Err(e) => Err(SelectionError::Transport(e.to_string())),
            Ok(()) => {
                let reply = match self.scheduling {
                    Scheduling::Thread => self.control.wait(serial, self.control_timeout),
                    Scheduling::HostLoop => {
                        let mut reply = None;
                        let deadline = Instant::now() + self.control_timeout;
                        let pumped = pump_until(self, deadline, || {
                            reply = reply.or_else(|| self.control.try_take(serial));
                            reply.is_some()
                        });
                        if let Err(e) = pumped {
                            warn!("Nested pump failed: {}", e);
                        }
                        reply
                    }
                };
                reply.ok_or(SelectionError::Timeout(self.control_timeout.as_millis() as u64))
            }
        };
        self.control.disarm();
        reply
    }

    fn drain(&self) -> Result<PumpStatus> {
        while let Some(event) = self.conn.poll_for_event()? {
            match self.handle_event(event) {
                Ok(PumpStatus::Exit) => return Ok(PumpStatus::Exit),
                Ok(PumpStatus::Continue) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Failed to handle X11 event: {}", e),
            }
        }
        self.conn.flush()?;
        Ok(self.handover_status())
    }
}

impl EventPump for X11Shared {
    fn fd(&self) -> BorrowedFd<'_> {
        self.conn.stream().as_fd()
    }

    fn prepare(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }

    fn dispatch(&self) -> Result<PumpStatus> {
        let status = self.drain();
        if !matches!(status, Ok(PumpStatus::Continue)) {
            self.alive.store(false, Ordering::Release);
        }
        status
    }

    fn poll_timeout(&self) -> Option<Duration> {
        Some(
            self.handover_remaining()
                .map_or(EVENT_QUEUE_TICK, |remaining| remaining.min(EVENT_QUEUE_TICK)),
        )
    }
}

/// ICCCM selection backend
pub struct X11Backend {
    shared: Arc<X11Shared>,
    driver: Option<ThreadDriver>,
    closed: bool,
}

impl X11Backend {
    /// Connect to the X server named by `DISPLAY`
    pub fn open(config: &SelectionConfig, events: EventHub) -> Result<Self> {
        let (conn, screen_num) = RustConnection::connect(None)
            .map_err(|e| ClipboardError::Connection(format!("cannot connect to X server: {}", e)))?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| ClipboardError::Connection("X server reported no screen".to_string()))?;

        let window = conn.generate_id()?;
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            window,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            COPY_FROM_PARENT,
            &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?;

        let atoms = Atoms::new(&conn)?.reply()?;
        let registry = intern_formats(&conn)?;
        let clock = ServerClock::calibrate(&conn, window, atoms.LAMCO_TIMESTAMP)?;
        // Room for the ChangeProperty header
        let max_request_bytes = conn.maximum_request_bytes().saturating_sub(32);
        debug!(window, max_request_bytes, "X11 control window ready");

        let handler = RequestHandler::new(
            FormatConverter::with_max_size(config.max_transfer_size),
            config.targets_reply_type_atom,
        );

        let shared = Arc::new(X11Shared {
            conn,
            window,
            atoms,
            registry,
            clock,
            store: SelectionStore::new(),
            handler,
            events,
            scheduling: config.scheduling,
            inbound: Mutex::new(HashMap::new()),
            control: Rendezvous::new(),
            control_lock: Mutex::new(()),
            control_timeout: config.fetch_timeout(),
            handover: Mutex::new(Handover::Idle),
            handover_enabled: config.clipboard_manager_handover,
            handover_timeout: config.handover_timeout(),
            max_request_bytes,
            alive: AtomicBool::new(true),
        });

        let driver = match config.scheduling {
            Scheduling::Thread => {
                let pump: Arc<dyn EventPump> = shared.clone();
                Some(ThreadDriver::spawn("lamco-x11", pump)?)
            }
            Scheduling::HostLoop => None,
        };

        info!("Connected to X server (screen {})", screen_num);
        Ok(Self {
            shared,
            driver,
            closed: false,
        })
    }
}

impl SelectionBackend for X11Backend {
    fn name(&self) -> &'static str {
        "x11"
    }

    fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    fn supports(&self, _kind: SelectionKind) -> bool {
        true
    }

    fn transport(&self) -> &dyn SelectionTransport {
        self.shared.as_ref()
    }

    fn store(&self) -> &SelectionStore {
        &self.shared.store
    }

    fn pump(&self) -> Option<Arc<dyn EventPump>> {
        match self.shared.scheduling {
            Scheduling::HostLoop => Some(self.shared.clone()),
            Scheduling::Thread => None,
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let shared = &self.shared;
        let bound = shared.handover_timeout + STOP_GRACE;

        match self.driver.as_mut() {
            Some(driver) => {
                if shared.is_alive() {
                    let delete = [shared.atoms.WM_DELETE_WINDOW, 0, 0, 0, 0];
                    if let Err(e) = shared.send_command(shared.atoms.WM_PROTOCOLS, delete) {
                        warn!("Failed to post stop command: {}", e);
                    }
                }
                driver.stop(bound);
            }
            None => {
                if shared.is_alive() && shared.begin_stop()? == PumpStatus::Continue {
                    pump_until(shared.as_ref(), Instant::now() + bound, || !shared.is_alive())?;
                }
            }
        }

        shared.alive.store(false, Ordering::Release);
        // The connection may already be gone
        if let Err(e) = shared.conn.destroy_window(shared.window) {
            debug!("Failed to destroy control window: {}", e);
        }
        if let Err(e) = shared.conn.flush() {
            debug!("Failed to flush on shutdown: {}", e);
        }
        info!("X11 selection backend stopped");
        Ok(())
    }
}

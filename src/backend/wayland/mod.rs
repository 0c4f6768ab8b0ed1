//! Wayland selection backend (wlr-data-control)
//!
//! Requires a compositor exposing `zwlr_data_control_manager_v1`
//! (wlroots compositors, KDE Plasma 6). Version 2 of the manager adds the
//! primary selection; SECONDARY does not exist on Wayland.
//!
//! Data moves through pipes: reading an offer calls `receive` and reads
//! the pipe on the caller's thread, serving our source writes the
//! converted bytes from a short-lived writer thread.

mod state;
mod transport;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lamco_selection_core::{FormatConverter, RequestHandler, SelectionKind, SelectionStore, SelectionTransport};
use parking_lot::Mutex;
use tracing::{debug, info};
use wayland_client::backend::{Backend, WaylandError};
use wayland_client::globals::registry_queue_init;
use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::{Connection, EventQueue, Proxy};
use wayland_protocols_wlr::data_control::v1::client::zwlr_data_control_manager_v1::ZwlrDataControlManagerV1;

use self::state::{Selections, WaylandShared, WaylandState};
use self::transport::PendingRead;
use super::{EventHub, SelectionBackend};
use crate::clipboard::{ClipboardError, Result};
use crate::config::{Scheduling, SelectionConfig};
use crate::driver::{EventPump, PumpStatus, ThreadDriver};

/// Manager version that introduced the primary selection
const PRIMARY_SELECTION_VERSION: u32 = 2;

fn connection_error(context: &str, e: impl std::fmt::Display) -> ClipboardError {
    ClipboardError::Connection(format!("{}: {}", context, e))
}

/// Connection, event queue and shared state
pub(crate) struct WaylandClient {
    shared: Arc<WaylandShared>,
    backend: Backend,
    queue: Mutex<EventQueue<WaylandState>>,
    reads: Mutex<HashMap<SelectionKind, PendingRead>>,
}

impl WaylandClient {
    fn connect(config: &SelectionConfig, events: EventHub) -> Result<Self> {
        let conn = Connection::connect_to_env()
            .map_err(|e| connection_error("cannot connect to Wayland compositor", e))?;

        let (globals, mut queue) = registry_queue_init::<WaylandState>(&conn)
            .map_err(|e| connection_error("failed to initialize Wayland registry", e))?;
        let qh = queue.handle();

        let manager: ZwlrDataControlManagerV1 = globals.bind(&qh, 1..=2, ()).map_err(|e| {
            ClipboardError::ProtocolUnsupported(format!("compositor does not support wlr-data-control ({})", e))
        })?;
        debug!("Bound zwlr_data_control_manager_v1 version {}", manager.version());

        let seat: WlSeat = globals
            .bind(&qh, 1..=8, ())
            .map_err(|e| connection_error("no seat available", e))?;

        let handler = RequestHandler::new(
            FormatConverter::with_max_size(config.max_transfer_size),
            config.targets_reply_type_atom,
        );
        let primary_supported = manager.version() >= PRIMARY_SELECTION_VERSION;
        let device = manager.get_data_device(&seat, &qh, ());

        let shared = Arc::new(WaylandShared {
            conn: conn.clone(),
            qh,
            manager,
            seat,
            primary_supported,
            store: SelectionStore::new(),
            handler,
            events,
            selections: Mutex::new(Selections {
                device: Some(device),
                ..Selections::default()
            }),
            max_size: config.max_transfer_size,
            epoch: Instant::now(),
            alive: AtomicBool::new(true),
        });

        // Receive the current selections before the first read
        let mut state = WaylandState { shared: shared.clone() };
        queue
            .roundtrip(&mut state)
            .map_err(|e| connection_error("initial Wayland roundtrip failed", e))?;

        info!(
            "Connected to Wayland compositor (primary selection {})",
            if primary_supported { "available" } else { "unavailable" }
        );

        Ok(Self {
            shared,
            backend: conn.backend(),
            queue: Mutex::new(queue),
            reads: Mutex::new(HashMap::new()),
        })
    }

    fn flush(&self) -> Result<()> {
        match self.shared.conn.flush() {
            Ok(()) => Ok(()),
            Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(connection_error("failed to flush Wayland connection", e)),
        }
    }

    /// Destroy our protocol objects
    fn release(&self) {
        self.shared.alive.store(false, Ordering::Release);
        let mut selections = self.shared.selections.lock();
        for (_, source) in selections.sources.drain() {
            source.destroy();
        }
        for (_, offer) in selections.offers.drain() {
            offer.destroy();
        }
        if let Some(device) = selections.device.take() {
            device.destroy();
        }
        drop(selections);
        if let Err(e) = self.flush() {
            debug!("Failed to flush on shutdown: {}", e);
        }
    }
}

impl EventPump for WaylandClient {
    fn fd(&self) -> BorrowedFd<'_> {
        self.backend.poll_fd()
    }

    fn prepare(&self) -> Result<()> {
        self.flush()
    }

    fn dispatch(&self) -> Result<PumpStatus> {
        if !self.shared.is_alive() {
            return Ok(PumpStatus::Exit);
        }

        let mut queue = self.queue.lock();
        let mut state = WaylandState {
            shared: self.shared.clone(),
        };

        if let Some(guard) = queue.prepare_read() {
            match guard.read() {
                Ok(_) => {}
                Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => {
                    self.shared.alive.store(false, Ordering::Release);
                    return Err(connection_error("Wayland connection lost", e));
                }
            }
        }
        if let Err(e) = queue.dispatch_pending(&mut state) {
            self.shared.alive.store(false, Ordering::Release);
            return Err(connection_error("Wayland dispatch failed", e));
        }
        drop(queue);

        self.flush()?;
        Ok(PumpStatus::Continue)
    }
}

/// wlr-data-control selection backend
pub struct WaylandBackend {
    client: Arc<WaylandClient>,
    scheduling: Scheduling,
    driver: Option<ThreadDriver>,
}

impl WaylandBackend {
    /// Connect to the compositor named by `WAYLAND_DISPLAY`
    pub fn open(config: &SelectionConfig, events: EventHub) -> Result<Self> {
        let client = Arc::new(WaylandClient::connect(config, events)?);

        let driver = match config.scheduling {
            Scheduling::Thread => {
                let pump: Arc<dyn EventPump> = client.clone();
                Some(ThreadDriver::spawn("lamco-wayland", pump)?)
            }
            Scheduling::HostLoop => None,
        };

        Ok(Self {
            client,
            scheduling: config.scheduling,
            driver,
        })
    }
}

impl SelectionBackend for WaylandBackend {
    fn name(&self) -> &'static str {
        "wayland"
    }

    fn is_alive(&self) -> bool {
        self.client.shared.is_alive()
    }

    fn supports(&self, kind: SelectionKind) -> bool {
        self.client.shared.supports(kind)
    }

    fn transport(&self) -> &dyn SelectionTransport {
        self.client.as_ref()
    }

    fn store(&self) -> &SelectionStore {
        &self.client.shared.store
    }

    fn pump(&self) -> Option<Arc<dyn EventPump>> {
        match self.scheduling {
            Scheduling::HostLoop => Some(self.client.clone()),
            Scheduling::Thread => None,
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        self.client.release();
        if let Some(mut driver) = self.driver.take() {
            // An idle connection never wakes the pump, so use the stop pipe
            driver.stop(Duration::ZERO);
        }
        info!("Wayland selection backend stopped");
        Ok(())
    }
}

//! In-process backend without a display server.
//!
//! This process is the only client: setting a selection makes us its
//! owner, clearing it leaves it unowned. Useful for tests and for running
//! the API where no display is available.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lamco_selection_core::{
    Format, Owner, Reply, SelectionError, SelectionKind, SelectionResult, SelectionStore, SelectionTransport,
    Timestamp,
};
use parking_lot::Mutex;

use super::{EventHub, SelectionBackend, SelectionEvent};
use crate::clipboard::Result;
use crate::driver::EventPump;

/// Transport of the headless backend
#[derive(Debug)]
pub struct HeadlessTransport {
    store: Arc<SelectionStore>,
    owned: Mutex<[bool; 3]>,
    epoch: Instant,
    events: EventHub,
}

fn slot(kind: SelectionKind) -> usize {
    match kind {
        SelectionKind::Primary => 0,
        SelectionKind::Secondary => 1,
        SelectionKind::Clipboard => 2,
    }
}

impl HeadlessTransport {
    fn new(store: Arc<SelectionStore>, events: EventHub) -> Self {
        Self {
            store,
            owned: Mutex::new([false; 3]),
            epoch: Instant::now(),
            events,
        }
    }
}

impl SelectionTransport for HeadlessTransport {
    fn now(&self) -> Timestamp {
        // Never CURRENT_TIME, so ownership timestamps stay meaningful
        (self.epoch.elapsed().as_millis() as u32).wrapping_add(1).max(1)
    }

    fn query_owner(&self, kind: SelectionKind) -> SelectionResult<Owner> {
        Ok(if self.owned.lock()[slot(kind)] {
            Owner::This
        } else {
            Owner::Nobody
        })
    }

    fn send_conversion_request(&self, kind: SelectionKind, _format: Format, _serial: u32) -> SelectionResult<()> {
        Err(SelectionError::InvalidState(format!(
            "no peer can own {kind} on a headless display"
        )))
    }

    fn await_reply(&self, _kind: SelectionKind, _serial: u32, _timeout: Duration) -> Option<Reply> {
        None
    }

    fn continue_transfer(&self, _kind: SelectionKind, _serial: u32) -> SelectionResult<()> {
        Err(SelectionError::InvalidState("no transfer in progress".to_string()))
    }

    fn become_owner(&self, kind: SelectionKind) -> SelectionResult<()> {
        let owns = self.store.has_data(kind);
        let was = std::mem::replace(&mut self.owned.lock()[slot(kind)], owns);
        if owns {
            self.events.emit(SelectionEvent::OwnershipAcquired(kind));
        } else if was {
            self.events.emit(SelectionEvent::OwnershipLost(kind));
        }
        Ok(())
    }
}

/// Backend with no display server behind it
#[derive(Debug)]
pub struct HeadlessBackend {
    store: Arc<SelectionStore>,
    transport: HeadlessTransport,
    alive: AtomicBool,
}

impl HeadlessBackend {
    /// Create the backend
    pub fn new(events: EventHub) -> Self {
        let store = Arc::new(SelectionStore::new());
        Self {
            transport: HeadlessTransport::new(Arc::clone(&store), events),
            store,
            alive: AtomicBool::new(true),
        }
    }
}

impl SelectionBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn supports(&self, _kind: SelectionKind) -> bool {
        true
    }

    fn transport(&self) -> &dyn SelectionTransport {
        &self.transport
    }

    fn store(&self) -> &SelectionStore {
        &self.store
    }

    fn pump(&self) -> Option<Arc<dyn EventPump>> {
        None
    }

    fn shutdown(&mut self) -> Result<()> {
        self.alive.store(false, Ordering::Release);
        Ok(())
    }
}

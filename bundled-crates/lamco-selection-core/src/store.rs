//! Per-selection slots.
//!
//! Each slot holds what we would answer with if asked: the envelope, the
//! time we took ownership, and the rendezvous a fetch waits on. The slot is
//! a cache, not a mirror of server-side ownership.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::envelope::Envelope;
use crate::rendezvous::{Rendezvous, NO_TICKET};
use crate::transport::Reply;

/// Server time in milliseconds, wrapping
pub type Timestamp = u32;

/// "Any time" / "now"
pub const CURRENT_TIME: Timestamp = 0;

/// A named selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    /// PRIMARY, the mouse selection
    Primary,
    /// SECONDARY
    Secondary,
    /// CLIPBOARD
    Clipboard,
}

impl SelectionKind {
    /// All selections, in slot order
    pub const ALL: [SelectionKind; 3] = [Self::Primary, Self::Secondary, Self::Clipboard];

    /// Map a host register name: `*` or `primary` is PRIMARY,
    /// `secondary` is SECONDARY, everything else CLIPBOARD
    pub fn from_name(name: &str) -> Self {
        match name {
            "*" | "primary" | "PRIMARY" => Self::Primary,
            "secondary" | "SECONDARY" => Self::Secondary,
            _ => Self::Clipboard,
        }
    }

    /// Protocol name
    pub fn name(self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY",
            Self::Secondary => "SECONDARY",
            Self::Clipboard => "CLIPBOARD",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
            Self::Clipboard => 2,
        }
    }
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Default)]
struct SlotData {
    envelope: Option<Envelope>,
    timestamp: Timestamp,
    generation: u64,
}

#[derive(Debug, Default)]
struct Slot {
    data: Mutex<SlotData>,
    reply: Rendezvous<Reply>,
}

/// Locked view of a slot
///
/// The slot cannot be overwritten while the guard lives.
pub struct SlotGuard<'a>(MutexGuard<'a, SlotData>);

impl SlotGuard<'_> {
    /// Stored envelope, `None` when empty
    pub fn envelope(&self) -> Option<&Envelope> {
        self.0.envelope.as_ref()
    }

    /// Ownership timestamp
    pub fn timestamp(&self) -> Timestamp {
        self.0.timestamp
    }

    /// False until the first write
    pub fn has_been_written(&self) -> bool {
        self.0.generation > 0
    }
}

/// All selection slots of one connection
#[derive(Debug)]
pub struct SelectionStore {
    slots: [Slot; 3],
    serial: AtomicU32,
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStore {
    /// Create empty slots
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            serial: AtomicU32::new(NO_TICKET),
        }
    }

    fn slot(&self, kind: SelectionKind) -> &Slot {
        &self.slots[kind.index()]
    }

    /// Replace a slot's content; `None` is the cleared state
    pub fn write(&self, kind: SelectionKind, envelope: Option<Envelope>, timestamp: Timestamp) {
        let mut data = self.slot(kind).data.lock();
        data.envelope = envelope;
        data.timestamp = timestamp;
        data.generation += 1;
    }

    /// Replace a slot's content, keeping its ownership timestamp
    pub fn replace(&self, kind: SelectionKind, envelope: Option<Envelope>) {
        let mut data = self.slot(kind).data.lock();
        data.envelope = envelope;
        data.generation += 1;
    }

    /// Empty a slot
    pub fn clear(&self, kind: SelectionKind) {
        self.replace(kind, None);
    }

    /// Lock a slot for reading
    pub fn read(&self, kind: SelectionKind) -> SlotGuard<'_> {
        SlotGuard(self.slot(kind).data.lock())
    }

    /// Copy of the stored envelope
    pub fn snapshot(&self, kind: SelectionKind) -> Option<Envelope> {
        self.slot(kind).data.lock().envelope.clone()
    }

    /// Ownership timestamp of a slot
    pub fn timestamp(&self, kind: SelectionKind) -> Timestamp {
        self.slot(kind).data.lock().timestamp
    }

    /// True when the slot holds an envelope
    pub fn has_data(&self, kind: SelectionKind) -> bool {
        self.slot(kind).data.lock().envelope.is_some()
    }

    /// True once anything was written to the slot
    pub fn has_been_written(&self, kind: SelectionKind) -> bool {
        self.slot(kind).data.lock().generation > 0
    }

    /// Serial for a new fetch cycle, never [`NO_TICKET`]
    pub fn next_serial(&self) -> u32 {
        loop {
            let serial = self.serial.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if serial != NO_TICKET {
                return serial;
            }
        }
    }

    /// Expect a reply tagged `serial` for `kind`
    pub fn arm(&self, kind: SelectionKind, serial: u32) {
        self.slot(kind).reply.arm(serial);
    }

    /// Stop expecting replies for `kind`
    pub fn disarm(&self, kind: SelectionKind) {
        self.slot(kind).reply.disarm();
    }

    /// Serial currently awaited for `kind`
    pub fn armed_serial(&self, kind: SelectionKind) -> u32 {
        self.slot(kind).reply.ticket()
    }

    /// Deliver a reply; false when nobody waits for `serial`
    pub fn publish(&self, kind: SelectionKind, serial: u32, reply: Reply) -> bool {
        self.slot(kind).reply.publish(serial, reply)
    }

    /// Take a reply that already arrived
    pub fn try_take(&self, kind: SelectionKind, serial: u32) -> Option<Reply> {
        self.slot(kind).reply.try_take(serial)
    }

    /// Bounded wait for the reply tagged `serial`
    pub fn wait_ready(&self, kind: SelectionKind, serial: u32, timeout: Duration) -> Option<Reply> {
        self.slot(kind).reply.wait(serial, timeout)
    }
}

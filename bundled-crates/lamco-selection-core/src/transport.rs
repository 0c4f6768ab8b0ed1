//! Capability interface between the protocol core and a display server.

use std::time::Duration;

use crate::formats::Format;
use crate::store::{SelectionKind, Timestamp};
use crate::SelectionResult;

/// Who owns a selection according to the display server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Nobody owns it
    Nobody,
    /// This process owns it
    This,
    /// Another client owns it
    Peer,
}

/// Answer to one conversion request or transfer step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Targets the owner can convert to (unknown targets already dropped)
    Targets(Vec<Format>),
    /// Complete data in the given format
    Data {
        /// Format the owner actually delivered
        format: Format,
        /// Raw bytes
        bytes: Vec<u8>,
    },
    /// The owner will deliver the data in chunks
    Incremental {
        /// Format of the chunks
        format: Format,
        /// Lower bound on the total size, as announced by the owner
        size_hint: usize,
    },
    /// One chunk of an incremental transfer; empty ends the transfer
    Chunk(Vec<u8>),
    /// The owner refused the conversion
    Refused,
}

/// Operations a display-server backend provides to the protocol core
///
/// Implementations are driven from the caller's thread. How the request
/// reaches the connection (self-addressed event to a dedicated thread, or a
/// direct call on the host loop) is up to the backend.
#[cfg_attr(test, mockall::automock)]
pub trait SelectionTransport: Send + Sync {
    /// Current server time, [`crate::store::CURRENT_TIME`] when unknown
    fn now(&self) -> Timestamp;

    /// Ask the server who owns `kind`
    fn query_owner(&self, kind: SelectionKind) -> SelectionResult<Owner>;

    /// Ask the owner of `kind` to convert it to `format`
    ///
    /// The reply is tagged with `serial`; the transport arms the slot
    /// rendezvous before the request leaves.
    fn send_conversion_request(&self, kind: SelectionKind, format: Format, serial: u32) -> SelectionResult<()>;

    /// Wait up to `timeout` for the reply tagged `serial`
    fn await_reply(&self, kind: SelectionKind, serial: u32, timeout: Duration) -> Option<Reply>;

    /// Acknowledge the current chunk and ask for the next one
    fn continue_transfer(&self, kind: SelectionKind, serial: u32) -> SelectionResult<()>;

    /// Claim (or, with an empty slot, release) ownership of `kind`
    fn become_owner(&self, kind: SelectionKind) -> SelectionResult<()>;
}

//! # lamco-selection-core
//!
//! Transport-agnostic core of the desktop selection protocols.
//!
//! Everything here is shared by the X11 (ICCCM) and Wayland
//! (wlr-data-control) backends:
//!
//! - **[`Envelope`]** - register text with its type tag and encoding, and its wire form
//! - **[`Format`] / [`FormatRegistry`]** - the closed set of targets and their ranking
//! - **[`FormatConverter`]** - UTF-8, ISO-8859-1 and compound text conversion
//! - **[`SelectionStore`]** - per-selection slots with a bounded reply rendezvous
//! - **[`RequestHandler`]** - answers peers reading our selections
//! - **[`FetchCoordinator`]** - reads selections owned by peers, through a
//!   [`SelectionTransport`] implemented by each backend
//! - **[`IncrementalTransfer`]** - chunked transfer reassembly
//!
//! ## Quick Start
//!
//! ```rust
//! use lamco_selection_core::{Envelope, Format, RegisterType, RequestHandler, Response};
//! use lamco_selection_core::{SelectionKind, SelectionStore, CURRENT_TIME};
//!
//! let store = SelectionStore::new();
//! let envelope = Envelope::from_lines(&["hello", "world"], RegisterType::Line);
//! store.write(SelectionKind::Clipboard, Some(envelope), 1);
//!
//! let handler = RequestHandler::default();
//! let response = handler.handle(&store, SelectionKind::Clipboard, Some(Format::Utf8String), CURRENT_TIME);
//! assert_eq!(
//!     response,
//!     Response::Data { format: Format::Utf8String, bytes: b"hello\nworld\n".to_vec() }
//! );
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

mod error;
mod transfer;

pub mod codec;
pub mod envelope;
pub mod fetch;
pub mod formats;
pub mod lines;
pub mod register;
pub mod rendezvous;
pub mod request;
pub mod store;
pub mod transport;

pub use codec::FormatConverter;
pub use envelope::{Envelope, UTF8_ENCODING};
pub use error::{ErrorKind, SelectionError, SelectionResult};
pub use fetch::{FetchConfig, FetchCoordinator};
pub use formats::{rank, Format, FormatRegistry};
pub use lines::{join_lines, resolve_register, split_lines};
pub use register::RegisterType;
pub use rendezvous::Rendezvous;
pub use request::{Conversion, MultipleReply, RequestHandler, Response};
pub use store::{SelectionKind, SelectionStore, SlotGuard, Timestamp, CURRENT_TIME};
pub use transfer::{
    IncrementalTransfer, TransferProgress, TransferState, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_SIZE, DEFAULT_TIMEOUT_MS,
};
pub use transport::{Owner, Reply, SelectionTransport};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Envelope, FetchCoordinator, Format, RegisterType, RequestHandler, SelectionError, SelectionKind,
        SelectionResult, SelectionStore, SelectionTransport,
    };
}

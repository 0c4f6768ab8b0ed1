//! # lamco-selection
//!
//! X11 and Wayland selection (clipboard) client for editor-like
//! applications: own PRIMARY, SECONDARY and CLIPBOARD, answer other
//! clients' requests in their preferred text format, and read selections
//! owned by others.
//!
//! The protocol state machine lives in [`lamco_selection_core`]; this
//! crate adds:
//! - [`backend`] - display server connections (X11 via x11rb, Wayland via
//!   wlr-data-control, and a headless in-process backend)
//! - [`driver`] - scheduling: a dedicated event thread or hooks for a host
//!   event loop
//! - [`clipboard`] - the [`Clipboard`] context object
//!
//! # Architecture
//!
//! ```text
//! Clipboard (start/stop/status/get/set)
//!   ├─> FetchCoordinator ─┐
//!   ├─> SelectionStore    ├─> SelectionTransport ─> X11 | Wayland | headless
//!   └─> RequestHandler  ──┘         ▲
//!                                   └── ThreadDriver or EventPump (host loop)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lamco_selection::config::Config;
//! use lamco_selection::Clipboard;
//!
//! # fn main() -> lamco_selection::clipboard::Result<()> {
//! let clipboard = Clipboard::start(&Config::default())?;
//! clipboard.set("+", &["first line", "second line"], "V")?;
//!
//! let selection = clipboard.get("*");
//! println!("{} lines ({})", selection.lines.len(), selection.code());
//! clipboard.stop()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Display server backends
pub mod backend;

/// Clipboard context and error types
pub mod clipboard;

/// Configuration
pub mod config;

/// Event loop scheduling
pub mod driver;

/// Utility functions
pub mod utils;

pub use backend::SelectionEvent;
pub use clipboard::{Clipboard, Selection};

/// Re-export the protocol core
pub use lamco_selection_core;

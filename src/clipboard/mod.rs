//! Clipboard Context
//!
//! [`Clipboard`] is the object an embedding application holds for the
//! lifetime of a session: created by [`Clipboard::start`], torn down by
//! [`Clipboard::stop`] (or on drop). Every operation goes through it; there
//! is no process-wide connection state.
//!
//! # Data Flow
//!
//! ```text
//! set(name, lines, code)                      get(name)
//!   └─> Envelope::from_lines                    └─> FetchCoordinator::fetch
//!         └─> SelectionStore::write                   ├─> owner is us: store snapshot
//!               └─> become_owner ──> server            ├─> owner is a peer: TARGETS,
//!                                                     │   best format, chunks
//!                                                     └─> Envelope::to_lines
//! ```
//!
//! `get` never fails: a missing selection, a peer that does not answer and
//! a lost connection all read as an empty selection. `set` either applies
//! completely or leaves the slot as it was.

pub mod error;

use std::sync::Arc;

use crossbeam_channel::Receiver;
use lamco_selection_core::{Envelope, FetchConfig, FetchCoordinator, RegisterType, SelectionKind};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::backend::{self, EventHub, SelectionBackend, SelectionEvent};
use crate::config::{Config, SelectionConfig};
use crate::driver::EventPump;

pub use error::{classify_error, ClipboardError, ErrorType, Result};

/// Text read from a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Lines without terminators
    pub lines: Vec<String>,
    /// Layout of the text
    pub register: RegisterType,
}

impl Selection {
    /// Nothing to paste
    pub fn empty() -> Self {
        Self {
            lines: Vec::new(),
            register: RegisterType::Char,
        }
    }

    fn from_envelope(envelope: &Envelope) -> Self {
        let (lines, register) = envelope.to_lines();
        Self { lines, register }
    }

    /// Host-side register code: `v`, `V` or Ctrl-V
    pub fn code(&self) -> &'static str {
        self.register.code().unwrap_or("v")
    }

    /// True when there are no lines
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// A selection session with one display server
pub struct Clipboard {
    backend: RwLock<Option<Box<dyn SelectionBackend>>>,
    fetcher: FetchCoordinator,
    events: EventHub,
    max_transfer_size: usize,
}

impl Clipboard {
    /// Connect to the display server chosen by `config`
    ///
    /// Fails when the configuration is invalid, no display server is
    /// reachable, or the server lacks the protocol the backend needs.
    pub fn start(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ClipboardError::Config(format!("{:#}", e)))?;

        let events = EventHub::new();
        let backend = backend::open(&config.selection, events.clone())?;
        info!(
            "Clipboard started on {} backend ({} scheduling)",
            backend.name(),
            config.selection.scheduling
        );
        Ok(Self::assemble(backend, &config.selection, events))
    }

    /// Wrap an already opened backend
    ///
    /// `events` must be the hub the backend was opened with.
    pub fn with_backend(backend: Box<dyn SelectionBackend>, config: &SelectionConfig, events: EventHub) -> Self {
        Self::assemble(backend, config, events)
    }

    fn assemble(backend: Box<dyn SelectionBackend>, config: &SelectionConfig, events: EventHub) -> Self {
        let fetcher = FetchCoordinator::new(FetchConfig {
            hop_timeout: config.fetch_timeout(),
            max_size: config.max_transfer_size,
        });
        Self {
            backend: RwLock::new(Some(backend)),
            fetcher,
            events,
            max_transfer_size: config.max_transfer_size,
        }
    }

    /// Close the connection; owned selections are handed to a clipboard
    /// manager first when one is running
    ///
    /// Calling it again is a no-op.
    pub fn stop(&self) -> Result<()> {
        let Some(mut backend) = self.backend.write().take() else {
            return Ok(());
        };
        let name = backend.name();
        backend.shutdown()?;
        info!("Clipboard stopped ({} backend)", name);
        Ok(())
    }

    /// True while the connection is alive
    pub fn status(&self) -> bool {
        self.backend.read().as_ref().is_some_and(|b| b.is_alive())
    }

    /// Name of the running backend
    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.read().as_ref().map(|b| b.name())
    }

    /// Read a selection: `*` is PRIMARY, anything else CLIPBOARD
    ///
    /// Blocks for at most a few fetch timeouts when another client owns
    /// the selection.
    pub fn get(&self, name: &str) -> Selection {
        let kind = SelectionKind::from_name(name);
        let guard = self.backend.read();
        let Some(backend) = guard.as_ref().filter(|b| b.is_alive()) else {
            debug!(selection = %kind, "Get without a running connection");
            return Selection::empty();
        };
        if !backend.supports(kind) {
            debug!(selection = %kind, "Get on unsupported selection");
            return Selection::empty();
        }

        match self.fetcher.fetch(backend.transport(), backend.store(), kind) {
            Some(envelope) => Selection::from_envelope(&envelope),
            None => Selection::empty(),
        }
    }

    /// Own a selection holding `lines`; no lines clears it
    ///
    /// `code` is the register code (`v`, `V`, Ctrl-V, or `c`/`l`/`b`);
    /// anything else lets the reader infer the layout.
    pub fn set<S: AsRef<str>>(&self, name: &str, lines: &[S], code: &str) -> Result<()> {
        let kind = SelectionKind::from_name(name);
        let guard = self.backend.read();
        let backend = guard
            .as_ref()
            .filter(|b| b.is_alive())
            .ok_or(ClipboardError::NotRunning)?;
        if !backend.supports(kind) {
            return Err(ClipboardError::UnsupportedSelection(kind));
        }

        let envelope = if lines.is_empty() {
            None
        } else {
            let envelope = Envelope::from_lines(lines, RegisterType::from_code(code));
            if envelope.len() > self.max_transfer_size {
                return Err(ClipboardError::DataSizeExceeded(envelope.len(), self.max_transfer_size));
            }
            Some(envelope)
        };

        let store = backend.store();
        let transport = backend.transport();
        let previous = (store.snapshot(kind), store.timestamp(kind));
        store.write(kind, envelope, transport.now());

        if let Err(e) = transport.become_owner(kind) {
            warn!(selection = %kind, "Failed to take ownership: {}", e);
            store.write(kind, previous.0, previous.1);
            return Err(e.into());
        }
        Ok(())
    }

    /// Receive ownership changes
    pub fn subscribe(&self) -> Receiver<SelectionEvent> {
        self.events.subscribe()
    }

    /// Hooks for driving the connection from a host event loop
    ///
    /// `None` unless the backend was opened with `scheduling = "host-loop"`.
    pub fn pump(&self) -> Option<Arc<dyn EventPump>> {
        self.backend.read().as_ref().and_then(|b| b.pump())
    }
}

impl Drop for Clipboard {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop clipboard: {}", e);
        }
    }
}

impl std::fmt::Debug for Clipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clipboard")
            .field("backend", &self.backend_name())
            .field("max_transfer_size", &self.max_transfer_size)
            .finish_non_exhaustive()
    }
}

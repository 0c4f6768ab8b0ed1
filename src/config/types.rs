//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use lamco_selection_core::{DEFAULT_MAX_SIZE, DEFAULT_TIMEOUT_MS};

/// Which display server backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Wayland when `WAYLAND_DISPLAY` is set, X11 when `DISPLAY` is set
    #[default]
    Auto,
    /// ICCCM selections over an X11 connection
    X11,
    /// wlr-data-control on a Wayland compositor
    Wayland,
    /// In-process selections, no display server
    Headless,
}

impl BackendKind {
    /// Configuration name of this backend
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::X11 => "x11",
            Self::Wayland => "wayland",
            Self::Headless => "headless",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "x11" => Ok(Self::X11),
            "wayland" => Ok(Self::Wayland),
            "headless" => Ok(Self::Headless),
            other => Err(format!("unknown backend '{}' (auto, x11, wayland, headless)", other)),
        }
    }
}

/// Who drives the display connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheduling {
    /// A dedicated event thread owned by the clipboard
    #[default]
    Thread,
    /// The embedding application polls the event pump from its own loop
    HostLoop,
}

impl fmt::Display for Scheduling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Thread => "thread",
            Self::HostLoop => "host-loop",
        })
    }
}

/// Selection engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Backend to open ("auto", "x11", "wayland", "headless")
    pub backend: BackendKind,

    /// Scheduling model ("thread", "host-loop")
    pub scheduling: Scheduling,

    /// Bound on each hop of a fetch, in milliseconds
    pub fetch_timeout_ms: u64,

    /// Declare TARGETS replies with type ATOM instead of TARGETS.
    /// Some older peers only accept ATOM.
    pub targets_reply_type_atom: bool,

    /// Largest payload accepted by `set` or a fetch, in bytes
    pub max_transfer_size: usize,

    /// Offer owned selections to a clipboard manager on stop
    pub clipboard_manager_handover: bool,

    /// How long to keep serving the clipboard manager on stop
    pub handover_timeout_ms: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            scheduling: Scheduling::Thread,
            fetch_timeout_ms: DEFAULT_TIMEOUT_MS,
            targets_reply_type_atom: true,
            max_transfer_size: DEFAULT_MAX_SIZE,
            clipboard_manager_handover: true,
            handover_timeout_ms: 1000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Output format ("pretty", "compact", "json")
    pub format: String,

    /// Log file (None = stderr only)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

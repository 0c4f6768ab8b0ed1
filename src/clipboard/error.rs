//! Clipboard Error Types
//!
//! Errors surfaced by the context API. Fetch failures never appear here:
//! reading a selection degrades to an empty result instead.

use lamco_selection_core::{SelectionError, SelectionKind};
use thiserror::Error;

/// Result type for clipboard operations
pub type Result<T> = std::result::Result<T, ClipboardError>;

/// Clipboard module error types
#[derive(Error, Debug)]
pub enum ClipboardError {
    /// Could not open or lost the display server connection
    #[error("Display connection error: {0}")]
    Connection(String),

    /// The display server lacks a required protocol extension
    #[error("Protocol not supported by the display server: {0}")]
    ProtocolUnsupported(String),

    /// No backend could be selected for this session
    #[error("No display server found: {0}")]
    NoDisplay(String),

    /// Configuration rejected before connecting
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Operation needs a running connection
    #[error("Clipboard is not running")]
    NotRunning,

    /// The backend cannot hold this selection
    #[error("Selection {0} is not supported by this backend")]
    UnsupportedSelection(SelectionKind),

    /// Data size exceeds limit
    #[error("Data size {0} exceeds maximum allowed {1}")]
    DataSizeExceeded(usize, usize),

    /// Protocol core error
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// Event loop driver failure
    #[error("Event loop error: {0}")]
    Driver(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Connection could not be established or was lost; fatal to the session
    Connection,
    /// Caller asked for something the session cannot do
    Usage,
    /// Payload rejected before any mutation
    DataValidation,
    /// Protocol or event loop failure
    Protocol,
}

/// Classify error
pub fn classify_error(error: &ClipboardError) -> ErrorType {
    match error {
        ClipboardError::Connection(_)
        | ClipboardError::ProtocolUnsupported(_)
        | ClipboardError::NoDisplay(_)
        | ClipboardError::Io(_) => ErrorType::Connection,

        ClipboardError::Config(_) | ClipboardError::NotRunning | ClipboardError::UnsupportedSelection(_) => {
            ErrorType::Usage
        }

        ClipboardError::DataSizeExceeded(_, _) => ErrorType::DataValidation,

        ClipboardError::Selection(e) if !e.is_recoverable() => ErrorType::Connection,

        ClipboardError::Selection(_) | ClipboardError::Driver(_) => ErrorType::Protocol,
    }
}

impl ClipboardError {
    /// Returns true if the session cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        classify_error(self) == ErrorType::Connection
    }
}

#[cfg(feature = "x11")]
impl From<x11rb::errors::ConnectionError> for ClipboardError {
    fn from(e: x11rb::errors::ConnectionError) -> Self {
        ClipboardError::Connection(e.to_string())
    }
}

#[cfg(feature = "x11")]
impl From<x11rb::errors::ReplyError> for ClipboardError {
    fn from(e: x11rb::errors::ReplyError) -> Self {
        match e {
            x11rb::errors::ReplyError::ConnectionError(e) => e.into(),
            // Request-level errors (a requester window vanished, a bad atom)
            // leave the connection usable
            x11rb::errors::ReplyError::X11Error(e) => {
                ClipboardError::Driver(format!("X11 error {:?} (major opcode {})", e.error_kind, e.major_opcode))
            }
        }
    }
}

#[cfg(feature = "x11")]
impl From<x11rb::errors::ReplyOrIdError> for ClipboardError {
    fn from(e: x11rb::errors::ReplyOrIdError) -> Self {
        ClipboardError::Connection(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let error = ClipboardError::Connection("refused".to_string());
        assert_eq!(classify_error(&error), ErrorType::Connection);
        assert!(error.is_fatal());

        let error = ClipboardError::NotRunning;
        assert_eq!(classify_error(&error), ErrorType::Usage);
        assert!(!error.is_fatal());

        let error = ClipboardError::UnsupportedSelection(SelectionKind::Secondary);
        assert_eq!(classify_error(&error), ErrorType::Usage);

        let error = ClipboardError::DataSizeExceeded(20, 10);
        assert_eq!(classify_error(&error), ErrorType::DataValidation);

        let error = ClipboardError::Selection(SelectionError::Timeout(1000));
        assert_eq!(classify_error(&error), ErrorType::Protocol);

        let error = ClipboardError::Selection(SelectionError::Transport("gone".to_string()));
        assert_eq!(classify_error(&error), ErrorType::Connection);
    }

    #[test]
    fn test_error_messages() {
        let error = ClipboardError::UnsupportedSelection(SelectionKind::Secondary);
        assert_eq!(
            error.to_string(),
            "Selection SECONDARY is not supported by this backend"
        );
        let error = ClipboardError::ProtocolUnsupported("wlr-data-control".to_string());
        assert!(error.to_string().contains("wlr-data-control"));
    }
}

//! Error types for selection operations.

use thiserror::Error;

/// Result type for selection operations
pub type SelectionResult<T> = std::result::Result<T, SelectionError>;

/// Errors that can occur while negotiating or converting a selection
#[derive(Error, Debug)]
pub enum SelectionError {
    /// The display server connection failed or was lost
    #[error("transport error: {0}")]
    Transport(String),

    /// Peer did not answer within the bounded wait
    #[error("no reply within {0}ms")]
    Timeout(u64),

    /// Peer explicitly refused the conversion
    #[error("conversion of {0} refused")]
    Refused(String),

    /// Request predates the current ownership and was rejected
    #[error("stale request: requester time {requester} precedes ownership time {owned}")]
    StaleRequest {
        /// Timestamp carried by the request
        requester: u32,
        /// Timestamp recorded when ownership was taken
        owned: u32,
    },

    /// Peer offers no format we can read
    #[error("no mutually supported text format")]
    NoCommonFormat,

    /// Envelope declared an encoding other than UTF-8
    #[error("envelope declares unsupported encoding {0:?}")]
    EncodingMismatch(String),

    /// Payload could not be decoded
    #[error("decode failed: {0}")]
    Decode(String),

    /// Format is not a text format we serve
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Data size exceeded maximum
    #[error("data size {actual} exceeds maximum {max}")]
    DataSizeExceeded {
        /// Actual size in bytes
        actual: usize,
        /// Maximum allowed size in bytes
        max: usize,
    },

    /// Reply did not fit the protocol step it answered
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Invalid state for operation
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classes used for diagnostics and recovery decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection could not be opened or was lost
    Connection,
    /// Peer did not answer in time
    Timeout,
    /// Format mismatch or decode failure
    Format,
    /// Peer refused, or timestamp validation failed
    Refusal,
    /// Payload too large to hold
    Allocation,
    /// Local state or protocol sequencing problem
    Internal,
}

impl SelectionError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Io(_) => ErrorKind::Connection,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::NoCommonFormat | Self::EncodingMismatch(_) | Self::Decode(_) | Self::UnsupportedFormat(_) => {
                ErrorKind::Format
            }
            Self::Refused(_) | Self::StaleRequest { .. } => ErrorKind::Refusal,
            Self::DataSizeExceeded { .. } => ErrorKind::Allocation,
            Self::Protocol(_) | Self::InvalidState(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the session survives this error
    ///
    /// Only connection failures end a session; everything else degrades a
    /// single fetch or request to "no data".
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Connection
    }

    /// Returns true if a lesser format may still succeed
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::EncodingMismatch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(SelectionError::Timeout(1000).kind(), ErrorKind::Timeout);
        assert_eq!(SelectionError::Refused("TARGETS".into()).kind(), ErrorKind::Refusal);
        assert_eq!(
            SelectionError::StaleRequest { requester: 5, owned: 10 }.kind(),
            ErrorKind::Refusal
        );
        assert_eq!(SelectionError::EncodingMismatch("latin1".into()).kind(), ErrorKind::Format);
        assert_eq!(
            SelectionError::DataSizeExceeded { actual: 2, max: 1 }.kind(),
            ErrorKind::Allocation
        );
        assert_eq!(SelectionError::Transport("gone".into()).kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_recoverability() {
        assert!(SelectionError::Timeout(1000).is_recoverable());
        assert!(SelectionError::NoCommonFormat.is_recoverable());
        assert!(!SelectionError::Transport("broken pipe".into()).is_recoverable());
        assert!(!SelectionError::Io(std::io::Error::other("eof")).is_recoverable());
    }

    #[test]
    fn test_fallback_only_on_encoding_mismatch() {
        assert!(SelectionError::EncodingMismatch("euc-jp".into()).allows_fallback());
        assert!(!SelectionError::Decode("bad".into()).allows_fallback());
        assert!(!SelectionError::Timeout(10).allows_fallback());
    }
}

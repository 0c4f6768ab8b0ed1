//! Utility Functions and Diagnostics
//!
//! Session detection and user-friendly error formatting.
//!
//! ```rust
//! use lamco_selection::utils::SessionInfo;
//!
//! let session = SessionInfo::detect();
//! if !session.has_x11() && !session.has_wayland() {
//!     println!("no display server, only the headless backend is usable");
//! }
//! ```

pub mod diagnostics;
pub mod errors;

pub use diagnostics::{log_startup_diagnostics, SessionInfo};
pub use errors::format_user_error;

//! Session Diagnostics
//!
//! Detects the display environment the process runs in and logs it at
//! startup.

use tracing::info;

/// Display environment of the current session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// `XDG_SESSION_TYPE` ("x11", "wayland", "tty")
    pub session_type: Option<String>,

    /// X11 display name from `DISPLAY`
    pub display: Option<String>,

    /// Wayland socket name from `WAYLAND_DISPLAY`
    pub wayland_display: Option<String>,

    /// `XDG_CURRENT_DESKTOP`
    pub desktop: Option<String>,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

impl SessionInfo {
    /// Read the session environment variables
    pub fn detect() -> Self {
        Self {
            session_type: non_empty_var("XDG_SESSION_TYPE"),
            display: non_empty_var("DISPLAY"),
            wayland_display: non_empty_var("WAYLAND_DISPLAY"),
            desktop: non_empty_var("XDG_CURRENT_DESKTOP"),
        }
    }

    /// True when an X server (native or XWayland) is reachable by name
    pub fn has_x11(&self) -> bool {
        self.display.is_some()
    }

    /// True when a Wayland compositor is reachable by name
    pub fn has_wayland(&self) -> bool {
        self.wayland_display.is_some()
    }

    /// Log session information
    pub fn log(&self) {
        info!("=== Session ===");
        info!("  Type: {}", self.session_type.as_deref().unwrap_or("unknown"));
        info!("  Desktop: {}", self.desktop.as_deref().unwrap_or("unknown"));
        info!("  DISPLAY: {}", self.display.as_deref().unwrap_or("(unset)"));
        info!(
            "  WAYLAND_DISPLAY: {}",
            self.wayland_display.as_deref().unwrap_or("(unset)")
        );
    }
}

/// Log complete diagnostics on startup
pub fn log_startup_diagnostics() {
    info!("=== Startup Diagnostics ===");
    SessionInfo::detect().log();

    info!("=== Build ===");
    info!("  Version: {}", env!("CARGO_PKG_VERSION"));
    info!("  Git: {} ({})", env!("GIT_HASH"), env!("BUILD_DATE"));
    info!(
        "  Backends: x11={} wayland={}",
        cfg!(feature = "x11"),
        cfg!(feature = "wayland")
    );
    #[cfg(debug_assertions)]
    info!("  Build: debug");
    #[cfg(not(debug_assertions))]
    info!("  Build: release");
}

//! User-Friendly Error Formatting
//!
//! Provides user-friendly error messages with troubleshooting hints
//! for common error scenarios.

use std::fmt::Write;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(&mut output, "ERROR").ok();
    writeln!(&mut output, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━").ok();

    let error_msg = format!("{:#}", error);

    if error_msg.contains("wlr-data-control") {
        format_data_control_error(&mut output);
    } else if error_msg.contains("WAYLAND_DISPLAY") && error_msg.contains("DISPLAY") {
        format_no_display_error(&mut output);
    } else if error_msg.contains("Wayland") || error_msg.contains("wayland") {
        format_wayland_error(&mut output);
    } else if error_msg.contains("X11") || error_msg.contains("X server") {
        format_x11_error(&mut output);
    } else if error_msg.contains("config") {
        format_config_error(&mut output);
    } else {
        format_generic_error(&mut output, &error_msg);
    }

    writeln!(&mut output).ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "  - Run with -vv for detailed logs").ok();

    output
}

fn format_no_display_error(output: &mut String) {
    writeln!(output, "No Display Server").ok();
    writeln!(output).ok();
    writeln!(output, "Neither WAYLAND_DISPLAY nor DISPLAY is set.").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Run from inside a graphical session").ok();
    writeln!(output, "     → echo $XDG_SESSION_TYPE").ok();
    writeln!(output, "  2. Over SSH, forward X11 or export DISPLAY=:0").ok();
    writeln!(output, "  3. For scripting without a display use --backend headless").ok();
}

fn format_data_control_error(output: &mut String) {
    writeln!(output, "Compositor Lacks Data Control").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "The compositor does not expose zwlr_data_control_manager_v1."
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  1. wlroots compositors (Sway, Hyprland, river) support it").ok();
    writeln!(output, "  2. KDE Plasma 6 supports it").ok();
    writeln!(output, "  3. GNOME does not; run with --backend x11 to use XWayland").ok();
}

fn format_wayland_error(output: &mut String) {
    writeln!(output, "Wayland Connection Error").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Check the compositor socket exists").ok();
    writeln!(output, "     → ls $XDG_RUNTIME_DIR/$WAYLAND_DISPLAY").ok();
    writeln!(output, "  2. XDG_RUNTIME_DIR must belong to the current user").ok();
}

fn format_x11_error(output: &mut String) {
    writeln!(output, "X11 Connection Error").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Check the X server accepts this client").ok();
    writeln!(output, "     → xhost, XAUTHORITY").ok();
    writeln!(output, "  2. Verify DISPLAY points at a running server").ok();
    writeln!(output, "     → xdpyinfo -display $DISPLAY").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Default location: ~/.config/lamco-selection/config.toml").ok();
    writeln!(output, "     → Or specify: lamco-selection -c /path/to/config.toml").ok();
    writeln!(output, "  2. Check TOML syntax and value ranges").ok();
    writeln!(output, "     → Timeouts and sizes must be greater than zero").ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Selection Error").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
}

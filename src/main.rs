//! lamco-selection - command-line selection client
//!
//! Entry point for the `lamco-selection` binary.

use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use lamco_selection::config::{BackendKind, Config, LoggingConfig};
use lamco_selection::driver::drive_async;
use lamco_selection::lamco_selection_core::{resolve_register, split_lines, RegisterType, SelectionKind};
use lamco_selection::utils::{format_user_error, SessionInfo};
use lamco_selection::{Clipboard, SelectionEvent};

/// Command-line arguments for lamco-selection
#[derive(Parser, Debug)]
#[command(name = "lamco-selection")]
#[command(version, about = "X11 and Wayland selection client", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "LAMCO_SELECTION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Display server backend (auto|x11|wayland|headless)
    #[arg(short, long, env = "LAMCO_SELECTION_BACKEND")]
    pub backend: Option<BackendKind>,

    /// Bound on each wait for another client, in milliseconds
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Write logs to file (in addition to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the content of a selection
    Get {
        /// Selection name: `*` or `primary`, `secondary`, anything else is CLIPBOARD
        #[arg(short, long, default_value = "+")]
        selection: String,

        /// Print the register code (v, V or ^V) before the text
        #[arg(short, long)]
        register: bool,
    },

    /// Own a selection and serve it until another client takes it over
    Set {
        /// Selection name
        #[arg(short, long, default_value = "+")]
        selection: String,

        /// Register code: v (characters), V (lines), b (block)
        #[arg(short, long, default_value = "v")]
        register: String,

        /// Clear the selection instead of setting it
        #[arg(long, conflicts_with = "lines")]
        clear: bool,

        /// Return right after taking ownership
        #[arg(long)]
        no_wait: bool,

        /// Lines to store; read from stdin when omitted
        lines: Vec<String>,
    },

    /// Show the display environment and whether a connection can be made
    Status,

    /// Print a selection whenever its content changes
    Watch {
        /// Selection name
        #[arg(short, long, default_value = "+")]
        selection: String,

        /// Poll interval in milliseconds
        #[arg(short, long, default_value = "500")]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_or_default(args.config.as_deref())
        .or_else(|e| {
            eprintln!("Failed to load config: {:#}, using defaults", e);
            Ok::<_, anyhow::Error>(Config::default_config())
        })?
        .with_overrides(args.backend, args.timeout_ms);

    let _log_guard = init_logging(&args, &config.logging)?;

    info!(
        "lamco-selection v{} ({} {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_DATE")
    );
    lamco_selection::utils::log_startup_diagnostics();
    debug!("Config: {:?}", config);

    if let Err(e) = run(args.command, &config).await {
        eprintln!("{}", format_user_error(&e));
        return Err(e);
    }
    Ok(())
}

async fn run(command: Command, config: &Config) -> Result<()> {
    if let Command::Status = command {
        return status(config);
    }

    let clipboard = Arc::new(Clipboard::start(config).context("Failed to start clipboard")?);

    // Host-loop scheduling: this runtime drives the connection
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let pump_task = clipboard.pump().map(|pump| {
        info!("Driving the connection from the tokio runtime");
        tokio::spawn(drive_async(pump, async move {
            let _ = stop_rx.await;
        }))
    });

    let result = match command {
        Command::Get { selection, register } => get(&clipboard, selection, register).await,
        Command::Set {
            selection,
            register,
            clear,
            no_wait,
            lines,
        } => set(&clipboard, selection, register, clear, no_wait, lines).await,
        Command::Watch {
            selection,
            interval_ms,
        } => watch(&clipboard, selection, Duration::from_millis(interval_ms)).await,
        Command::Status => Ok(()),
    };

    let stopping = Arc::clone(&clipboard);
    tokio::task::spawn_blocking(move || stopping.stop())
        .await
        .context("Stop task panicked")??;

    let _ = stop_tx.send(());
    if let Some(task) = pump_task {
        if let Err(e) = task.await.context("Event loop task panicked")? {
            warn!("Event loop ended with error: {}", e);
        }
    }

    result
}

fn status(config: &Config) -> Result<()> {
    let session = SessionInfo::detect();
    println!("Session type:    {}", session.session_type.as_deref().unwrap_or("unknown"));
    println!("DISPLAY:         {}", session.display.as_deref().unwrap_or("-"));
    println!("WAYLAND_DISPLAY: {}", session.wayland_display.as_deref().unwrap_or("-"));
    println!("Desktop:         {}", session.desktop.as_deref().unwrap_or("-"));
    println!("Backend:         {}", config.selection.backend);
    println!("Scheduling:      {}", config.selection.scheduling);

    let clipboard = Clipboard::start(config).context("Failed to start clipboard")?;
    println!(
        "Connection:      {} ({})",
        if clipboard.status() { "alive" } else { "down" },
        clipboard.backend_name().unwrap_or("none")
    );
    clipboard.stop()?;
    Ok(())
}

async fn get(clipboard: &Arc<Clipboard>, name: String, show_register: bool) -> Result<()> {
    let reader = Arc::clone(clipboard);
    let selection = tokio::task::spawn_blocking(move || reader.get(&name))
        .await
        .context("Fetch task panicked")?;

    let mut stdout = std::io::stdout().lock();
    if show_register {
        writeln!(stdout, "{}", selection.code().escape_default())?;
    }
    for line in &selection.lines {
        writeln!(stdout, "{}", line)?;
    }
    Ok(())
}

async fn set(
    clipboard: &Arc<Clipboard>,
    name: String,
    code: String,
    clear: bool,
    no_wait: bool,
    lines: Vec<String>,
) -> Result<()> {
    let (lines, code) = if clear {
        (Vec::new(), code)
    } else if lines.is_empty() {
        stdin_lines(&read_stdin()?, &code)
    } else {
        (lines, code)
    };

    let kind = SelectionKind::from_name(&name);
    let events = clipboard.subscribe();
    clipboard.set(&name, &lines, &code)?;
    info!(selection = %kind, lines = lines.len(), "Selection set");

    // Nobody else can read a headless selection, and a cleared one has nothing to serve
    if no_wait || lines.is_empty() || clipboard.backend_name() == Some("headless") {
        return Ok(());
    }

    let lost = tokio::task::spawn_blocking(move || {
        for event in events.iter() {
            if event == SelectionEvent::OwnershipLost(kind) {
                return true;
            }
        }
        false
    });

    tokio::select! {
        lost = lost => {
            if lost.context("Ownership watch panicked")? {
                info!(selection = %kind, "Another client took the selection");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
    }
    Ok(())
}

async fn watch(clipboard: &Arc<Clipboard>, name: String, interval: Duration) -> Result<()> {
    let events = clipboard.subscribe();
    let mut ticker = tokio::time::interval(interval);
    let mut last = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }

        for event in events.try_iter() {
            println!("# {:?}", event);
        }

        let reader = Arc::clone(clipboard);
        let query = name.clone();
        let selection = tokio::task::spawn_blocking(move || reader.get(&query))
            .await
            .context("Fetch task panicked")?;
        if last.as_ref() != Some(&selection) {
            println!("# {} ({} lines)", selection.code().escape_default(), selection.lines.len());
            for line in &selection.lines {
                println!("{}", line);
            }
            last = Some(selection);
        }

        if !clipboard.status() {
            warn!("Connection lost");
            return Ok(());
        }
    }
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("Reading selection text from stdin, end with Ctrl-D");
    }
    let mut data = Vec::new();
    stdin.read_to_end(&mut data).context("Failed to read stdin")?;
    Ok(data)
}

/// Lines and register code for text read from stdin
///
/// A final newline ends the last line of line-wise text instead of adding
/// an empty one.
fn stdin_lines(data: &[u8], code: &str) -> (Vec<String>, String) {
    if data.is_empty() {
        return (Vec::new(), code.to_string());
    }
    let requested = RegisterType::from_code(code);
    let (lines, register) = resolve_register(requested, split_lines(data));
    let code = match requested {
        RegisterType::Auto => register.code().unwrap_or("v"),
        _ => code,
    };
    (lines, code.to_string())
}

fn init_logging(args: &Args, logging: &LoggingConfig) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let log_level = match args.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let format = args.log_format.as_deref().unwrap_or(logging.format.as_str());

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "lamco_selection={level},lamco_selection_core={level},warn",
            level = log_level
        ))
    });

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(match format {
        "json" => tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr).boxed(),
        "compact" => tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr).boxed(),
        _ => tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
    });

    // If log file is specified, write to both stderr and file
    let log_file = args.log_file.as_ref().or(logging.file.as_ref());
    let guard = match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(directory.unwrap_or(std::path::Path::new(".")), file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(match format {
                "json" => tracing_subscriber::fmt::layer().json().with_writer(writer).with_ansi(false).boxed(),
                _ => tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false).boxed(),
            });
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry().with(layers).with(env_filter).init();

    if let Some(path) = log_file {
        info!("Logging to file: {}", path.display());
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdin_linewise_drops_final_newline() {
        let (lines, code) = stdin_lines(b"a\nb\n", "V");
        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(code, "V");
    }

    #[test]
    fn test_stdin_charwise_keeps_final_newline() {
        let (lines, code) = stdin_lines(b"a\nb\n", "v");
        assert_eq!(lines, vec!["a", "b", ""]);
        assert_eq!(code, "v");

        let (lines, _) = stdin_lines(b"a\nb", "V");
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_stdin_unknown_code_guesses_from_text() {
        assert_eq!(stdin_lines(b"one\n", "auto"), (vec!["one".to_string()], "V".to_string()));
        assert_eq!(stdin_lines(b"one", "auto"), (vec!["one".to_string()], "v".to_string()));
        assert_eq!(stdin_lines(b"", "V"), (Vec::new(), "V".to_string()));
    }

    #[test]
    fn test_stdin_block_code_kept_with_width() {
        let (lines, code) = stdin_lines(b"ab\ncd\n", "\x164");
        assert_eq!(lines, vec!["ab", "cd", ""]);
        assert_eq!(code, "\x164");
    }
}

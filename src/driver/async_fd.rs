//! tokio integration of an [`EventPump`]

use std::future::Future;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tracing::debug;

use super::{EventPump, PumpStatus};
use crate::clipboard::Result;

/// Raw descriptor borrowed from the pump for the lifetime of the driver
struct PumpFd(RawFd);

impl AsRawFd for PumpFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

const IDLE_TICK: Duration = Duration::from_secs(3600);

/// Drive `pump` from a tokio runtime until it exits or `shutdown` resolves
///
/// ```no_run
/// # async fn run(clipboard: lamco_selection::Clipboard) -> lamco_selection::clipboard::Result<()> {
/// if let Some(pump) = clipboard.pump() {
///     lamco_selection::driver::drive_async(pump, tokio::signal::ctrl_c()).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub async fn drive_async<F, T>(pump: Arc<dyn EventPump>, shutdown: F) -> Result<()>
where
    F: Future<Output = T>,
{
    let async_fd = AsyncFd::with_interest(PumpFd(pump.fd().as_raw_fd()), Interest::READABLE)?;
    tokio::pin!(shutdown);

    loop {
        pump.prepare()?;
        let tick = pump.poll_timeout().unwrap_or(IDLE_TICK);

        tokio::select! {
            _ = &mut shutdown => {
                debug!("Async driver shutting down");
                return Ok(());
            }
            guard = async_fd.readable() => {
                guard?.clear_ready();
            }
            _ = tokio::time::sleep(tick) => {}
        }

        if pump.dispatch()? == PumpStatus::Exit {
            return Ok(());
        }
    }
}

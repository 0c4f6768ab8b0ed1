//! Dedicated event thread

use std::fs::File;
use std::io::Write;
use std::os::fd::{AsFd, OwnedFd};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use tracing::{debug, error, info};

use super::{poll_timeout, EventPump, PumpStatus};
use crate::clipboard::{ClipboardError, Result};

/// Owns the thread that drives a pump until it exits or is stopped
#[derive(Debug)]
pub struct ThreadDriver {
    name: String,
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<File>,
    done: Receiver<()>,
}

impl ThreadDriver {
    /// Spawn a named thread driving `pump`
    pub fn spawn(name: &str, pump: Arc<dyn EventPump>) -> Result<Self> {
        let (stop_rx, stop_tx) = nix::unistd::pipe().map_err(std::io::Error::from)?;
        let (done_tx, done) = crossbeam_channel::bounded(1);

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if let Err(e) = run(pump.as_ref(), stop_rx) {
                    error!("Event thread failed: {}", e);
                }
                let _ = done_tx.send(());
            })?;

        info!("Started event thread {}", name);
        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
            stop_tx: Some(File::from(stop_tx)),
            done,
        })
    }

    /// True while the thread has not exited
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait up to `grace` for the pump to exit on its own, then force it
    ///
    /// Returns false if the thread had to be stopped through the stop pipe.
    pub fn stop(&mut self, grace: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let clean = self.done.recv_timeout(grace).is_ok();
        if !clean {
            debug!("Event thread {} still running after {:?}, stopping it", self.name, grace);
            if let Some(mut tx) = self.stop_tx.take() {
                let _ = tx.write_all(&[0]);
            }
        }
        if handle.join().is_err() {
            error!("Event thread {} panicked", self.name);
        }
        debug!("Event thread {} joined", self.name);
        clean
    }
}

impl Drop for ThreadDriver {
    fn drop(&mut self) {
        self.stop(Duration::ZERO);
    }
}

fn run(pump: &dyn EventPump, stop_rx: OwnedFd) -> Result<()> {
    loop {
        pump.prepare()?;

        let stop = {
            let mut fds = [
                PollFd::new(pump.fd(), PollFlags::POLLIN),
                PollFd::new(stop_rx.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, poll_timeout(pump.poll_timeout())) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(ClipboardError::Driver(format!("poll failed: {}", e))),
            }
            fds[1].any().unwrap_or(false)
        };

        if stop {
            debug!("Stop requested");
            return Ok(());
        }

        // Dispatch on timeouts too: the connection may hold queued events
        if pump.dispatch()? == PumpStatus::Exit {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::{poke, PipePump};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_exits_when_pump_exits() {
        let (pump, mut writer) = PipePump::new(b'q');
        let pump = Arc::new(pump);
        let mut driver = ThreadDriver::spawn("test-pump", pump.clone()).unwrap();

        poke(&mut writer, b'a');
        poke(&mut writer, b'q');
        assert!(driver.stop(Duration::from_secs(5)));
        assert!(pump.dispatched.load(Ordering::SeqCst) >= 1);
        assert!(!driver.is_running());
    }

    #[test]
    fn test_forced_stop() {
        let (pump, _writer) = PipePump::new(b'q');
        let mut driver = ThreadDriver::spawn("test-idle", Arc::new(pump)).unwrap();
        assert!(!driver.stop(Duration::from_millis(20)));
        assert!(driver.stop(Duration::ZERO));
    }
}

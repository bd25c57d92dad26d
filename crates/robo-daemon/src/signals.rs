//! Signal handling for graceful daemon shutdown.
//!
//! SIGTERM and SIGINT set an atomic flag that the control loop polls once
//! per iteration. Handlers only touch atomics, so they are async-signal-safe.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, info};

static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);
static SIGNAL_COUNT: AtomicU32 = AtomicU32::new(0);

/// Handle for polling shutdown requests.
#[derive(Debug, Clone, Copy)]
pub struct SignalHandler {
    _private: (),
}

impl SignalHandler {
    /// Register handlers for SIGTERM and SIGINT.
    ///
    /// On non-Unix platforms only manual shutdown is available.
    pub fn new() -> std::io::Result<Self> {
        let handler = Self { _private: () };

        #[cfg(unix)]
        register_unix_handlers()?;

        Ok(handler)
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        SHUTDOWN_FLAG.load(Ordering::Relaxed)
    }

    /// Manually request shutdown.
    pub fn request_shutdown(&self) {
        info!("Manual shutdown requested");
        SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
    }

    /// Number of termination signals received.
    pub fn signal_count(&self) -> u32 {
        SIGNAL_COUNT.load(Ordering::Relaxed)
    }
}

#[cfg(unix)]
fn register_unix_handlers() -> std::io::Result<()> {
    use std::os::raw::c_int;

    extern "C" fn terminate_handler(_: c_int) {
        SIGNAL_COUNT.fetch_add(1, Ordering::Relaxed);
        SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
    }

    for signal in [libc::SIGTERM, libc::SIGINT] {
        // SAFETY: the handler only performs atomic stores.
        let previous = unsafe { libc::signal(signal, terminate_handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }

    debug!("Unix signal handlers registered");
    Ok(())
}

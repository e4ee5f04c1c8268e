//! Process signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM raise a process-wide flag the accept loop polls
//! between accepts; SIGPIPE is ignored so a peer vanishing mid-write
//! surfaces as an `EPIPE` error instead of killing the process.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Whether a shutdown signal has been observed.
#[must_use]
pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Raises the shutdown flag; exposed for tests and signal handlers.
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Resets the flag so consecutive daemon runs in one process start clean.
pub fn reset() {
    SHUTDOWN.store(false, Ordering::SeqCst);
}

#[cfg(unix)]
#[allow(unsafe_code)]
mod platform {
    extern "C" fn on_terminate(_signal: libc::c_int) {
        super::request_shutdown();
    }

    /// Installs the SIGINT/SIGTERM handlers and ignores SIGPIPE.
    pub fn install() {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
            libc::signal(libc::SIGINT, on_terminate as libc::sighandler_t);
            libc::signal(libc::SIGTERM, on_terminate as libc::sighandler_t);
        }
    }
}

#[cfg(not(unix))]
mod platform {
    /// Signal delivery is a Unix concern; elsewhere this is a no-op.
    pub fn install() {}
}

pub use platform::install;

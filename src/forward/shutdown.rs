//! Shutdown coordination
//!
//! SIGINT/SIGTERM handlers only set an atomic flag; the forwarding loop
//! polls it each iteration and leaves Running on its own. No I/O ever
//! happens in signal context, so only one execution context touches the
//! device descriptors.

use std::sync::atomic::{AtomicBool, Ordering};

/// Global flag for shutdown requested via signal (SIGINT/SIGTERM)
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if shutdown was requested
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Set up signal handlers for graceful shutdown (call once at startup).
///
/// Handles SIGINT (Ctrl+C) and SIGTERM (systemd stop).
pub fn install_handlers() {
    unsafe {
        libc::signal(
            libc::SIGINT,
            shutdown_signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGTERM,
            shutdown_signal_handler as *const () as libc::sighandler_t,
        );
    }
}

extern "C" fn shutdown_signal_handler(_signo: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

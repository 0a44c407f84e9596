//! Gadget output endpoint
//!
//! Write side of the forwarder: the /dev/hidgN character device that
//! appears once the gadget is bound to a controller. All OS-level write
//! failures are classified into a closed set here so the forwarding loop
//! never branches on raw errno values.

use anyhow::{anyhow, Result};
use log::debug;
use nix::errno::Errno;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::constants::{ENDPOINT_RETRY_ATTEMPTS, ENDPOINT_RETRY_INTERVAL};

/// Closed classification of endpoint I/O failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoClass {
    /// EAGAIN: the endpoint cannot take a report right now
    WouldBlock,
    /// EPIPE/ESHUTDOWN: no host on the other end of the cable.
    /// An expected steady condition, not a malfunction.
    PeerGone,
    /// Anything else
    Other,
}

impl IoClass {
    pub fn of(err: &std::io::Error) -> IoClass {
        match err.raw_os_error().map(Errno::from_i32) {
            Some(Errno::EAGAIN) => IoClass::WouldBlock,
            Some(Errno::EPIPE) | Some(Errno::ESHUTDOWN) => IoClass::PeerGone,
            _ => IoClass::Other,
        }
    }
}

/// Destination for framed reports, factored out so the forwarding loop
/// can be exercised against a recording sink in tests
pub trait ReportSink {
    fn send(&mut self, report: &[u8]) -> std::io::Result<()>;
}

/// The gadget output character device, opened write-only non-blocking
pub struct GadgetEndpoint {
    file: File,
}

impl GadgetEndpoint {
    /// Open the endpoint, retrying while the node appears.
    ///
    /// The device file shows up with a short delay after controller
    /// binding; exceeding the attempt budget is a setup-fatal error.
    pub fn open(path: &Path) -> Result<GadgetEndpoint> {
        for attempt in 0..ENDPOINT_RETRY_ATTEMPTS {
            match OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)
            {
                Ok(file) => {
                    debug!("opened {} after {} attempts", path.display(), attempt + 1);
                    return Ok(GadgetEndpoint { file });
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => std::thread::sleep(ENDPOINT_RETRY_INTERVAL),
            }
        }
        Err(anyhow!(
            "gadget output {} did not appear within the retry budget",
            path.display()
        ))
    }
}

impl ReportSink for GadgetEndpoint {
    fn send(&mut self, report: &[u8]) -> std::io::Result<()> {
        // One full fixed-size report per write call
        self.file.write_all(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os_err(errno: i32) -> std::io::Error {
        std::io::Error::from_raw_os_error(errno)
    }

    #[test]
    fn test_io_classification() {
        assert_eq!(IoClass::of(&os_err(libc::EAGAIN)), IoClass::WouldBlock);
        assert_eq!(IoClass::of(&os_err(libc::EPIPE)), IoClass::PeerGone);
        assert_eq!(IoClass::of(&os_err(libc::ESHUTDOWN)), IoClass::PeerGone);
        assert_eq!(IoClass::of(&os_err(libc::EINVAL)), IoClass::Other);
        // Errors without an OS errno are never silently absorbed
        let synthetic = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(IoClass::of(&synthetic), IoClass::Other);
    }
}

//! hidraw device location and report reading
//!
//! Scans /dev/hidrawN nodes and matches one against a configured
//! vendor/product identity via HIDIOCGRAWINFO. Matched devices stay open
//! in non-blocking mode and deliver fixed-size raw reports to the
//! forwarding loop.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use crate::constants::HIDRAW_SCAN_NODES;
use crate::input::ioctl::ioctl_with_mut_arg;

/// HIDIOCGRAWINFO: read bus type and vendor/product ids of a hidraw node
const HIDIOCGRAWINFO: libc::c_ulong = 0x8008_4803;

/// Kernel `struct hidraw_devinfo`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct HidrawDevInfo {
    bustype: u32,
    vendor: i16,
    product: i16,
}

/// An open raw-input device node, read non-blocking by the forwarding loop
pub struct HidrawDevice {
    file: File,
    path: PathBuf,
}

impl HidrawDevice {
    #[cfg(test)]
    pub(crate) fn from_file(file: File, path: PathBuf) -> Self {
        Self { file, path }
    }

    /// Non-blocking read of one raw report into `buf`.
    ///
    /// Returns `Some(n)` with the number of bytes read, or `None` when no
    /// event is pending. Read errors other than would-block are logged and
    /// treated as no-event; the loop never escalates them.
    pub fn read_report(&mut self, buf: &mut [u8]) -> Option<usize> {
        match self.file.read(buf) {
            Ok(n) => Some(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => None,
            Err(e) => {
                warn!("read error on {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

/// Query bus/vendor/product metadata of an open hidraw node
fn raw_info(file: &File) -> Result<HidrawDevInfo> {
    let mut info = HidrawDevInfo::default();
    ioctl_with_mut_arg(file.as_raw_fd(), HIDIOCGRAWINFO, &mut info, "HIDIOCGRAWINFO")?;
    Ok(info)
}

/// Locate a hidraw device by vendor/product id.
///
/// Probes /dev/hidraw0 through /dev/hidraw15 and returns the first node
/// whose reported ids match, opened read/write non-blocking. Candidates
/// that cannot be opened or queried are skipped; non-matching candidates
/// are closed before returning. Returns `None` when nothing matches - the
/// caller decides whether that is fatal.
pub fn find_device(label: &str, vendor_id: u16, product_id: u16) -> Option<HidrawDevice> {
    for i in 0..HIDRAW_SCAN_NODES {
        let path = PathBuf::from(format!("/dev/hidraw{}", i));
        let file = match open_nonblocking(&path) {
            Ok(f) => f,
            Err(e) => {
                debug!("skipping {}: {:#}", path.display(), e);
                continue;
            }
        };
        let info = match raw_info(&file) {
            Ok(info) => info,
            Err(e) => {
                debug!("skipping {}: {:#}", path.display(), e);
                continue;
            }
        };
        if info.vendor as u16 == vendor_id && info.product as u16 == product_id {
            info!("Found {} at {}", label, path.display());
            return Some(HidrawDevice { file, path });
        }
        // Non-matching candidate closed here when `file` drops
    }
    None
}

fn open_nonblocking(path: &PathBuf) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .with_context(|| format!("cannot open {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devinfo_layout() {
        // Must match the kernel struct consumed by HIDIOCGRAWINFO
        assert_eq!(std::mem::size_of::<HidrawDevInfo>(), 8);
    }

    #[test]
    fn test_find_device_returns_none_for_unknown_identity() {
        // 0000:0000 never matches real hardware; scan must end cleanly
        assert!(find_device("test", 0x0000, 0x0000).is_none());
    }
}

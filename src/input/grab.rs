//! Exclusive input device capture
//!
//! Grabs an event device node with EVIOCGRAB so its events stop reaching
//! the local system while they are being forwarded. The grab is released
//! when the handle drops, so the kernel grab state can never outlive or
//! drift from the handle that represents it.

use anyhow::{Context, Result};
use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::constants::GRAB_SETTLE;
use crate::input::ioctl::ioctl_with_int_arg;

/// EVIOCGRAB: exclusive-grab control request for event devices
const EVIOCGRAB: libc::c_ulong = 0x4004_4590;

/// An exclusively grabbed event device. Dropping it releases the grab.
pub struct GrabbedDevice {
    file: File,
    path: PathBuf,
}

impl Drop for GrabbedDevice {
    fn drop(&mut self) {
        // The device may already be ungrabbed (ownership changed externally)
        if let Err(e) = ioctl_with_int_arg(self.file.as_raw_fd(), EVIOCGRAB, 0, "EVIOCGRAB(0)") {
            debug!("release of {}: {:#}", self.path.display(), e);
        } else {
            info!("Released {}", self.path.display());
        }
    }
}

/// Exclusively grab the event device at `path`.
///
/// Issues a release first (ignoring failure - the device may not be
/// grabbed by anyone) and waits out a settle window before grabbing, since
/// a grab issued immediately after a release can be rejected.
pub fn grab(path: &Path) -> Result<GrabbedDevice> {
    info!("Grabbing {}", path.display());
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("cannot open {}", path.display()))?;

    if let Err(e) = ioctl_with_int_arg(file.as_raw_fd(), EVIOCGRAB, 0, "EVIOCGRAB(0)") {
        debug!("pre-grab release of {}: {:#}", path.display(), e);
    }
    std::thread::sleep(GRAB_SETTLE);

    ioctl_with_int_arg(file.as_raw_fd(), EVIOCGRAB, 1, "EVIOCGRAB(1)")
        .with_context(|| format!("cannot grab {}", path.display()))?;

    Ok(GrabbedDevice {
        file,
        path: path.to_path_buf(),
    })
}

//! Safe wrappers for ioctl system calls
//!
//! Error-handling wrappers around the two ioctl shapes the input layer
//! needs, to keep unsafe boilerplate out of hidraw.rs and grab.rs.

use anyhow::{anyhow, Result};
use std::os::unix::io::RawFd;

/// Execute an ioctl command with an integer argument.
///
/// The caller must ensure the fd is valid and the ioctl command is
/// appropriate for the device type.
pub fn ioctl_with_int_arg(
    fd: RawFd,
    cmd: libc::c_ulong,
    arg: libc::c_int,
    cmd_name: &str,
) -> Result<()> {
    let ret = unsafe { libc::ioctl(fd, cmd, arg) };
    if ret < 0 {
        Err(anyhow!(
            "{} failed on fd {}: {}",
            cmd_name,
            fd,
            std::io::Error::last_os_error()
        ))
    } else {
        Ok(())
    }
}

/// Execute an ioctl command that fills a mutable argument.
///
/// The caller must ensure the fd is valid, the ioctl command is
/// appropriate for the device type, and the argument type matches
/// what the ioctl expects.
pub fn ioctl_with_mut_arg<T>(
    fd: RawFd,
    cmd: libc::c_ulong,
    arg: &mut T,
    cmd_name: &str,
) -> Result<()> {
    let ret = unsafe { libc::ioctl(fd, cmd, arg as *mut T) };
    if ret < 0 {
        Err(anyhow!(
            "{} failed on fd {}: {}",
            cmd_name,
            fd,
            std::io::Error::last_os_error()
        ))
    } else {
        Ok(())
    }
}

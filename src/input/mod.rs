//! Raw input device access
//!
//! - Device location over /dev/hidrawN by vendor/product identity
//! - Exclusive capture of event devices via EVIOCGRAB

pub mod grab;
pub mod hidraw;
mod ioctl;

pub use grab::{grab, GrabbedDevice};
pub use hidraw::{find_device, HidrawDevice};

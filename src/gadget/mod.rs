//! USB gadget provisioning
//!
//! Builds the device-mode configfs tree for a combined keyboard+mouse HID
//! function and binds it to a USB device controller. The tree is modelled
//! as an explicit ordered list of setup steps with a mirrored removal
//! list, so teardown can always be attempted - after full, partial or no
//! provisioning - and every removal tolerates "already absent".

pub mod configfs;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::PathBuf;

pub use configfs::{GadgetFs, SysGadgetFs};

use crate::report;

/// Gadget output character device, appears after controller binding
pub const HID_OUTPUT_PATH: &str = "/dev/hidg0";

/// configfs mount the gadget tree lives under
const CONFIGFS_ROOT: &str = "/sys/kernel/config";

/// Kernel module providing the configfs gadget framework
const GADGET_MODULE: &str = "libcomposite";

/// Identity and layout of the provisioned gadget
pub struct GadgetDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub report_desc: &'static [u8],
    pub function_name: &'static str,
    pub config_name: &'static str,
    pub serial: &'static str,
    pub manufacturer: &'static str,
    pub product: &'static str,
}

impl GadgetDescriptor {
    /// Descriptor for the forwarder gadget, advertised under the ids of
    /// the physical keyboard so the remote host sees the same identity.
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            report_desc: report::REPORT_DESCRIPTOR,
            function_name: "hid.usb0",
            config_name: "c.1",
            serial: "0123456789",
            manufacturer: "kbfwd",
            product: "Pi Keyboard/Mouse Bridge",
        }
    }
}

/// One create/write operation of the provisioning sequence
enum SetupStep {
    Dir(PathBuf),
    Text(PathBuf, String),
    Bytes(PathBuf, Vec<u8>),
    Link { target: PathBuf, link: PathBuf },
}

/// One removal operation of the teardown sequence
enum RemoveStep {
    Unbind(PathBuf),
    Link(PathBuf),
    Dir(PathBuf),
}

/// Manages the lifecycle of one gadget tree: absent -> created-and-bound
/// -> unbound-and-removed.
pub struct Gadget<F: GadgetFs> {
    fs: F,
    root: PathBuf,
    desc: GadgetDescriptor,
}

impl<F: GadgetFs> Gadget<F> {
    pub fn new(fs: F, desc: GadgetDescriptor) -> Self {
        Self::with_configfs_root(fs, PathBuf::from(CONFIGFS_ROOT), desc)
    }

    pub fn with_configfs_root(fs: F, configfs_root: PathBuf, desc: GadgetDescriptor) -> Self {
        let root = configfs_root.join("usb_gadget").join("g1");
        Self { fs, root, desc }
    }

    fn strings_dir(&self) -> PathBuf {
        self.root.join("strings").join("0x409")
    }

    fn function_dir(&self) -> PathBuf {
        self.root.join("functions").join(self.desc.function_name)
    }

    fn config_dir(&self) -> PathBuf {
        self.root.join("configs").join(self.desc.config_name)
    }

    fn config_strings_dir(&self) -> PathBuf {
        self.config_dir().join("strings").join("0x409")
    }

    fn function_link(&self) -> PathBuf {
        self.config_dir().join(self.desc.function_name)
    }

    fn udc_attr(&self) -> PathBuf {
        self.root.join("UDC")
    }

    fn setup_steps(&self) -> Vec<SetupStep> {
        use SetupStep::{Bytes, Dir, Link, Text};

        let attr = |dir: &PathBuf, name: &str, value: String| Text(dir.join(name), value);
        let root = self.root.clone();
        let strings = self.strings_dir();
        let func = self.function_dir();
        let config = self.config_dir();
        let config_strings = self.config_strings_dir();

        vec![
            // Gadget root and device descriptor
            Dir(root.clone()),
            attr(&root, "idVendor", format!("0x{:04x}", self.desc.vendor_id)),
            attr(&root, "idProduct", format!("0x{:04x}", self.desc.product_id)),
            attr(&root, "bcdDevice", "0x0001".into()),
            attr(&root, "bcdUSB", "0x0200".into()),
            attr(&root, "bDeviceClass", "0x00".into()),
            attr(&root, "bDeviceSubClass", "0x00".into()),
            attr(&root, "bDeviceProtocol", "0x00".into()),
            attr(&root, "bMaxPacketSize0", "64".into()),
            // Gadget strings
            Dir(strings.clone()),
            attr(&strings, "serialnumber", self.desc.serial.into()),
            attr(&strings, "manufacturer", self.desc.manufacturer.into()),
            attr(&strings, "product", self.desc.product.into()),
            // HID function: keyboard protocol, boot interface subclass
            Dir(func.clone()),
            attr(&func, "protocol", "1".into()),
            attr(&func, "subclass", "1".into()),
            attr(&func, "report_length", "16".into()),
            Bytes(func.join("report_desc"), self.desc.report_desc.to_vec()),
            // Configuration with power budget
            Dir(config.clone()),
            attr(&config, "MaxPower", "250".into()),
            Dir(config_strings.clone()),
            attr(&config_strings, "configuration", "1xHID".into()),
            // Expose the function in the configuration
            Link {
                target: func,
                link: self.function_link(),
            },
        ]
    }

    fn remove_steps(&self) -> Vec<RemoveStep> {
        use RemoveStep::{Dir, Link, Unbind};
        vec![
            Unbind(self.udc_attr()),
            Link(self.function_link()),
            Dir(self.config_strings_dir()),
            Dir(self.config_dir()),
            Dir(self.function_dir()),
            Dir(self.strings_dir()),
            Dir(self.root.clone()),
        ]
    }

    /// Create the gadget tree and bind it to the first available UDC.
    ///
    /// Returns the bound controller name. On failure the partially built
    /// tree is left in place for [`Gadget::teardown`] to clean up.
    pub fn provision(&self) -> Result<String> {
        if let Err(e) = self.fs.load_module(GADGET_MODULE) {
            warn!("could not load {}: {:#}", GADGET_MODULE, e);
        }

        for step in self.setup_steps() {
            match step {
                SetupStep::Dir(path) => self.fs.mkdir_all(&path)?,
                SetupStep::Text(path, value) => self.fs.write_text(&path, &value)?,
                SetupStep::Bytes(path, value) => self.fs.write_bytes(&path, &value)?,
                SetupStep::Link { target, link } => {
                    // Left over from an earlier unclean shutdown
                    if !self.fs.exists(&link) {
                        self.fs.symlink(&target, &link)?;
                    }
                }
            }
        }

        let udc = self
            .fs
            .list_udcs()
            .into_iter()
            .next()
            .context("no UDC found - is this machine in USB device mode?")?;
        self.fs.write_text(&self.udc_attr(), &udc)?;
        info!("USB gadget enabled on UDC {}", udc);
        Ok(udc)
    }

    /// Unbind and remove the gadget tree, in reverse provisioning order.
    ///
    /// Safe to call after zero, partial or full provisioning, and safe to
    /// call repeatedly; removal of already-absent state is a no-op.
    pub fn teardown(&self) {
        for step in self.remove_steps() {
            match step {
                RemoveStep::Unbind(path) => {
                    if self.fs.exists(&path) {
                        if let Err(e) = self.fs.write_text(&path, "") {
                            debug!("UDC unbind: {:#}", e);
                        }
                    }
                }
                RemoveStep::Link(path) => {
                    if let Err(e) = self.fs.remove_link(&path) {
                        debug!("teardown unlink: {:#}", e);
                    }
                }
                RemoveStep::Dir(path) => {
                    if let Err(e) = self.fs.remove_dir(&path) {
                        debug!("teardown rmdir: {:#}", e);
                    }
                }
            }
        }
        info!("USB gadget removed");
    }
}

#[cfg(test)]
mod tests {
    use super::configfs::fake::MemGadgetFs;
    use super::*;

    fn test_gadget(fs: MemGadgetFs) -> Gadget<MemGadgetFs> {
        Gadget::with_configfs_root(fs, PathBuf::from("/cfg"), GadgetDescriptor::new(0x04d9, 0x0007))
    }

    #[test]
    fn test_provision_writes_descriptor_tree() {
        let gadget = test_gadget(MemGadgetFs::with_udc("20980000.usb"));
        let udc = gadget.provision().unwrap();
        assert_eq!(udc, "20980000.usb");

        let state = gadget.fs.state.borrow();
        let file = |p: &str| String::from_utf8(state.files[&PathBuf::from(p)].clone()).unwrap();
        assert_eq!(file("/cfg/usb_gadget/g1/idVendor"), "0x04d9");
        assert_eq!(file("/cfg/usb_gadget/g1/idProduct"), "0x0007");
        assert_eq!(file("/cfg/usb_gadget/g1/functions/hid.usb0/protocol"), "1");
        assert_eq!(file("/cfg/usb_gadget/g1/functions/hid.usb0/subclass"), "1");
        assert_eq!(file("/cfg/usb_gadget/g1/configs/c.1/MaxPower"), "250");
        assert_eq!(file("/cfg/usb_gadget/g1/UDC"), "20980000.usb");
        assert_eq!(state.loaded_modules, vec!["libcomposite".to_string()]);
        assert!(state
            .links
            .contains_key(&PathBuf::from("/cfg/usb_gadget/g1/configs/c.1/hid.usb0")));
    }

    #[test]
    fn test_report_descriptor_roundtrip() {
        let gadget = test_gadget(MemGadgetFs::with_udc("udc0"));
        gadget.provision().unwrap();
        let written = gadget
            .fs
            .read_bytes(&PathBuf::from("/cfg/usb_gadget/g1/functions/hid.usb0/report_desc"))
            .unwrap();
        assert_eq!(written, report::REPORT_DESCRIPTOR);
    }

    #[test]
    fn test_provision_skips_existing_link() {
        let gadget = test_gadget(MemGadgetFs::with_udc("udc0"));
        gadget.provision().unwrap();
        // A second provision run must not fail on the existing symlink
        gadget.provision().unwrap();
    }

    #[test]
    fn test_no_udc_fails_and_teardown_cleans_partial_tree() {
        let gadget = test_gadget(MemGadgetFs::without_udc());
        assert!(gadget.provision().is_err());
        assert!(!gadget.fs.state.borrow().is_empty());

        gadget.teardown();
        assert!(gadget.fs.state.borrow().is_empty());
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let gadget = test_gadget(MemGadgetFs::with_udc("udc0"));
        gadget.provision().unwrap();

        gadget.teardown();
        assert!(gadget.fs.state.borrow().is_empty());
        // Second teardown of an absent tree is a no-op, not an error
        gadget.teardown();
        assert!(gadget.fs.state.borrow().is_empty());
    }

    #[test]
    fn test_teardown_without_provision_is_a_noop() {
        let gadget = test_gadget(MemGadgetFs::with_udc("udc0"));
        gadget.teardown();
        assert!(gadget.fs.state.borrow().is_empty());
    }
}

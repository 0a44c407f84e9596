//! Narrow capability interface over the gadget configfs tree
//!
//! The provisioner only ever needs directory create/remove, attribute
//! writes, one symlink, UDC enumeration and a best-effort module load.
//! Keeping those behind a trait lets the provision/teardown sequences run
//! against an in-memory fake in tests.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Filesystem-level operations the gadget tree is built from
pub trait GadgetFs {
    fn mkdir_all(&self, path: &Path) -> Result<()>;
    fn write_text(&self, path: &Path, value: &str) -> Result<()>;
    fn write_bytes(&self, path: &Path, value: &[u8]) -> Result<()>;
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>>;
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    /// Remove an empty directory; absent is fine
    fn remove_dir(&self, path: &Path) -> Result<()>;
    /// Remove a symlink; absent is fine
    fn remove_link(&self, path: &Path) -> Result<()>;
    /// Enumerate available USB device controllers
    fn list_udcs(&self) -> Vec<String>;
    /// Best-effort kernel module load
    fn load_module(&self, name: &str) -> Result<()>;
}

/// Real configfs/sysfs implementation
pub struct SysGadgetFs {
    udc_class: PathBuf,
}

impl SysGadgetFs {
    pub fn new() -> Self {
        Self {
            udc_class: PathBuf::from("/sys/class/udc"),
        }
    }
}

impl Default for SysGadgetFs {
    fn default() -> Self {
        Self::new()
    }
}

impl GadgetFs for SysGadgetFs {
    fn mkdir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).with_context(|| format!("mkdir {}", path.display()))
    }

    fn write_text(&self, path: &Path, value: &str) -> Result<()> {
        std::fs::write(path, value).with_context(|| format!("write {}", path.display()))
    }

    fn write_bytes(&self, path: &Path, value: &[u8]) -> Result<()> {
        std::fs::write(path, value).with_context(|| format!("write {}", path.display()))
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("read {}", path.display()))
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        std::os::unix::fs::symlink(target, link)
            .with_context(|| format!("link {} -> {}", link.display(), target.display()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        match std::fs::remove_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("rmdir {}", path.display())),
        }
    }

    fn remove_link(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("unlink {}", path.display())),
        }
    }

    fn list_udcs(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.udc_class) else {
            return Vec::new();
        };
        let mut udcs: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        udcs.sort();
        udcs
    }

    fn load_module(&self, name: &str) -> Result<()> {
        Command::new("modprobe")
            .arg(name)
            .status()
            .with_context(|| format!("modprobe {}", name))?;
        Ok(())
    }
}

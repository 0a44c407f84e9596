//! Configuration
//!
//! Per-model device identity presets, an optional TOML config file, and
//! command-line overrides, resolved once at startup into a plain
//! immutable [`ForwarderConfig`]. Precedence: command line > config file
//! > model preset.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Identity of one physical input device: ids to scan for, event node to
/// grab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_path: PathBuf,
}

/// Fully resolved configuration consumed by the forwarding core
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub model: Model,
    pub keyboard: DeviceIdentity,
    pub mouse: DeviceIdentity,
    /// false = test mode without gadget output
    pub usb_output: bool,
    /// Per-event hex echo on the console
    pub echo_events: bool,
}

/// Supported machine models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Pi400,
    Pi500,
    Pi500Plus,
}

impl Model {
    pub fn label(self) -> &'static str {
        match self {
            Model::Pi400 => "Pi 400",
            Model::Pi500 => "Pi 500",
            Model::Pi500Plus => "Pi 500+",
        }
    }

    fn from_name(name: &str) -> Option<Model> {
        match name {
            "pi400" => Some(Model::Pi400),
            "pi500" => Some(Model::Pi500),
            "pi500plus" => Some(Model::Pi500Plus),
            _ => None,
        }
    }

    /// Built-in (keyboard, mouse) identities for this model
    fn preset(self) -> (DeviceIdentity, DeviceIdentity) {
        let mouse = DeviceIdentity {
            vendor_id: 0x093a,
            product_id: 0x2510,
            device_path: PathBuf::from("/dev/input/by-id/usb-PixArt_USB_Optical_Mouse-event-mouse"),
        };
        match self {
            Model::Pi400 => (
                DeviceIdentity {
                    vendor_id: 0x04d9,
                    product_id: 0x0007,
                    device_path: PathBuf::from(
                        "/dev/input/by-id/usb-_Raspberry_Pi_Internal_Keyboard-event-kbd",
                    ),
                },
                mouse,
            ),
            Model::Pi500 => (
                DeviceIdentity {
                    vendor_id: 0x2e8a,
                    product_id: 0x0010,
                    device_path: PathBuf::from(
                        "/dev/input/by-id/usb-Raspberry_Pi_Ltd_Pi_500_Keyboard-event-kbd",
                    ),
                },
                mouse,
            ),
            // TODO: fill in real ids and by-id paths once Pi 500+ units are
            // available; until then this model needs explicit overrides.
            Model::Pi500Plus => (
                DeviceIdentity {
                    vendor_id: 0x0000,
                    product_id: 0x0000,
                    device_path: PathBuf::from("/dev/input/by-id/PLACEHOLDER"),
                },
                DeviceIdentity {
                    vendor_id: 0x0000,
                    product_id: 0x0000,
                    device_path: PathBuf::from("/dev/input/by-id/PLACEHOLDER"),
                },
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown option '{0}' (try --help)")]
    UnknownOption(String),
    #[error("unknown model '{0}' (expected pi400, pi500 or pi500plus)")]
    UnknownModel(String),
    #[error("invalid id '{0}': expected hex (0x04d9) or decimal")]
    InvalidId(String),
    #[error("cannot read config file {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {}: {source}", path.display())]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Per-device fields of the config file; all optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceOverride {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub device: Option<PathBuf>,
}

/// Optional TOML config file contents
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub model: Option<String>,
    pub keyboard: DeviceOverride,
    pub mouse: DeviceOverride,
}

/// What the command line asked for
pub enum CliRequest {
    Run(ForwarderConfig),
    Help,
    Version,
}

/// Parse the command line (and any referenced config file) into a
/// resolved configuration
pub fn parse_args(args: &[String]) -> Result<CliRequest, ConfigError> {
    let mut model: Option<Model> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut keyboard = DeviceOverride::default();
    let mut mouse = DeviceOverride::default();
    let mut no_usb = false;
    let mut hide_events = false;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliRequest::Help),
            "--version" | "-V" => return Ok(CliRequest::Version),
            "--pi400" => model = Some(Model::Pi400),
            "--pi500" => model = Some(Model::Pi500),
            "--pi500plus" => model = Some(Model::Pi500Plus),
            "--no-usb" => no_usb = true,
            "--hide-events" => hide_events = true,
            other => {
                if let Some(v) = other.strip_prefix("--config=") {
                    config_path = Some(PathBuf::from(v));
                } else if let Some(v) = other.strip_prefix("--keyboard-vid=") {
                    keyboard.vendor_id = Some(parse_id(v)?);
                } else if let Some(v) = other.strip_prefix("--keyboard-pid=") {
                    keyboard.product_id = Some(parse_id(v)?);
                } else if let Some(v) = other.strip_prefix("--keyboard-dev=") {
                    keyboard.device = Some(PathBuf::from(v));
                } else if let Some(v) = other.strip_prefix("--mouse-vid=") {
                    mouse.vendor_id = Some(parse_id(v)?);
                } else if let Some(v) = other.strip_prefix("--mouse-pid=") {
                    mouse.product_id = Some(parse_id(v)?);
                } else if let Some(v) = other.strip_prefix("--mouse-dev=") {
                    mouse.device = Some(PathBuf::from(v));
                } else {
                    return Err(ConfigError::UnknownOption(other.to_string()));
                }
            }
        }
    }

    let file = match config_path {
        Some(path) => load_file(&path)?,
        None => FileConfig::default(),
    };

    let config = resolve(model, &file, &keyboard, &mouse, no_usb, hide_events)?;
    Ok(CliRequest::Run(config))
}

/// Apply precedence: CLI > file > preset
fn resolve(
    cli_model: Option<Model>,
    file: &FileConfig,
    cli_keyboard: &DeviceOverride,
    cli_mouse: &DeviceOverride,
    no_usb: bool,
    hide_events: bool,
) -> Result<ForwarderConfig, ConfigError> {
    let file_model = match file.model.as_deref() {
        Some(name) => {
            Some(Model::from_name(name).ok_or_else(|| ConfigError::UnknownModel(name.to_string()))?)
        }
        None => None,
    };
    let model = cli_model.or(file_model).unwrap_or(Model::Pi400);
    let (kb_preset, mouse_preset) = model.preset();

    Ok(ForwarderConfig {
        model,
        keyboard: merge_device(kb_preset, &file.keyboard, cli_keyboard),
        mouse: merge_device(mouse_preset, &file.mouse, cli_mouse),
        usb_output: !no_usb,
        echo_events: !hide_events,
    })
}

fn merge_device(
    preset: DeviceIdentity,
    file: &DeviceOverride,
    cli: &DeviceOverride,
) -> DeviceIdentity {
    DeviceIdentity {
        vendor_id: cli.vendor_id.or(file.vendor_id).unwrap_or(preset.vendor_id),
        product_id: cli
            .product_id
            .or(file.product_id)
            .unwrap_or(preset.product_id),
        device_path: cli
            .device
            .clone()
            .or_else(|| file.device.clone())
            .unwrap_or(preset.device_path),
    }
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a vendor/product id, hex ("0x04d9") or decimal ("1241")
fn parse_id(s: &str) -> Result<u16, ConfigError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| ConfigError::InvalidId(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("kbfwd")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("0x04d9").unwrap(), 0x04d9);
        assert_eq!(parse_id("1241").unwrap(), 1241);
        assert!(parse_id("notanid").is_err());
        assert!(parse_id("0x10000").is_err());
    }

    #[test]
    fn test_default_model_is_pi400() {
        let CliRequest::Run(config) = parse_args(&args(&[])).unwrap() else {
            panic!("expected run request");
        };
        assert_eq!(config.model, Model::Pi400);
        assert_eq!(config.keyboard.vendor_id, 0x04d9);
        assert_eq!(config.keyboard.product_id, 0x0007);
        assert_eq!(config.mouse.vendor_id, 0x093a);
        assert!(config.usb_output);
        assert!(config.echo_events);
    }

    #[test]
    fn test_model_preset_and_flags() {
        let CliRequest::Run(config) =
            parse_args(&args(&["--pi500", "--no-usb", "--hide-events"])).unwrap()
        else {
            panic!("expected run request");
        };
        assert_eq!(config.model, Model::Pi500);
        assert_eq!(config.keyboard.vendor_id, 0x2e8a);
        assert!(!config.usb_output);
        assert!(!config.echo_events);
    }

    #[test]
    fn test_cli_overrides_beat_preset() {
        let CliRequest::Run(config) = parse_args(&args(&[
            "--keyboard-vid=0x1234",
            "--keyboard-dev=/dev/input/event9",
        ]))
        .unwrap() else {
            panic!("expected run request");
        };
        assert_eq!(config.keyboard.vendor_id, 0x1234);
        assert_eq!(config.keyboard.product_id, 0x0007);
        assert_eq!(
            config.keyboard.device_path,
            PathBuf::from("/dev/input/event9")
        );
    }

    #[test]
    fn test_file_config_precedence() {
        let file: FileConfig = toml::from_str(
            r#"
            model = "pi500"

            [keyboard]
            vendor_id = 0x1111
            product_id = 0x2222
            "#,
        )
        .unwrap();
        let cli_kb = DeviceOverride {
            vendor_id: Some(0x3333),
            ..Default::default()
        };
        let config = resolve(None, &file, &cli_kb, &DeviceOverride::default(), false, false)
            .unwrap();

        assert_eq!(config.model, Model::Pi500);
        // CLI wins over file, file wins over preset
        assert_eq!(config.keyboard.vendor_id, 0x3333);
        assert_eq!(config.keyboard.product_id, 0x2222);
        assert_eq!(config.mouse.vendor_id, 0x093a);
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        assert!(matches!(
            parse_args(&args(&["--bogus"])),
            Err(ConfigError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_unknown_model_in_file_is_rejected() {
        let file = FileConfig {
            model: Some("pi9000".into()),
            ..Default::default()
        };
        let result = resolve(
            None,
            &file,
            &DeviceOverride::default(),
            &DeviceOverride::default(),
            false,
            false,
        );
        assert!(matches!(result, Err(ConfigError::UnknownModel(_))));
    }
}

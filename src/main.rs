//! kbfwd - forward the built-in keyboard and mouse to a USB host
//!
//! Turns a Pi 400/500 class machine into a USB keyboard+mouse for a second
//! computer attached to its USB-C port.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 Forwarding Loop                  │
//! ├──────────────────────────────────────────────────┤
//! │  /dev/hidrawN ──read──► re-frame ──write──► /dev/hidg0
//! │       ▲                                      ▲   │
//! │  EVIOCGRAB capture                 configfs gadget
//! │  (event nodes)                (provision/teardown)
//! └──────────────────────────────────────────────────┘
//! ```

mod config;
mod constants;
mod forward;
mod gadget;
mod input;
mod report;

use anyhow::{bail, Context, Result};
use log::warn;
use std::path::Path;

use config::{CliRequest, ForwarderConfig};
use forward::{ForwardDevice, Forwarder, GadgetEndpoint};
use gadget::{Gadget, GadgetDescriptor, SysGadgetFs};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let config = match config::parse_args(&args) {
        Ok(CliRequest::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliRequest::Version) => {
            println!("kbfwd {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Ok(CliRequest::Run(config)) => config,
        Err(e) => return Err(e.into()),
    };

    // Device grabbing, hidraw access and the configfs tree all need root
    if !nix::unistd::Uid::effective().is_root() {
        bail!("kbfwd must run as root (try: sudo kbfwd)");
    }

    println!("Using {} configuration", config.model.label());
    forward::shutdown::install_handlers();
    run(&config)
}

fn run(config: &ForwarderConfig) -> Result<()> {
    let keyboard = input::find_device(
        "keyboard",
        config.keyboard.vendor_id,
        config.keyboard.product_id,
    );
    if keyboard.is_none() {
        warn!("could not locate the keyboard device");
    }
    let mouse = input::find_device("mouse", config.mouse.vendor_id, config.mouse.product_id);
    if mouse.is_none() {
        warn!("could not locate the mouse device");
    }
    if keyboard.is_none() && mouse.is_none() {
        bail!("no matching input devices, nothing to forward");
    }

    let keyboard = keyboard.map(|h| ForwardDevice::new(h, config.keyboard.device_path.clone()));
    let mouse = mouse.map(|h| ForwardDevice::new(h, config.mouse.device_path.clone()));

    // The gadget lands in `gadget` before provisioning starts, so teardown
    // runs even when provisioning or the endpoint open fails partway.
    let mut gadget = None;
    let result = setup_and_forward(config, keyboard, mouse, &mut gadget);
    if let Some(g) = &gadget {
        g.teardown();
    }
    result
}

fn setup_and_forward(
    config: &ForwarderConfig,
    keyboard: Option<ForwardDevice>,
    mouse: Option<ForwardDevice>,
    gadget: &mut Option<Gadget<SysGadgetFs>>,
) -> Result<()> {
    let output = if config.usb_output {
        let descriptor =
            GadgetDescriptor::new(config.keyboard.vendor_id, config.keyboard.product_id);
        let g = gadget.insert(Gadget::new(SysGadgetFs::new(), descriptor));
        g.provision().context("failed to provision USB gadget")?;
        Some(GadgetEndpoint::open(Path::new(gadget::HID_OUTPUT_PATH))?)
    } else {
        None
    };

    let mut forwarder = Forwarder::new(keyboard, mouse, output, config.echo_events);
    forwarder.run();
    Ok(())
}

fn print_help() {
    println!("kbfwd - forward the built-in keyboard and mouse to a USB host");
    println!();
    println!("Usage: sudo kbfwd [OPTIONS]");
    println!();
    println!("Model presets (default: --pi400):");
    println!("  --pi400                 Pi 400 internal keyboard + PixArt mouse");
    println!("  --pi500                 Pi 500 internal keyboard + PixArt mouse");
    println!("  --pi500plus             Pi 500+ (needs explicit overrides for now)");
    println!();
    println!("Device overrides (hex or decimal ids):");
    println!("  --keyboard-vid=ID --keyboard-pid=ID --keyboard-dev=PATH");
    println!("  --mouse-vid=ID    --mouse-pid=ID    --mouse-dev=PATH");
    println!();
    println!("Options:");
    println!("  --config=PATH           TOML config file (CLI flags win over it)");
    println!("  --no-usb                Test mode: read and echo events, no gadget output");
    println!("  --hide-events           Suppress the per-event hex echo");
    println!("  -h, --help              Show this help");
    println!("  -V, --version           Show version");
    println!();
    println!("While running: Ctrl+GUI toggles capture, Ctrl+Shift+GUI exits.");
}

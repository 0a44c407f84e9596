//! Forwarding loop
//!
//! The run-to-completion engine: reads raw reports from the captured
//! devices, re-encodes them for the gadget endpoint, and drives the
//! Idle -> Running -> Stopping lifecycle including the unconditional
//! cleanup that releases capture and parks the remote host on neutral
//! reports.
//!
//! Single-threaded cooperative polling: keyboard and mouse are serviced
//! in a fixed round-robin order per tick, all I/O is non-blocking, and
//! the only asynchronous influence is the shutdown flag set from signal
//! context.

pub mod endpoint;
pub mod shutdown;

use log::{debug, info, trace, warn};
use std::path::PathBuf;

use crate::constants::{POLL_INTERVAL, WRITE_PACING};
use crate::input::{grab, GrabbedDevice, HidrawDevice};
use crate::report;
use crate::report::{KEYBOARD_REPORT_SIZE, MOUSE_REPORT_SIZE};

pub use endpoint::{GadgetEndpoint, IoClass, ReportSink};

/// Lifecycle state of the forwarding loop. Stopping is terminal and
/// drives cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
}

/// What a keyboard modifier byte asks the loop to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HotkeyAction {
    None,
    ToggleCapture,
    Exit,
}

fn hotkey_action(modifiers: u8) -> HotkeyAction {
    if modifiers == report::EXIT_CHORD.bits() {
        HotkeyAction::Exit
    } else if modifiers == report::CAPTURE_TOGGLE_CHORD.bits() {
        HotkeyAction::ToggleCapture
    } else {
        HotkeyAction::None
    }
}

/// One physical device being forwarded: the hidraw node reports are read
/// from, and the event node that gets exclusively grabbed
pub struct ForwardDevice {
    hidraw: HidrawDevice,
    event_path: PathBuf,
    grab: Option<GrabbedDevice>,
}

impl ForwardDevice {
    pub fn new(hidraw: HidrawDevice, event_path: PathBuf) -> Self {
        Self {
            hidraw,
            event_path,
            grab: None,
        }
    }
}

/// The forwarding engine. Owns every descriptor for its lifetime;
/// dropping the fields on cleanup is what closes them.
pub struct Forwarder<S: ReportSink> {
    keyboard: Option<ForwardDevice>,
    mouse: Option<ForwardDevice>,
    output: Option<S>,
    echo_events: bool,
    captured: bool,
    state: RunState,
}

impl<S: ReportSink> Forwarder<S> {
    pub fn new(
        keyboard: Option<ForwardDevice>,
        mouse: Option<ForwardDevice>,
        output: Option<S>,
        echo_events: bool,
    ) -> Self {
        Self {
            keyboard,
            mouse,
            output,
            echo_events,
            captured: false,
            state: RunState::Idle,
        }
    }

    /// Run until the exit hotkey or a termination signal, then clean up.
    pub fn run(&mut self) {
        self.grab_devices();
        self.state = RunState::Running;
        let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]);
        println!("Running - Ctrl+GUI toggles capture, Ctrl+Shift+GUI exits");

        while self.state == RunState::Running {
            if shutdown::shutdown_requested() {
                info!("Received termination signal, shutting down...");
                self.state = RunState::Stopping;
                break;
            }
            self.tick();
            std::thread::sleep(POLL_INTERVAL);
        }

        self.finish();
    }

    /// Service both devices once, keyboard first
    fn tick(&mut self) {
        self.service_keyboard();
        if self.state != RunState::Running {
            // Exit hotkey: no further input is serviced this tick
            return;
        }
        self.service_mouse();
    }

    fn service_keyboard(&mut self) {
        let Some(dev) = self.keyboard.as_mut() else {
            return;
        };
        let mut raw = [0u8; KEYBOARD_REPORT_SIZE];
        let Some(n) = dev.hidraw.read_report(&mut raw) else {
            return;
        };
        if n != KEYBOARD_REPORT_SIZE {
            trace!("discarding short keyboard read ({} bytes)", n);
            return;
        }
        self.handle_keyboard_report(&raw);
    }

    fn service_mouse(&mut self) {
        let Some(dev) = self.mouse.as_mut() else {
            return;
        };
        let mut raw = [0u8; MOUSE_REPORT_SIZE];
        let Some(n) = dev.hidraw.read_report(&mut raw) else {
            return;
        };
        if n != MOUSE_REPORT_SIZE {
            trace!("discarding short mouse read ({} bytes)", n);
            return;
        }
        self.handle_mouse_report(&raw);
    }

    fn handle_keyboard_report(&mut self, raw: &[u8; KEYBOARD_REPORT_SIZE]) {
        if self.echo_events {
            println!("K: {}", report::hex_dump(raw));
        }
        self.forward(&report::keyboard_report(raw));

        // Only the keyboard carries the reserved hotkey chords
        match hotkey_action(raw[0]) {
            HotkeyAction::ToggleCapture => self.toggle_capture(),
            HotkeyAction::Exit => {
                info!("Exit hotkey pressed");
                self.state = RunState::Stopping;
            }
            HotkeyAction::None => {}
        }
    }

    fn handle_mouse_report(&mut self, raw: &[u8; MOUSE_REPORT_SIZE]) {
        if self.echo_events {
            println!("M: {}", report::hex_dump(raw));
        }
        self.forward(&report::mouse_report(raw));
    }

    /// Write one framed report to the gadget endpoint, if capture is on
    fn forward(&mut self, wire: &[u8]) {
        if !self.captured {
            return;
        }
        let Some(out) = self.output.as_mut() else {
            return;
        };
        match out.send(wire) {
            Ok(()) => std::thread::sleep(WRITE_PACING),
            Err(e) => match IoClass::of(&e) {
                // No host connected: expected steady condition
                IoClass::WouldBlock | IoClass::PeerGone => {}
                IoClass::Other => warn!("error writing report: {}", e),
            },
        }
    }

    fn toggle_capture(&mut self) {
        if self.captured {
            self.release_devices();
            self.send_neutral_reports();
        } else {
            self.grab_devices();
        }
    }

    /// Grab whichever devices exist. Capture counts as enabled when at
    /// least one grab succeeded.
    fn grab_devices(&mut self) {
        info!("Grabbing keyboard and/or mouse");
        for dev in [&mut self.keyboard, &mut self.mouse].into_iter().flatten() {
            match grab(&dev.event_path) {
                Ok(g) => dev.grab = Some(g),
                Err(e) => warn!("{:#}", e),
            }
        }
        self.captured = self.keyboard.as_ref().is_some_and(|d| d.grab.is_some())
            || self.mouse.as_ref().is_some_and(|d| d.grab.is_some());
    }

    fn release_devices(&mut self) {
        info!("Releasing keyboard and/or mouse");
        for dev in [&mut self.keyboard, &mut self.mouse].into_iter().flatten() {
            // Dropping the handle releases the kernel grab
            dev.grab = None;
        }
        self.captured = false;
    }

    /// Park the remote host on "all keys and buttons up", best-effort
    fn send_neutral_reports(&mut self) {
        let Some(out) = self.output.as_mut() else {
            return;
        };
        if self.keyboard.is_some() {
            if let Err(e) = out.send(&report::neutral_keyboard_report()) {
                log_neutral_error("keyboard", &e);
            }
        }
        if self.mouse.is_some() {
            if let Err(e) = out.send(&report::neutral_mouse_report()) {
                log_neutral_error("mouse", &e);
            }
        }
    }

    /// Stopping -> terminated: release capture, park the host on neutral
    /// reports, close every descriptor. Runs exactly once; no step is
    /// skipped when an earlier one fails.
    fn finish(&mut self) {
        let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
        self.release_devices();
        self.send_neutral_reports();
        self.keyboard = None;
        self.mouse = None;
        self.output = None;
    }
}

fn log_neutral_error(label: &str, e: &std::io::Error) {
    match IoClass::of(e) {
        IoClass::WouldBlock | IoClass::PeerGone => {
            debug!("{} neutral report not delivered (no host)", label)
        }
        IoClass::Other => warn!("error writing {} neutral report: {}", label, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<Vec<u8>>,
        fail_errno: Option<i32>,
    }

    impl ReportSink for RecordingSink {
        fn send(&mut self, report: &[u8]) -> std::io::Result<()> {
            if let Some(errno) = self.fail_errno {
                return Err(std::io::Error::from_raw_os_error(errno));
            }
            self.sent.push(report.to_vec());
            Ok(())
        }
    }

    /// Device backed by /dev/null: reads are instant EOF (short read),
    /// the event path does not exist so grabs fail fast
    fn null_device() -> ForwardDevice {
        let file = File::open("/dev/null").unwrap();
        ForwardDevice::new(
            HidrawDevice::from_file(file, PathBuf::from("/dev/null")),
            PathBuf::from("/nonexistent/event0"),
        )
    }

    fn test_forwarder() -> Forwarder<RecordingSink> {
        let mut fw = Forwarder::new(
            Some(null_device()),
            Some(null_device()),
            Some(RecordingSink::default()),
            false,
        );
        fw.state = RunState::Running;
        fw
    }

    fn sent(fw: &Forwarder<RecordingSink>) -> &[Vec<u8>] {
        &fw.output.as_ref().unwrap().sent
    }

    #[test]
    fn test_hotkey_decoding() {
        assert_eq!(hotkey_action(0x09), HotkeyAction::ToggleCapture);
        assert_eq!(hotkey_action(0x0b), HotkeyAction::Exit);
        assert_eq!(hotkey_action(0x00), HotkeyAction::None);
        // Plain Ctrl+Shift is not a chord
        assert_eq!(hotkey_action(0x03), HotkeyAction::None);
    }

    #[test]
    fn test_capture_off_writes_nothing() {
        let mut fw = test_forwarder();
        fw.handle_keyboard_report(&[0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]);
        fw.handle_mouse_report(&[0x01, 0x05, 0xfb, 0x00]);
        assert!(sent(&fw).is_empty());
    }

    #[test]
    fn test_captured_reports_are_framed() {
        let mut fw = test_forwarder();
        fw.captured = true;
        fw.handle_keyboard_report(&[0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]);
        fw.handle_mouse_report(&[0x01, 0x05, 0xfb, 0x00]);

        let sent = sent(&fw);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], vec![0x01, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(sent[1], vec![0x02, 0x01, 0x05, 0xfb, 0x00]);
    }

    #[test]
    fn test_toggle_off_sends_neutral_reports() {
        let mut fw = test_forwarder();
        fw.captured = true;
        fw.handle_keyboard_report(&[0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

        assert!(!fw.captured);
        assert_eq!(fw.state, RunState::Running);
        let out = sent(&fw);
        // The chord report itself goes out first, then both neutrals
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], report::neutral_keyboard_report().to_vec());
        assert_eq!(out[2], report::neutral_mouse_report().to_vec());

        // Further reads are consumed but not forwarded while released
        fw.handle_keyboard_report(&[0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(sent(&fw).len(), 3);
    }

    #[test]
    fn test_exit_hotkey_stops_after_forwarding_the_report() {
        let mut fw = test_forwarder();
        fw.captured = true;
        fw.handle_keyboard_report(&[0x0b, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

        assert_eq!(fw.state, RunState::Stopping);
        let sent = sent(&fw);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0], 0x01);
        assert_eq!(sent[0][1], 0x0b);
    }

    #[test]
    fn test_peer_gone_writes_are_silent() {
        let mut fw = test_forwarder();
        fw.captured = true;
        fw.output.as_mut().unwrap().fail_errno = Some(libc::EPIPE);
        // Must absorb the failure and keep running
        fw.handle_keyboard_report(&[0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(fw.state, RunState::Running);
    }

    #[test]
    fn test_short_reads_are_discarded() {
        // /dev/null reads return 0 bytes; nothing may be forwarded
        let mut fw = test_forwarder();
        fw.captured = true;
        fw.service_keyboard();
        fw.service_mouse();
        assert!(sent(&fw).is_empty());
        assert_eq!(fw.state, RunState::Running);
    }

    #[test]
    fn test_finish_closes_every_descriptor() {
        let mut fw = test_forwarder();
        fw.captured = true;
        fw.state = RunState::Stopping;
        fw.finish();
        assert!(fw.keyboard.is_none());
        assert!(fw.mouse.is_none());
        assert!(fw.output.is_none());
        assert!(!fw.captured);
    }
}

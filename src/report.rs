//! HID report codec
//!
//! Fixed wire formats for the combined keyboard+mouse gadget:
//! - Keyboard: report ID 1 + 8 bytes (modifiers, reserved, 6 keycodes)
//! - Mouse: report ID 2 + 4 bytes (buttons, dX, dY, wheel)
//!
//! The raw hidraw reports from the internal devices already use these
//! 8/4-byte layouts, so forwarding only prepends the report ID.

use bitflags::bitflags;

/// Report ID for keyboard reports on the gadget endpoint
pub const KEYBOARD_REPORT_ID: u8 = 1;

/// Report ID for mouse reports on the gadget endpoint
pub const MOUSE_REPORT_ID: u8 = 2;

/// Raw hidraw report size of the internal keyboard
pub const KEYBOARD_REPORT_SIZE: usize = 8;

/// Raw hidraw report size of the internal mouse
pub const MOUSE_REPORT_SIZE: usize = 4;

/// Wire size of a keyboard report on the gadget endpoint (ID + payload)
pub const KEYBOARD_WIRE_SIZE: usize = KEYBOARD_REPORT_SIZE + 1;

/// Wire size of a mouse report on the gadget endpoint (ID + payload)
pub const MOUSE_WIRE_SIZE: usize = MOUSE_REPORT_SIZE + 1;

bitflags! {
    /// Modifier bits of the first keyboard report byte (USB HID boot layout)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const LEFT_CTRL   = 0x01;
        const LEFT_SHIFT  = 0x02;
        const LEFT_ALT    = 0x04;
        const LEFT_GUI    = 0x08;
        const RIGHT_CTRL  = 0x10;
        const RIGHT_SHIFT = 0x20;
        const RIGHT_ALT   = 0x40;
        const RIGHT_GUI   = 0x80;
    }
}

/// Modifier chord that toggles capture on/off (Ctrl + GUI/Raspberry)
pub const CAPTURE_TOGGLE_CHORD: Modifiers = Modifiers::LEFT_CTRL.union(Modifiers::LEFT_GUI);

/// Modifier chord that exits the forwarder (Ctrl + Shift + GUI/Raspberry)
pub const EXIT_CHORD: Modifiers = CAPTURE_TOGGLE_CHORD.union(Modifiers::LEFT_SHIFT);

/// Combined keyboard+mouse report descriptor advertised to the USB host.
///
/// Keyboard collection is the standard boot layout plus LED output report;
/// mouse collection is 3 buttons and relative X/Y/wheel.
#[rustfmt::skip]
pub const REPORT_DESCRIPTOR: &[u8] = &[
    // Keyboard (Report ID 1)
    0x05, 0x01,        // Usage Page (Generic Desktop)
    0x09, 0x06,        // Usage (Keyboard)
    0xA1, 0x01,        // Collection (Application)
    0x85, 0x01,        //   Report ID (1)
    0x05, 0x07,        //   Usage Page (Keyboard/Keypad)
    0x19, 0xE0,        //   Usage Minimum (0xE0)
    0x29, 0xE7,        //   Usage Maximum (0xE7)
    0x15, 0x00,        //   Logical Minimum (0)
    0x25, 0x01,        //   Logical Maximum (1)
    0x75, 0x01,        //   Report Size (1)
    0x95, 0x08,        //   Report Count (8)
    0x81, 0x02,        //   Input (Data,Var,Abs) - modifier bits
    0x95, 0x01,        //   Report Count (1)
    0x75, 0x08,        //   Report Size (8)
    0x81, 0x01,        //   Input (Const) - reserved byte
    0x95, 0x03,        //   Report Count (3)
    0x75, 0x01,        //   Report Size (1)
    0x05, 0x08,        //   Usage Page (LEDs)
    0x19, 0x01,        //   Usage Minimum (Num Lock)
    0x29, 0x03,        //   Usage Maximum (Scroll Lock)
    0x91, 0x02,        //   Output (Data,Var,Abs) - LED bits
    0x95, 0x05,        //   Report Count (5)
    0x75, 0x01,        //   Report Size (1)
    0x91, 0x01,        //   Output (Const) - LED padding
    0x95, 0x06,        //   Report Count (6)
    0x75, 0x08,        //   Report Size (8)
    0x15, 0x00,        //   Logical Minimum (0)
    0x26, 0xFF, 0x00,  //   Logical Maximum (255)
    0x05, 0x07,        //   Usage Page (Keyboard/Keypad)
    0x19, 0x00,        //   Usage Minimum (0)
    0x2A, 0xFF, 0x00,  //   Usage Maximum (255)
    0x81, 0x00,        //   Input (Data,Array) - keycodes
    0xC0,              // End Collection

    // Mouse (Report ID 2)
    0x05, 0x01,        // Usage Page (Generic Desktop)
    0x09, 0x02,        // Usage (Mouse)
    0xA1, 0x01,        // Collection (Application)
    0x85, 0x02,        //   Report ID (2)
    0x09, 0x01,        //   Usage (Pointer)
    0xA1, 0x00,        //   Collection (Physical)
    0x05, 0x09,        //     Usage Page (Button)
    0x19, 0x01,        //     Usage Minimum (1)
    0x29, 0x03,        //     Usage Maximum (3)
    0x15, 0x00,        //     Logical Minimum (0)
    0x25, 0x01,        //     Logical Maximum (1)
    0x75, 0x01,        //     Report Size (1)
    0x95, 0x03,        //     Report Count (3)
    0x81, 0x02,        //     Input (Data,Var,Abs) - button bits
    0x75, 0x05,        //     Report Size (5)
    0x95, 0x01,        //     Report Count (1)
    0x81, 0x01,        //     Input (Const) - button padding
    0x05, 0x01,        //     Usage Page (Generic Desktop)
    0x09, 0x30,        //     Usage (X)
    0x09, 0x31,        //     Usage (Y)
    0x09, 0x38,        //     Usage (Wheel)
    0x15, 0x81,        //     Logical Minimum (-127)
    0x25, 0x7F,        //     Logical Maximum (127)
    0x75, 0x08,        //     Report Size (8)
    0x95, 0x03,        //     Report Count (3)
    0x81, 0x06,        //     Input (Data,Var,Rel)
    0xC0,              //   End Collection
    0xC0,              // End Collection
];

/// Frame a raw keyboard report for the gadget endpoint
pub fn keyboard_report(raw: &[u8; KEYBOARD_REPORT_SIZE]) -> [u8; KEYBOARD_WIRE_SIZE] {
    let mut report = [0u8; KEYBOARD_WIRE_SIZE];
    report[0] = KEYBOARD_REPORT_ID;
    report[1..].copy_from_slice(raw);
    report
}

/// Frame a raw mouse report for the gadget endpoint
pub fn mouse_report(raw: &[u8; MOUSE_REPORT_SIZE]) -> [u8; MOUSE_WIRE_SIZE] {
    let mut report = [0u8; MOUSE_WIRE_SIZE];
    report[0] = MOUSE_REPORT_ID;
    report[1..].copy_from_slice(raw);
    report
}

/// Keyboard report with all keys and modifiers up
pub fn neutral_keyboard_report() -> [u8; KEYBOARD_WIRE_SIZE] {
    keyboard_report(&[0u8; KEYBOARD_REPORT_SIZE])
}

/// Mouse report with all buttons up and no motion
pub fn neutral_mouse_report() -> [u8; MOUSE_WIRE_SIZE] {
    mouse_report(&[0u8; MOUSE_REPORT_SIZE])
}

/// Format raw report bytes for the console event echo ("0b 00 1c ..")
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_framing() {
        let raw = [0x02, 0x00, 0x04, 0x05, 0x00, 0x00, 0x00, 0x00];
        let report = keyboard_report(&raw);
        assert_eq!(report.len(), 9);
        assert_eq!(report[0], 0x01);
        assert_eq!(&report[1..], &raw);
    }

    #[test]
    fn test_mouse_framing() {
        let raw = [0x01, 0xff, 0x02, 0x00];
        let report = mouse_report(&raw);
        assert_eq!(report.len(), 5);
        assert_eq!(report[0], 0x02);
        assert_eq!(&report[1..], &raw);
    }

    #[test]
    fn test_neutral_reports() {
        assert_eq!(neutral_keyboard_report(), [1, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(neutral_mouse_report(), [2, 0, 0, 0, 0]);
    }

    #[test]
    fn test_hotkey_chords() {
        assert_eq!(CAPTURE_TOGGLE_CHORD.bits(), 0x09);
        assert_eq!(EXIT_CHORD.bits(), 0x0b);
        // Exit chord is the toggle chord plus one more modifier
        assert!(EXIT_CHORD.contains(CAPTURE_TOGGLE_CHORD));
    }

    #[test]
    fn test_descriptor_declares_both_reports() {
        // Report ID items (0x85, n) for keyboard and mouse collections
        let desc = REPORT_DESCRIPTOR;
        assert!(desc.windows(2).any(|w| w == [0x85, 0x01]));
        assert!(desc.windows(2).any(|w| w == [0x85, 0x02]));
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x0b, 0x00, 0x1c]), "0b 00 1c");
        assert_eq!(hex_dump(&[]), "");
    }
}

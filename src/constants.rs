//! Global constants for kbfwd
//!
//! Consolidates timing and device-scan constants to eliminate magic
//! numbers throughout the codebase.

use std::time::Duration;

// ============================================================================
// Timing Constants
// ============================================================================

/// Idle delay between forwarding loop iterations.
/// Bounds CPU usage while keeping added latency in the low milliseconds.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Pacing delay after each report written to the gadget endpoint
pub const WRITE_PACING: Duration = Duration::from_millis(1);

/// Settle window between releasing and re-grabbing an input device.
/// A grab issued immediately after a release can be rejected.
pub const GRAB_SETTLE: Duration = Duration::from_millis(500);

/// Delay between attempts to open the gadget output node
pub const ENDPOINT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Attempt budget for the gadget output node to appear after binding
pub const ENDPOINT_RETRY_ATTEMPTS: u32 = 50;

// ============================================================================
// Device Scan Constants
// ============================================================================

/// Number of /dev/hidrawN nodes probed when locating a device
pub const HIDRAW_SCAN_NODES: u32 = 16;

//! Wire-level and timing constants for the Semáforo device link.
//!
//! The traffic-light controller speaks a line-oriented text protocol at
//! 9600 baud. Every message, in both directions, is a single line
//! terminated by `\n`.
//!
//! ```text
//! kiosk ──"\n"────────────────────► device     (wake, handshake only)
//! kiosk ◄──"SEMAFOROSONG_READY\n"── device
//! kiosk ◄──"BUTTON_PRESSED\n"────── device
//! kiosk ──"SUCCESS_GREEN\n"───────► device
//! ```
//!
//! # Usage
//!
//! ```
//! use semaforo_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(DEFAULT_BAUD_RATE, 9600);
//! let timeout = Duration::from_millis(DEFAULT_IO_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 1);
//! ```

// ============================================================================
// Inbound tokens
// ============================================================================

/// Readiness token the firmware prints once it has booted.
pub const READY_TOKEN: &str = "SEMAFOROSONG_READY";

/// Line sent when the physical request button is pressed.
pub const BUTTON_PRESSED_TOKEN: &str = "BUTTON_PRESSED";

/// Any inbound line containing this substring is reported as an error.
pub const ERROR_MARKER: &str = "ERROR";

// ============================================================================
// Outbound commands
// ============================================================================

/// Green light: access allowed.
pub const CMD_SUCCESS_GREEN: &str = "SUCCESS_GREEN";

/// Amber light: proceed with caution.
pub const CMD_SUCCESS_YELLOW: &str = "SUCCESS_YELLOW";

/// Police siren animation.
pub const CMD_POLICE_SIREN: &str = "POLICE_SIREN";

/// Red light: access denied.
pub const CMD_ERROR: &str = "ERROR";

/// Return the device to its idle animation.
pub const CMD_RESET: &str = "RESET";

/// Line terminator for both directions.
pub const LINE_TERMINATOR: u8 = b'\n';

// ============================================================================
// Serial settings
// ============================================================================

/// Baud rate of the controller firmware.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Read/write timeout applied to every open endpoint, in milliseconds.
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 1000;

// ============================================================================
// Handshake timing
// ============================================================================

/// Time the board needs after the port opens (auto-reset on DTR), in milliseconds.
pub const HANDSHAKE_SETTLE_MS: u64 = 2000;

/// Wait between a wake newline and checking for the readiness token, in milliseconds.
pub const HANDSHAKE_ROUND_DELAY_MS: u64 = 500;

/// Number of wake/answer rounds before a candidate is discarded.
pub const HANDSHAKE_ROUNDS: u32 = 3;

// ============================================================================
// Link worker timing
// ============================================================================

/// Sleep between polls of the read loop, in milliseconds.
///
/// Bounds CPU usage while keeping button latency under 200ms.
pub const LINK_IDLE_INTERVAL_MS: u64 = 100;

/// Capacity of the device event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

// ============================================================================
// Supervisor timing
// ============================================================================

/// Delay before the first automatic search, so the UI can render first.
pub const STARTUP_DELAY_MS: u64 = 2000;

/// Delay between automatic search attempts when no endpoint is present.
pub const RETRY_DELAY_MS: u64 = 2000;

/// Automatic search attempts before giving up and waiting for the user.
pub const MAX_STARTUP_ATTEMPTS: u32 = 6;

/// Number of supervisor state transitions kept for diagnostics.
pub const MAX_TRANSITION_HISTORY: usize = 100;

// ============================================================================
// Decision service
// ============================================================================

/// Decision service endpoint used by the deployed kiosks.
pub const DEFAULT_SERVICE_URL: &str = "https://moradn22.pythonanywhere.com/api/generate-qr-code";

/// Name of the credential query parameter.
pub const API_KEY_PARAM: &str = "api_key";

/// Timeout for one decision request, in milliseconds.
pub const REQUEST_TIMEOUT_MS: u64 = 10_000;

//! Board settings.
//!
//! Run-time characteristics of the Blynk Board: connection timeouts, provisioning
//! defaults and sizes. Indicator colors and blink periods live next to the status
//! table in [`crate::indicator`].

use std::time::Duration;

/// Firmware version reported by the serial banner and the config portal.
pub const FIRMWARE_VERSION: &str = "0.5.0";

/// Hardware revision this firmware targets.
pub const HARDWARE_VERSION: &str = "1.0.0";

// ==================== Timeouts ====================

/// Deadline for a WiFi station association attempt.
pub const WIFI_CONNECT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Deadline for a cloud session handshake.
pub const CLOUD_CONNECT_TIMEOUT: Duration = Duration::from_millis(15_000);

/// How long the error color is shown before the supervisor re-evaluates.
pub const ERROR_DISPLAY_INTERVAL: Duration = Duration::from_millis(5_000);

/// Continuous button hold required to force re-provisioning.
pub const BUTTON_HOLD_THRESHOLD: Duration = Duration::from_millis(3_000);

/// Main loop poll period.
pub const LOOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ==================== Cloud ====================

/// Blynk auth tokens are exactly this many characters.
pub const CLOUD_AUTH_TOKEN_LEN: usize = 32;

/// Host used when the user leaves the host field blank.
pub const DEFAULT_CLOUD_HOST: &str = "blynk-cloud.com";

/// Port used when the user leaves the port field blank.
pub const DEFAULT_CLOUD_PORT: u16 = 8442;

/// Longest accepted cloud host name.
pub const MAX_CLOUD_HOST_LEN: usize = 64;

// ==================== Provisioning ====================

/// Access point name prefix; four palette letters are appended.
pub const SSID_PREFIX: &str = "BlynkMe";

/// Number of palette symbols in the SSID suffix.
pub const SSID_SUFFIX_LEN: usize = 4;

/// Serial line buffer capacity. Bytes past this are dropped.
pub const SERIAL_RX_BUFFER_SIZE: usize = 128;

/// Config portal port on the device's soft-AP.
pub const DEFAULT_PORTAL_PORT: u16 = 80;

/// How long the portal waits for the main loop to accept a submission.
pub const PORTAL_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

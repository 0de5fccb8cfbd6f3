//! ESP32 WiFi driver.
//!
//! - `connection` - non-blocking ESP-IDF WiFi wrapper (station + soft-AP)
//! - [`mode`] - which interfaces the driver runs, and what a scan needs
//!
//! Credential types and validation live in [`crate::credentials`]; the
//! network-facing adapters are in [`crate::network`].

#[cfg(feature = "esp32")]
mod connection;
pub mod mode;

#[cfg(feature = "esp32")]
pub use connection::{WifiError, WifiManager};
pub use mode::DriverMode;

//! Blynk Board ESP32 firmware library.
//!
//! The connectivity lifecycle of the board: provisioning WiFi and cloud
//! credentials, supervising the network association and the cloud session,
//! and showing the run mode on the RGB status LED.
//!
//! Everything except the ESP-IDF adapters (behind the `esp32` feature) is
//! platform independent and tested on the host.

// Allow the crate to reference itself by name (needed for proc-macro generated code)
extern crate self as blynk_board_esp32;

pub mod credentials;
pub mod event;
pub mod indicator;
pub mod mode;
pub mod network;
pub mod provisioning;
pub mod settings;
pub mod store;
pub mod supervisor;
#[cfg(feature = "tap-tests")]
pub mod testing;
pub mod wifi;

// Re-export commonly used items
pub use credentials::{CloudCredentials, ValidationError, WifiCredentials};
pub use event::Event;
pub use indicator::{Indicator, Rgb, StatusSpec};
pub use mode::{ConnectStatus, Fault, RunMode};
pub use store::{ConfigStore, ProvisioningRecord};
pub use supervisor::{Collaborators, Supervisor, SupervisorConfig};

// Re-export testing items (only with tap-tests feature)
#[cfg(feature = "tap-tests")]
pub use testing::TestRunner;

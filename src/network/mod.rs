//! Network and cloud-session collaborators.
//!
//! The supervisor never blocks on the network. It starts an attempt, records
//! a deadline, and polls a non-blocking status every loop iteration:
//!
//! - [`Network`]: WiFi station association (and scans for the serial session)
//! - [`CloudSession`]: the authenticated session with the cloud server
//!
//! Implementations:
//!
//! - **Host**: [`HostNetwork`] (the OS handles networking) and
//!   [`TcpCloudSession`] (TCP reachability of the server, no protocol)
//! - **ESP32** (`esp32` feature): [`EspNetwork`] on the WiFi driver
//!
//! # Example
//!
//! ```
//! use blynk_board_esp32::credentials::WifiCredentials;
//! use blynk_board_esp32::network::{AssociationStatus, HostNetwork, Network};
//!
//! let mut network = HostNetwork::new();
//! let wifi = WifiCredentials::new("HomeNetwork", "password123").unwrap();
//! network.begin_association(&wifi).unwrap();
//! assert_eq!(network.association_status(), AssociationStatus::Connected);
//! ```

use crate::credentials::{CloudCredentials, WifiCredentials};

mod cloud;
mod host;
#[cfg(feature = "esp32")]
mod wifi;

pub use cloud::TcpCloudSession;
pub use host::HostNetwork;
#[cfg(feature = "esp32")]
pub use wifi::{EspAccessPoint, EspNetwork};

/// State of a WiFi association attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationStatus {
    /// No answer yet.
    Pending,
    /// Associated and addressed.
    Connected,
    /// The radio gave up on this attempt.
    Failed,
}

/// State of a cloud session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Handshake in progress.
    Pending,
    /// Session established and alive.
    Active,
    /// The server refused the session.
    Rejected,
    /// An established session was lost (or never came up).
    Dropped,
}

/// One network found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub ssid: String,
    /// Signal strength in dBm.
    pub rssi: i8,
    /// No password required.
    pub open: bool,
}

/// Network errors.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The driver refused the credentials.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    /// WiFi driver error (ESP32).
    #[cfg(feature = "esp32")]
    #[error("WiFi error: {0}")]
    Wifi(#[from] crate::wifi::WifiError),
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// WiFi station association.
pub trait Network {
    /// Start associating. Returns immediately.
    fn begin_association(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError>;

    /// Non-blocking status of the current attempt (or association).
    fn association_status(&mut self) -> AssociationStatus;

    /// Abandon the current attempt or association.
    fn abort(&mut self);

    /// List visible networks.
    fn scan(&mut self) -> Result<Vec<ScanEntry>, NetworkError>;
}

/// Cloud session handshake and liveness.
pub trait CloudSession {
    /// Start the handshake. Returns immediately.
    fn begin_session(&mut self, credentials: &CloudCredentials) -> Result<(), NetworkError>;

    /// Non-blocking status of the current session.
    fn session_status(&mut self) -> SessionStatus;

    /// Close the session or abandon the handshake.
    fn abort(&mut self);
}

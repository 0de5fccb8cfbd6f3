//! WiFi driver management.
//!
//! Wraps the non-blocking ESP-IDF WiFi driver. The station side and the soft
//! access point can run together (mixed mode) so the board stays reachable on
//! its config portal while it tries a network.

use super::mode::DriverMode;
use crate::credentials::WifiCredentials;
use crate::network::ScanEntry;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};
use esp_idf_sys::EspError;
use log::{debug, info, warn};

/// Soft-AP channel.
const AP_CHANNEL: u8 = 1;

/// WiFi driver manager.
pub struct WifiManager {
    wifi: EspWifi<'static>,
    client: Option<ClientConfiguration>,
    access_point: Option<AccessPointConfiguration>,
}

impl WifiManager {
    /// Create a new WiFi manager.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop, nvs)?;
        Ok(Self {
            wifi,
            client: None,
            access_point: None,
        })
    }

    /// Push the current station/AP combination to the driver.
    fn apply(&mut self) -> Result<(), EspError> {
        let configuration = match (self.client.clone(), self.access_point.clone()) {
            (Some(client), Some(ap)) => Configuration::Mixed(client, ap),
            (Some(client), None) => Configuration::Client(client),
            (None, Some(ap)) => Configuration::AccessPoint(ap),
            (None, None) => {
                if self.wifi.is_started()? {
                    self.wifi.stop()?;
                }
                return Ok(());
            }
        };
        self.wifi.set_configuration(&configuration)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        Ok(())
    }

    /// Start associating with a network. Returns without waiting.
    pub fn begin_connect(&mut self, credentials: &WifiCredentials) -> Result<(), WifiError> {
        info!("Connecting to WiFi: {}", credentials.ssid);

        let auth_method = if credentials.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        self.client = Some(ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidSsid)?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        self.apply()?;
        self.wifi.connect().map_err(WifiError::ConnectionFailed)?;
        Ok(())
    }

    /// Disconnect the station side.
    pub fn disconnect(&mut self) {
        if self.client.take().is_none() {
            return;
        }
        info!("Disconnecting from WiFi");
        if let Err(e) = self.wifi.disconnect() {
            debug!("WiFi disconnect: {:?}", e);
        }
        if let Err(e) = self.apply() {
            warn!("Failed to reconfigure WiFi after disconnect: {:?}", e);
        }
    }

    /// Start the soft access point.
    pub fn start_access_point(&mut self, ssid: &str) -> Result<(), WifiError> {
        self.access_point = Some(AccessPointConfiguration {
            ssid: ssid.try_into().map_err(|_| WifiError::InvalidSsid)?,
            auth_method: AuthMethod::None,
            channel: AP_CHANNEL,
            ..Default::default()
        });
        self.apply()?;
        info!("Soft-AP '{}' started", ssid);
        Ok(())
    }

    /// Stop the soft access point.
    pub fn stop_access_point(&mut self) {
        if self.access_point.take().is_none() {
            return;
        }
        if let Err(e) = self.apply() {
            warn!("Failed to stop soft-AP: {:?}", e);
        }
    }

    /// Associated and addressed.
    pub fn is_up(&self) -> bool {
        self.client.is_some() && self.wifi.is_up().unwrap_or(false)
    }

    fn mode(&self) -> DriverMode {
        DriverMode::new(self.client.is_some(), self.access_point.is_some())
    }

    /// Scan for networks. Blocks for the duration of the scan.
    ///
    /// The driver refuses to scan without a station interface, so an idle
    /// station is added for the scan and removed afterwards. The soft-AP
    /// stays up throughout.
    pub fn scan(&mut self) -> Result<Vec<ScanEntry>, WifiError> {
        let mode = self.mode();
        if mode.can_scan() {
            return Ok(Self::entries(self.wifi.scan()?));
        }

        debug!("Switching WiFi driver to {} for the scan", mode.for_scan());
        self.client = Some(ClientConfiguration::default());
        let result = self.apply().and_then(|_| self.wifi.scan());
        self.client = None;
        self.apply()?;
        debug!("WiFi driver back to {}", self.mode());
        Ok(Self::entries(result?))
    }

    fn entries(found: Vec<esp_idf_svc::wifi::AccessPointInfo>) -> Vec<ScanEntry> {
        let mut entries: Vec<ScanEntry> = found
            .into_iter()
            .filter(|ap| !ap.ssid.is_empty())
            .map(|ap| ScanEntry {
                ssid: ap.ssid.as_str().to_string(),
                rssi: ap.signal_strength,
                open: matches!(ap.auth_method, None | Some(AuthMethod::None)),
            })
            .collect();
        entries.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        entries
    }
}

/// Errors that can occur during WiFi operations.
#[derive(Debug, thiserror::Error)]
pub enum WifiError {
    /// SSID is invalid (too long or contains invalid characters).
    #[error("invalid SSID")]
    InvalidSsid,
    /// Password is invalid.
    #[error("invalid password")]
    InvalidPassword,
    /// The driver refused to start the association.
    #[error("connection failed: {0:?}")]
    ConnectionFailed(EspError),
    /// ESP-IDF error.
    #[error("ESP error: {0:?}")]
    Esp(EspError),
}

impl From<EspError> for WifiError {
    fn from(e: EspError) -> Self {
        Self::Esp(e)
    }
}

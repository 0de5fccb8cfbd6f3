//! ESP32 WiFi network provider and soft access point.
//!
//! Both adapters share one [`WifiManager`], since the station and the access
//! point run on the same radio.

use super::{AssociationStatus, Network, NetworkError, ScanEntry};
use crate::credentials::WifiCredentials;
use crate::provisioning::{AccessPoint, ApError, DeviceIdentity};
use crate::wifi::WifiManager;
use std::cell::RefCell;
use std::rc::Rc;

/// WiFi station as a [`Network`].
pub struct EspNetwork {
    wifi: Rc<RefCell<WifiManager>>,
    failed: bool,
}

impl EspNetwork {
    pub fn new(wifi: Rc<RefCell<WifiManager>>) -> Self {
        Self { wifi, failed: false }
    }
}

impl Network for EspNetwork {
    fn begin_association(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        self.failed = false;
        let result = self.wifi.borrow_mut().begin_connect(credentials);
        if result.is_err() {
            self.failed = true;
        }
        Ok(result?)
    }

    fn association_status(&mut self) -> AssociationStatus {
        if self.failed {
            AssociationStatus::Failed
        } else if self.wifi.borrow().is_up() {
            AssociationStatus::Connected
        } else {
            // The driver keeps retrying; the supervisor deadline decides
            AssociationStatus::Pending
        }
    }

    fn abort(&mut self) {
        self.failed = false;
        self.wifi.borrow_mut().disconnect();
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, NetworkError> {
        Ok(self.wifi.borrow_mut().scan()?)
    }
}

/// Soft access point on the WiFi radio.
pub struct EspAccessPoint {
    wifi: Rc<RefCell<WifiManager>>,
}

impl EspAccessPoint {
    pub fn new(wifi: Rc<RefCell<WifiManager>>) -> Self {
        Self { wifi }
    }
}

impl AccessPoint for EspAccessPoint {
    fn start(&mut self, identity: &DeviceIdentity) -> Result<(), ApError> {
        self.wifi
            .borrow_mut()
            .start_access_point(&identity.ssid())
            .map_err(|e| ApError::Radio(e.to_string()))
    }

    fn stop(&mut self) {
        self.wifi.borrow_mut().stop_access_point();
    }
}

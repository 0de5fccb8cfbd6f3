//! Host network provider.
//!
//! On host systems the OS handles networking. Association always succeeds
//! immediately; there is nothing to scan.

use super::{AssociationStatus, Network, NetworkError, ScanEntry};
use crate::credentials::WifiCredentials;
use log::info;
use std::net::IpAddr;

/// Host network provider.
///
/// Detects the local IP address for binding servers.
pub struct HostNetwork {
    ip_addr: Option<IpAddr>,
    associated: bool,
}

impl HostNetwork {
    /// Create a new host network provider.
    pub fn new() -> Self {
        Self {
            ip_addr: None,
            associated: false,
        }
    }

    /// Local IP found by the last association.
    pub fn ip_addr(&self) -> Option<IpAddr> {
        self.ip_addr
    }

    /// Get the primary local IP address.
    ///
    /// Creates a UDP socket and "connects" it to a public IP (nothing is
    /// sent), then checks which local address was chosen.
    fn detect_local_ip() -> Option<IpAddr> {
        use std::net::UdpSocket;

        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip())
    }
}

impl Default for HostNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl Network for HostNetwork {
    fn begin_association(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        self.ip_addr = Self::detect_local_ip();
        self.associated = true;

        match self.ip_addr {
            Some(ip) => info!(
                "Host network ready for '{}', local IP: {}",
                credentials.ssid, ip
            ),
            None => info!("Host network ready for '{}'", credentials.ssid),
        }
        Ok(())
    }

    fn association_status(&mut self) -> AssociationStatus {
        if self.associated {
            AssociationStatus::Connected
        } else {
            AssociationStatus::Pending
        }
    }

    fn abort(&mut self) {
        self.associated = false;
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, NetworkError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_network_associates() {
        let mut network = HostNetwork::new();
        assert_eq!(network.association_status(), AssociationStatus::Pending);

        let wifi = WifiCredentials::new("Net", "").unwrap();
        assert!(network.begin_association(&wifi).is_ok());
        assert_eq!(network.association_status(), AssociationStatus::Connected);

        network.abort();
        assert_eq!(network.association_status(), AssociationStatus::Pending);
    }

    #[test]
    fn test_scan_is_empty() {
        let mut network = HostNetwork::new();
        assert!(network.scan().unwrap().is_empty());
    }

    #[test]
    fn test_detect_local_ip() {
        // IP might be None in CI/air-gapped environments
        if let Some(addr) = HostNetwork::detect_local_ip() {
            assert!(addr.is_ipv4() || addr.is_ipv6());
        }
    }
}

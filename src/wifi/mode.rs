//! Which interfaces the WiFi driver runs.

use std::fmt;

/// Driver mode derived from the configured station and soft-AP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    Off,
    Station,
    AccessPoint,
    /// Station and soft-AP together.
    Mixed,
}

impl DriverMode {
    pub fn new(station: bool, access_point: bool) -> Self {
        match (station, access_point) {
            (false, false) => Self::Off,
            (true, false) => Self::Station,
            (false, true) => Self::AccessPoint,
            (true, true) => Self::Mixed,
        }
    }

    /// Scanning needs the station interface.
    pub fn can_scan(self) -> bool {
        matches!(self, Self::Station | Self::Mixed)
    }

    /// Mode to run while scanning: the current one plus an idle station.
    pub fn for_scan(self) -> Self {
        match self {
            Self::Off => Self::Station,
            Self::AccessPoint => Self::Mixed,
            other => other,
        }
    }
}

impl fmt::Display for DriverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Station => "station",
            Self::AccessPoint => "soft-AP",
            Self::Mixed => "station + soft-AP",
        };
        f.write_str(name)
    }
}

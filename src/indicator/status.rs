//! Status table: run mode to color and blink period.

use crate::mode::{Fault, RunMode};
use std::fmt;
use std::time::Duration;

/// 24-bit RGB color, `0xRRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u32);

impl Rgb {
    pub const OFF: Rgb = Rgb(0x000000);

    pub fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0 & 0xff_ffff)
    }
}

// ==================== Colors ====================

pub const COLOR_WAIT_CONFIG: Rgb = Rgb(0x202020);
pub const COLOR_AP_DEFAULT: Rgb = Rgb(0x200000);
pub const COLOR_AP_DEVICE_ON: Rgb = Rgb(0x200020);
pub const COLOR_CONNECTING_WIFI: Rgb = Rgb(0x002000);
pub const COLOR_CANT_CONNECT_WIFI: Rgb = Rgb(0x200000);
pub const COLOR_CONNECTING_CLOUD: Rgb = Rgb(0x000020);
pub const COLOR_CONNECTED_CLOUD: Rgb = Rgb(0x000080);
pub const COLOR_CANT_CONNECT_CLOUD: Rgb = Rgb(0x202000);

// ==================== Blink periods ====================

pub const BLINK_SELF_TEST: Duration = Duration::from_millis(250);
pub const BLINK_START: Duration = Duration::from_millis(1000);
pub const BLINK_AP_DEFAULT: Duration = Duration::from_millis(1000);
pub const BLINK_AP_DEVICE_ON: Duration = Duration::from_millis(500);
pub const BLINK_CONNECTING_WIFI: Duration = Duration::from_millis(250);
pub const BLINK_CONNECTING_CLOUD: Duration = Duration::from_millis(1000);
pub const BLINK_ERROR: Duration = Duration::from_millis(1000);

/// How the color is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blink {
    /// Held steadily; no timer.
    Solid,
    /// Toggled on and off every period.
    Period(Duration),
}

/// Indicator output for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSpec {
    pub color: Rgb,
    pub blink: Blink,
}

impl StatusSpec {
    const fn blinking(color: Rgb, period: Duration) -> Self {
        Self {
            color,
            blink: Blink::Period(period),
        }
    }

    const fn solid(color: Rgb) -> Self {
        Self {
            color,
            blink: Blink::Solid,
        }
    }

    /// Look up the indicator output for a mode.
    ///
    /// `fault` selects the color in [`RunMode::Error`] and is ignored otherwise.
    pub fn lookup(mode: RunMode, fault: Option<Fault>) -> Self {
        match mode {
            RunMode::SelfTest => Self::blinking(COLOR_WAIT_CONFIG, BLINK_SELF_TEST),
            RunMode::WaitConfig => Self::blinking(COLOR_WAIT_CONFIG, BLINK_START),
            RunMode::Config => Self::blinking(COLOR_AP_DEFAULT, BLINK_AP_DEFAULT),
            RunMode::ConfigDeviceConnected => {
                Self::blinking(COLOR_AP_DEVICE_ON, BLINK_AP_DEVICE_ON)
            }
            RunMode::ButtonHold => Self::solid(COLOR_WAIT_CONFIG),
            RunMode::ConnectingWifi => Self::blinking(COLOR_CONNECTING_WIFI, BLINK_CONNECTING_WIFI),
            RunMode::ConnectingCloud => {
                Self::blinking(COLOR_CONNECTING_CLOUD, BLINK_CONNECTING_CLOUD)
            }
            RunMode::Running => Self::solid(COLOR_CONNECTED_CLOUD),
            RunMode::Error => match fault {
                Some(Fault::SelfTestFailure) => Self::solid(COLOR_CANT_CONNECT_WIFI),
                Some(f) if f.is_cloud() => Self::blinking(COLOR_CANT_CONNECT_CLOUD, BLINK_ERROR),
                _ => Self::blinking(COLOR_CANT_CONNECT_WIFI, BLINK_ERROR),
            },
        }
    }
}


#[cfg(feature = "tap-tests")]
mod tap_tests {
    use super::*;
    use blynk_board_esp32_macros::tap_test;

    #[tap_test]
    fn status_running_is_solid() {
        let spec = StatusSpec::lookup(RunMode::Running, None);
        assert_eq!(spec.blink, Blink::Solid);
        assert_eq!(spec.color, COLOR_CONNECTED_CLOUD);
    }

    #[tap_test]
    fn status_error_color_follows_fault() {
        let wifi = StatusSpec::lookup(RunMode::Error, Some(Fault::WifiAssociationTimeout));
        let cloud = StatusSpec::lookup(RunMode::Error, Some(Fault::CloudHandshakeTimeout));
        assert_eq!(wifi.color, COLOR_CANT_CONNECT_WIFI);
        assert_eq!(cloud.color, COLOR_CANT_CONNECT_CLOUD);
    }
}

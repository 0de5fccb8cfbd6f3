//! Run modes and connection fault codes.

use std::fmt;

/// Top-level operating state of the board.
///
/// Exactly one mode is active at a time. The [`Supervisor`](crate::Supervisor) is
/// the only component that changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// One-time first-boot hardware check.
    SelfTest,
    /// Boot state: deciding between provisioning and connecting.
    WaitConfig,
    /// Soft-AP and serial provisioning active, no companion device yet.
    Config,
    /// Button is held down; released early returns to the previous mode.
    ButtonHold,
    /// A companion device reached the config portal.
    ConfigDeviceConnected,
    /// WiFi station association in progress.
    ConnectingWifi,
    /// Cloud session handshake in progress.
    ConnectingCloud,
    /// Connected to the cloud.
    Running,
    /// A connection failed (or the self-test did).
    Error,
}

impl RunMode {
    /// Short lowercase name used in logs and the portal.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelfTest => "self-test",
            Self::WaitConfig => "wait-config",
            Self::Config => "config",
            Self::ButtonHold => "button-hold",
            Self::ConfigDeviceConnected => "config-device-connected",
            Self::ConnectingWifi => "connecting-wifi",
            Self::ConnectingCloud => "connecting-cloud",
            Self::Running => "running",
            Self::Error => "error",
        }
    }

    /// True while the provisioning sessions are open.
    pub fn is_config(self) -> bool {
        matches!(self, Self::Config | Self::ConfigDeviceConnected)
    }

    /// Modes in which holding the button starts the re-provisioning countdown.
    pub fn accepts_button_hold(self) -> bool {
        matches!(
            self,
            Self::ConnectingWifi | Self::ConnectingCloud | Self::Running | Self::Error
        )
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status values exposed upward by a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// WiFi and cloud both connected.
    Success,
    /// WiFi association failed or timed out.
    WifiConnectError,
    /// Cloud handshake failed or timed out.
    BlynkConnectError,
}

impl ConnectStatus {
    /// Numeric code: `1`, `-1` or `-2`.
    pub fn code(self) -> i8 {
        match self {
            Self::Success => 1,
            Self::WifiConnectError => -1,
            Self::BlynkConnectError => -2,
        }
    }
}

/// Reason the supervisor entered [`RunMode::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Association still pending when the WiFi deadline passed.
    WifiAssociationTimeout,
    /// The radio reported a failed association, or the credentials were unusable.
    WifiAssociationFailure,
    /// Handshake still pending when the cloud deadline passed.
    CloudHandshakeTimeout,
    /// The server refused the session.
    CloudHandshakeRejection,
    /// No valid auth token is stored.
    CloudCredentialsMissing,
    /// First-boot hardware check failed. Never cleared automatically.
    SelfTestFailure,
}

impl Fault {
    /// The upward status code, `None` for the self-test.
    pub fn connect_status(self) -> Option<ConnectStatus> {
        match self {
            Self::WifiAssociationTimeout | Self::WifiAssociationFailure => {
                Some(ConnectStatus::WifiConnectError)
            }
            Self::CloudHandshakeTimeout
            | Self::CloudHandshakeRejection
            | Self::CloudCredentialsMissing => Some(ConnectStatus::BlynkConnectError),
            Self::SelfTestFailure => None,
        }
    }

    /// Fatal faults leave the board in `Error` with no display timer.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::SelfTestFailure)
    }

    /// True for faults raised by the cloud stage.
    pub fn is_cloud(self) -> bool {
        self.connect_status() == Some(ConnectStatus::BlynkConnectError)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::WifiAssociationTimeout => "WiFi association timed out",
            Self::WifiAssociationFailure => "WiFi association failed",
            Self::CloudHandshakeTimeout => "cloud handshake timed out",
            Self::CloudHandshakeRejection => "cloud handshake rejected",
            Self::CloudCredentialsMissing => "no cloud auth token configured",
            Self::SelfTestFailure => "self-test failed",
        };
        f.write_str(msg)
    }
}

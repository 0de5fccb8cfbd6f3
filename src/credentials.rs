//! Credential types and field validation.
//!
//! Platform-independent validation shared by the serial session, the config
//! portal and the connection stages.
//!
//! # Example
//!
//! ```
//! use blynk_board_esp32::credentials::{CloudCredentials, WifiCredentials};
//!
//! let wifi = WifiCredentials::new("MyNetwork", "MyPassword").unwrap();
//! assert!(!wifi.is_open());
//!
//! // Blank host and port fall back to the defaults
//! let cloud = CloudCredentials::parse("0123456789abcdef0123456789abcdef", "", "").unwrap();
//! assert_eq!(cloud.host, "blynk-cloud.com");
//! assert_eq!(cloud.port, 8442);
//! ```

use crate::settings::{
    CLOUD_AUTH_TOKEN_LEN, DEFAULT_CLOUD_HOST, DEFAULT_CLOUD_PORT, MAX_CLOUD_HOST_LEN,
};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Minimum password length for WPA2.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Errors raised by field validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("SSID cannot be empty")]
    SsidEmpty,
    #[error("SSID too long: {len} bytes (max {max})")]
    SsidTooLong { len: usize, max: usize },
    #[error("password too short: {len} bytes (min {min})")]
    PasswordTooShort { len: usize, min: usize },
    #[error("password too long: {len} bytes (max {max})")]
    PasswordTooLong { len: usize, max: usize },
    #[error("auth token must be exactly {expected} characters, got {len}")]
    TokenLength { len: usize, expected: usize },
    #[error("auth token may only contain letters and digits")]
    TokenCharset,
    #[error("host too long: {len} bytes (max {max})")]
    HostTooLong { len: usize, max: usize },
    #[error("host contains whitespace")]
    HostInvalid,
    #[error("invalid port: {0}")]
    PortInvalid(String),
}

/// Check an SSID.
pub fn validate_ssid(ssid: &str) -> Result<(), ValidationError> {
    if ssid.is_empty() {
        return Err(ValidationError::SsidEmpty);
    }
    if ssid.len() > MAX_SSID_LEN {
        return Err(ValidationError::SsidTooLong {
            len: ssid.len(),
            max: MAX_SSID_LEN,
        });
    }
    Ok(())
}

/// Check a WPA2 password. Empty is accepted for open networks.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if !password.is_empty() && password.len() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            len: password.len(),
            min: MIN_PASSWORD_LEN,
        });
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooLong {
            len: password.len(),
            max: MAX_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Check a cloud auth token: exactly [`CLOUD_AUTH_TOKEN_LEN`] ASCII letters
/// or digits, so it always takes that many bytes in the record.
pub fn validate_token(token: &str) -> Result<(), ValidationError> {
    let len = token.chars().count();
    if len != CLOUD_AUTH_TOKEN_LEN {
        return Err(ValidationError::TokenLength {
            len,
            expected: CLOUD_AUTH_TOKEN_LEN,
        });
    }
    if !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::TokenCharset);
    }
    Ok(())
}

/// Parse a host field. Blank input resolves to [`DEFAULT_CLOUD_HOST`].
pub fn parse_host(input: &str) -> Result<String, ValidationError> {
    let host = input.trim();
    if host.is_empty() {
        return Ok(DEFAULT_CLOUD_HOST.to_string());
    }
    if host.len() > MAX_CLOUD_HOST_LEN {
        return Err(ValidationError::HostTooLong {
            len: host.len(),
            max: MAX_CLOUD_HOST_LEN,
        });
    }
    if host.chars().any(char::is_whitespace) {
        return Err(ValidationError::HostInvalid);
    }
    Ok(host.to_string())
}

/// Parse a port field. Blank input resolves to [`DEFAULT_CLOUD_PORT`].
pub fn parse_port(input: &str) -> Result<u16, ValidationError> {
    let port = input.trim();
    if port.is_empty() {
        return Ok(DEFAULT_CLOUD_PORT);
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(ValidationError::PortInvalid(port.to_string())),
        Ok(p) => Ok(p),
    }
}

/// WiFi credentials for connecting to an access point.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct WifiCredentials {
    /// Network SSID (1-32 bytes).
    pub ssid: String,
    /// Network password (8-64 bytes for WPA2, empty for open networks).
    pub password: String,
}

impl WifiCredentials {
    /// Create validated WiFi credentials.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ValidationError> {
        let credentials = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        validate_ssid(&credentials.ssid)?;
        validate_password(&credentials.password)?;
        Ok(credentials)
    }

    /// Check if this is an open network (no password).
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

impl fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"****")
            .finish()
    }
}

/// Cloud session parameters.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CloudCredentials {
    /// 32-character auth token.
    pub auth_token: String,
    /// Server host name.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
}

impl CloudCredentials {
    /// Create validated cloud credentials.
    pub fn new(
        auth_token: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Result<Self, ValidationError> {
        let auth_token = auth_token.into();
        validate_token(&auth_token)?;
        let host = parse_host(&host.into())?;
        if port == 0 {
            return Err(ValidationError::PortInvalid("0".into()));
        }
        Ok(Self {
            auth_token,
            host,
            port,
        })
    }

    /// Build credentials from raw text fields, applying blank-field defaults.
    pub fn parse(token: &str, host: &str, port: &str) -> Result<Self, ValidationError> {
        let port = parse_port(port)?;
        Self::new(token.trim(), host, port)
    }

    /// `host:port` for logging.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for CloudCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("auth_token", &"****")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

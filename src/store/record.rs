//! The durable provisioning record and its byte encoding.

use crate::credentials::{
    validate_ssid, validate_token, CloudCredentials, ValidationError, WifiCredentials,
};
use crate::provisioning::identity::PALETTE_LEN;
use crate::settings::{DEFAULT_CLOUD_HOST, DEFAULT_CLOUD_PORT, SSID_SUFFIX_LEN};
use std::fmt;
use zeroize::Zeroize;

/// Current payload layout version.
const RECORD_VERSION: u8 = 1;

const FLAG_CONFIGURED: u8 = 1 << 0;
const FLAG_SELF_TEST_PASSED: u8 = 1 << 1;
const FLAG_SUFFIX_GENERATED: u8 = 1 << 2;

/// Errors decoding a stored record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid record format: {0}")]
    InvalidFormat(String),
}

/// Everything the board remembers across power cycles.
#[derive(Clone, PartialEq, Eq)]
pub struct ProvisioningRecord {
    /// Both WiFi and cloud credentials are present.
    pub configured: bool,
    /// First-boot self-test already passed.
    pub self_test_passed: bool,
    /// `ssid_suffix` holds the frozen device identity.
    pub ssid_suffix_generated: bool,
    /// Palette indices of the AP name suffix.
    pub ssid_suffix: [u8; SSID_SUFFIX_LEN],
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub cloud_auth_token: String,
    pub cloud_host: String,
    pub cloud_port: u16,
}

impl Default for ProvisioningRecord {
    fn default() -> Self {
        Self {
            configured: false,
            self_test_passed: false,
            ssid_suffix_generated: false,
            ssid_suffix: [0; SSID_SUFFIX_LEN],
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            cloud_auth_token: String::new(),
            cloud_host: DEFAULT_CLOUD_HOST.to_string(),
            cloud_port: DEFAULT_CLOUD_PORT,
        }
    }
}

impl ProvisioningRecord {
    /// A usable SSID is stored.
    pub fn has_wifi_credentials(&self) -> bool {
        validate_ssid(&self.wifi_ssid).is_ok()
    }

    /// A well-formed auth token is stored.
    pub fn has_cloud_credentials(&self) -> bool {
        validate_token(&self.cloud_auth_token).is_ok()
    }

    /// Recompute `configured` from the stored credentials.
    pub fn refresh_configured(&mut self) {
        self.configured = self.has_wifi_credentials() && self.has_cloud_credentials();
    }

    /// Replace blank host and zero port with the defaults.
    pub fn normalize(&mut self) {
        if self.cloud_host.trim().is_empty() {
            self.cloud_host = DEFAULT_CLOUD_HOST.to_string();
        }
        if self.cloud_port == 0 {
            self.cloud_port = DEFAULT_CLOUD_PORT;
        }
    }

    pub fn wifi_credentials(&self) -> Result<WifiCredentials, ValidationError> {
        WifiCredentials::new(self.wifi_ssid.as_str(), self.wifi_password.as_str())
    }

    pub fn cloud_credentials(&self) -> Result<CloudCredentials, ValidationError> {
        CloudCredentials::new(
            self.cloud_auth_token.as_str(),
            self.cloud_host.as_str(),
            self.cloud_port,
        )
    }

    pub fn set_wifi(&mut self, wifi: &WifiCredentials) {
        self.wifi_password.zeroize();
        self.wifi_ssid = wifi.ssid.clone();
        self.wifi_password = wifi.password.clone();
    }

    pub fn set_cloud(&mut self, cloud: &CloudCredentials) {
        self.cloud_auth_token.zeroize();
        self.cloud_auth_token = cloud.auth_token.clone();
        self.cloud_host = cloud.host.clone();
        self.cloud_port = cloud.port;
    }

    /// Wipe the password and token in place.
    pub fn zeroize_secrets(&mut self) {
        self.wifi_password.zeroize();
        self.cloud_auth_token.zeroize();
    }

    /// Serialize for storage.
    ///
    /// Format: `[version:1][flags:1][suffix:4]` followed by length-prefixed
    /// `ssid`, `password`, `token`, `host`, then `[port:2 LE]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.configured {
            flags |= FLAG_CONFIGURED;
        }
        if self.self_test_passed {
            flags |= FLAG_SELF_TEST_PASSED;
        }
        if self.ssid_suffix_generated {
            flags |= FLAG_SUFFIX_GENERATED;
        }

        let mut bytes = Vec::with_capacity(
            2 + SSID_SUFFIX_LEN
                + 4
                + self.wifi_ssid.len()
                + self.wifi_password.len()
                + self.cloud_auth_token.len()
                + self.cloud_host.len()
                + 2,
        );
        bytes.push(RECORD_VERSION);
        bytes.push(flags);
        bytes.extend_from_slice(&self.ssid_suffix);
        for field in [
            &self.wifi_ssid,
            &self.wifi_password,
            &self.cloud_auth_token,
            &self.cloud_host,
        ] {
            // Field lengths are bounded by validation well below 255
            bytes.push(field.len().min(u8::MAX as usize) as u8);
            bytes.extend_from_slice(&field.as_bytes()[..field.len().min(u8::MAX as usize)]);
        }
        bytes.extend_from_slice(&self.cloud_port.to_le_bytes());
        bytes
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let mut reader = Reader { bytes, pos: 0 };

        let version = reader.byte("version")?;
        if version != RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion(version));
        }
        let flags = reader.byte("flags")?;

        let mut ssid_suffix = [0u8; SSID_SUFFIX_LEN];
        ssid_suffix.copy_from_slice(reader.take(SSID_SUFFIX_LEN, "suffix")?);
        if ssid_suffix.iter().any(|&i| usize::from(i) >= PALETTE_LEN) {
            return Err(RecordError::InvalidFormat("suffix index out of range".into()));
        }

        let wifi_ssid = reader.string("SSID")?;
        let wifi_password = reader.string("password")?;
        let cloud_auth_token = reader.string("token")?;
        let cloud_host = reader.string("host")?;
        let port = reader.take(2, "port")?;
        let cloud_port = u16::from_le_bytes([port[0], port[1]]);

        if reader.pos != bytes.len() {
            return Err(RecordError::InvalidFormat("trailing bytes".into()));
        }

        Ok(Self {
            configured: flags & FLAG_CONFIGURED != 0,
            self_test_passed: flags & FLAG_SELF_TEST_PASSED != 0,
            ssid_suffix_generated: flags & FLAG_SUFFIX_GENERATED != 0,
            ssid_suffix,
            wifi_ssid,
            wifi_password,
            cloud_auth_token,
            cloud_host,
            cloud_port,
        })
    }
}

impl Drop for ProvisioningRecord {
    fn drop(&mut self) {
        self.zeroize_secrets();
    }
}

impl fmt::Debug for ProvisioningRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningRecord")
            .field("configured", &self.configured)
            .field("self_test_passed", &self.self_test_passed)
            .field("ssid_suffix_generated", &self.ssid_suffix_generated)
            .field("ssid_suffix", &self.ssid_suffix)
            .field("wifi_ssid", &self.wifi_ssid)
            .field("wifi_password", &"****")
            .field("cloud_auth_token", &"****")
            .field("cloud_host", &self.cloud_host)
            .field("cloud_port", &self.cloud_port)
            .finish()
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], RecordError> {
        let end = self.pos + len;
        if end > self.bytes.len() {
            return Err(RecordError::InvalidFormat(format!("truncated {}", what)));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self, what: &str) -> Result<u8, RecordError> {
        Ok(self.take(1, what)?[0])
    }

    fn string(&mut self, what: &str) -> Result<String, RecordError> {
        let len = self.byte(what)? as usize;
        let raw = self.take(len, what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| RecordError::InvalidFormat(format!("invalid {} UTF-8", what)))
    }
}

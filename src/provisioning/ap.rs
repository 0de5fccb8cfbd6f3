//! Access point provisioning session.
//!
//! While the board is in config mode it runs a soft access point named after
//! its [`DeviceIdentity`] and a small HTTP portal. A companion device joins
//! the network and submits a [`CredentialSubmission`].

use super::identity::DeviceIdentity;
use crate::credentials::{
    parse_host, parse_port, validate_password, validate_ssid, validate_token, ValidationError,
};
use crate::store::ProvisioningRecord;
use log::{info, warn};
use percent_encoding::percent_decode_str;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Errors starting the access point.
#[derive(Debug, thiserror::Error)]
pub enum ApError {
    #[error("access point radio error: {0}")]
    Radio(String),
    #[error("config portal error: {0}")]
    Portal(String),
}

/// Soft access point together with its config endpoint.
pub trait AccessPoint {
    fn start(&mut self, identity: &DeviceIdentity) -> Result<(), ApError>;
    fn stop(&mut self);
}

/// Credential fields as submitted by a companion device.
///
/// Fields are raw text; [`apply_to`](Self::apply_to) validates them.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CredentialSubmission {
    pub ssid: String,
    pub password: String,
    /// Blank keeps the stored token.
    pub token: String,
    pub host: String,
    pub port: String,
}

fn form_decode(input: &str) -> String {
    let spaced = input.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

impl CredentialSubmission {
    /// Parse an `application/x-www-form-urlencoded` string, as used by both
    /// the query string and a form body.
    ///
    /// Recognized keys: `ssid`, `pass`, `blynk`, `host`, `port`.
    pub fn from_query(query: &str) -> Self {
        let mut submission = Self::default();
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = form_decode(value);
            match key {
                "ssid" => submission.ssid = value,
                "pass" => submission.password = value,
                "blynk" => submission.token = value,
                "host" => submission.host = value,
                "port" => submission.port = value,
                _ => {}
            }
        }
        submission
    }

    /// Validate every field and write them into `record`.
    ///
    /// Nothing is written unless all fields are valid.
    pub fn apply_to(&self, record: &mut ProvisioningRecord) -> Result<(), ValidationError> {
        validate_ssid(&self.ssid)?;
        validate_password(&self.password)?;
        let token = self.token.trim();
        if !token.is_empty() || !record.has_cloud_credentials() {
            validate_token(token)?;
        }
        let host = parse_host(&self.host)?;
        let port = parse_port(&self.port)?;

        record.wifi_ssid = self.ssid.clone();
        record.wifi_password.zeroize();
        record.wifi_password = self.password.clone();
        if !token.is_empty() {
            record.cloud_auth_token.zeroize();
            record.cloud_auth_token = token.to_string();
        }
        record.cloud_host = host;
        record.cloud_port = port;
        record.refresh_configured();
        Ok(())
    }
}

impl fmt::Debug for CredentialSubmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSubmission")
            .field("ssid", &self.ssid)
            .field("password", &"****")
            .field("token", &"****")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// Result returned to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Accepted,
    Invalid(String),
    SaveFailed(String),
    NotInConfigMode,
}

/// State of one access point window.
pub struct ApSession {
    identity: DeviceIdentity,
    active: bool,
    device_connected: bool,
}

impl ApSession {
    /// Bring up the access point for `identity`.
    ///
    /// A radio failure is logged and leaves the serial session as the only
    /// provisioning path.
    pub fn start(ap: &mut dyn AccessPoint, identity: DeviceIdentity) -> Self {
        let active = match ap.start(&identity) {
            Ok(()) => {
                info!("Access point {} up", identity.ssid());
                true
            }
            Err(e) => {
                warn!("Failed to start access point {}: {}", identity.ssid(), e);
                false
            }
        };
        Self {
            identity,
            active,
            device_connected: false,
        }
    }

    /// Take the access point down.
    pub fn stop(mut self, ap: &mut dyn AccessPoint) {
        if self.active {
            ap.stop();
            self.active = false;
            info!("Access point {} down", self.identity.ssid());
        }
    }

    /// Record that a companion device reached the portal. Returns true the
    /// first time.
    pub fn on_device_connected(&mut self) -> bool {
        let first = !self.device_connected;
        self.device_connected = true;
        first
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn device_connected(&self) -> bool {
        self.device_connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DEFAULT_CLOUD_HOST, DEFAULT_CLOUD_PORT};

    const TOKEN: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_from_query_decodes() {
        let s = CredentialSubmission::from_query(&format!(
            "ssid=My+Home%20Net&pass=p%40ss1234&blynk={}&host=&port=",
            TOKEN
        ));
        assert_eq!(s.ssid, "My Home Net");
        assert_eq!(s.password, "p@ss1234");
        assert_eq!(s.token, TOKEN);
        assert!(s.host.is_empty());
    }

    #[test]
    fn test_apply_fills_defaults() {
        let s = CredentialSubmission::from_query(&format!("ssid=Net&pass=&blynk={}", TOKEN));
        let mut record = ProvisioningRecord::default();
        s.apply_to(&mut record).unwrap();
        assert!(record.configured);
        assert_eq!(record.cloud_host, DEFAULT_CLOUD_HOST);
        assert_eq!(record.cloud_port, DEFAULT_CLOUD_PORT);
    }

    #[test]
    fn test_apply_rejects_bad_token_without_writing() {
        let s = CredentialSubmission::from_query("ssid=Net&pass=&blynk=short");
        let mut record = ProvisioningRecord::default();
        assert!(matches!(
            s.apply_to(&mut record),
            Err(ValidationError::TokenLength { .. })
        ));
        assert!(record.wifi_ssid.is_empty());
    }

    #[test]
    fn test_blank_token_keeps_stored_one() {
        let mut record = ProvisioningRecord::default();
        record.cloud_auth_token = TOKEN.into();
        let s = CredentialSubmission::from_query("ssid=Other&pass=password99");
        s.apply_to(&mut record).unwrap();
        assert_eq!(record.cloud_auth_token, TOKEN);
        assert_eq!(record.wifi_ssid, "Other");
    }

    #[test]
    fn test_blank_token_without_stored_one_is_invalid() {
        let s = CredentialSubmission::from_query("ssid=Net");
        assert!(s.apply_to(&mut ProvisioningRecord::default()).is_err());
    }

    #[test]
    fn test_debug_redacts() {
        let s = CredentialSubmission::from_query(&format!("ssid=Net&pass=hunter22&blynk={}", TOKEN));
        let debug = format!("{:?}", s);
        assert!(!debug.contains("hunter22"));
        assert!(!debug.contains(TOKEN));
    }

    struct FailingAp;

    impl AccessPoint for FailingAp {
        fn start(&mut self, _identity: &DeviceIdentity) -> Result<(), ApError> {
            Err(ApError::Radio("no radio".into()))
        }

        fn stop(&mut self) {
            panic!("stop called on an access point that never started");
        }
    }

    #[test]
    fn test_start_failure_is_not_fatal() {
        let identity = DeviceIdentity::from_indices([0, 0, 0, 0]).unwrap();
        let mut ap = FailingAp;
        let mut session = ApSession::start(&mut ap, identity);
        assert!(!session.is_active());
        assert!(session.on_device_connected());
        assert!(!session.on_device_connected());
        session.stop(&mut ap);
    }
}

//! Serial provisioning session.
//!
//! A line-oriented protocol over the serial console. In [`SerialState::Waiting`]
//! single characters select a command; in a field state characters collect in
//! a bounded line buffer until carriage return submits the field.
//!
//! ```text
//! Waiting --s--> WifiScan --scan done--> Waiting
//! Waiting --w--> WifiScan --scan done--> WifiNetwork --CR--> WifiPassword --CR--> Waiting (WiFi complete)
//! Waiting --b--> CloudToken --CR--> CloudHost --CR--> CloudPort --CR--> Waiting (cloud complete)
//! ```
//!
//! A field that fails validation is prompted again. ESC abandons the current
//! sub-flow.

use crate::credentials::{
    parse_host, parse_port, validate_password, validate_ssid, validate_token, ValidationError,
};
use crate::network::ScanEntry;
use crate::settings::{
    DEFAULT_CLOUD_HOST, DEFAULT_CLOUD_PORT, FIRMWARE_VERSION, HARDWARE_VERSION,
    SERIAL_RX_BUFFER_SIZE,
};
use crate::store::ProvisioningRecord;
use log::debug;
use std::fmt::Write as _;
use std::io::Write as _;
use zeroize::Zeroize;

const MESSAGE_SCANNING: &str = "Scanning for WiFi networks...\r\n";
const MESSAGE_WIFI_NETWORK: &str = "Type your WiFi network SSID and hit enter.\r\n";
const MESSAGE_WIFI_PASSWORD: &str = "Type your WiFi network password and hit enter.\r\n\
                                     (If connecting to an open network, leave blank.)\r\n";
const MESSAGE_CLOUD_TOKEN: &str = "Enter your 32-character Blynk Auth token.\r\n";
const MESSAGE_CANCELLED: &str = "Cancelled.\r\n";

/// Text output of the serial console.
pub trait Console {
    fn write_str(&mut self, text: &str);
}

/// Console on the process's stdout.
#[derive(Debug, Default)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn write_str(&mut self, text: &str) {
        let mut out = std::io::stdout();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialState {
    /// Waiting for a command character.
    Waiting,
    /// A network scan is running.
    WifiScan,
    WifiNetwork,
    WifiPassword,
    CloudToken,
    CloudHost,
    CloudPort,
}

/// Command characters accepted in [`SerialState::Waiting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Scan,
    Wifi,
    Cloud,
    Help,
    Unknown,
}

/// Input byte after classification against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Ignored,
    Char(u8),
    Erase,
    Submit,
    Cancel,
}

/// What the session does on a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Help,
    Scan { then_network: bool },
    Prompt,
    Push(u8),
    Erase,
    Commit,
    Cancel,
}

/// Classify a raw byte for `state`.
pub fn classify(state: SerialState, byte: u8) -> Input {
    match state {
        SerialState::Waiting => match byte {
            b's' => Input::Command(Command::Scan),
            b'w' => Input::Command(Command::Wifi),
            b'b' => Input::Command(Command::Cloud),
            b'h' => Input::Command(Command::Help),
            b'\r' | b'\n' | b' ' | b'\t' => Input::Ignored,
            _ => Input::Command(Command::Unknown),
        },
        SerialState::WifiScan => Input::Ignored,
        _ => match byte {
            b'\r' => Input::Submit,
            0x08 | 0x7f => Input::Erase,
            0x1b => Input::Cancel,
            0x20..=0x7e => Input::Char(byte),
            _ => Input::Ignored,
        },
    }
}

/// Transition table: `(state, input) -> (next state, action)`.
pub fn transition(state: SerialState, input: Input) -> (SerialState, Action) {
    use SerialState::*;
    match (state, input) {
        (_, Input::Ignored) => (state, Action::None),

        (Waiting, Input::Command(Command::Scan)) => (WifiScan, Action::Scan { then_network: false }),
        (Waiting, Input::Command(Command::Wifi)) => (WifiScan, Action::Scan { then_network: true }),
        (Waiting, Input::Command(Command::Cloud)) => (CloudToken, Action::Prompt),
        (Waiting, Input::Command(Command::Help | Command::Unknown)) => (Waiting, Action::Help),
        (Waiting, _) => (Waiting, Action::None),

        (WifiScan, _) => (WifiScan, Action::None),

        (field, Input::Char(byte)) => (field, Action::Push(byte)),
        (field, Input::Erase) => (field, Action::Erase),
        (field, Input::Submit) => (field, Action::Commit),
        (_, Input::Cancel) => (Waiting, Action::Cancel),
        (field, Input::Command(_)) => (field, Action::None),
    }
}

/// Request raised to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRequest {
    /// Scan for networks and report through [`SerialSession::scan_complete`].
    Scan,
    /// SSID and password are in the draft.
    WifiComplete,
    /// Token, host and port are in the draft.
    CloudComplete,
}

/// Text to write back and an optional request.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SerialReply {
    pub text: String,
    pub request: Option<SessionRequest>,
}

impl SerialReply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            request: None,
        }
    }
}

/// Help banner listing the commands.
pub fn help_text() -> String {
    format!(
        "Blynk Board - Serial Config (firmware {}, hardware {})\r\n\
         \x20 s: Scan for WiFi networks\r\n\
         \x20 w: Config WiFi network\r\n\
         \x20 b: Config Blynk Auth token, host and port\r\n\
         \x20 h: (This) Help menu\r\n",
        FIRMWARE_VERSION, HARDWARE_VERSION
    )
}

fn prompt(state: SerialState) -> String {
    match state {
        SerialState::Waiting => String::new(),
        SerialState::WifiScan => MESSAGE_SCANNING.to_string(),
        SerialState::WifiNetwork => MESSAGE_WIFI_NETWORK.to_string(),
        SerialState::WifiPassword => MESSAGE_WIFI_PASSWORD.to_string(),
        SerialState::CloudToken => MESSAGE_CLOUD_TOKEN.to_string(),
        SerialState::CloudHost => format!(
            "Enter the Blynk server host and hit enter.\r\n(Leave blank for {}.)\r\n",
            DEFAULT_CLOUD_HOST
        ),
        SerialState::CloudPort => format!(
            "Enter the Blynk server port and hit enter.\r\n(Leave blank for {}.)\r\n",
            DEFAULT_CLOUD_PORT
        ),
    }
}

/// Format scan results for the console.
pub fn format_scan(entries: &[ScanEntry]) -> String {
    if entries.is_empty() {
        return "No networks found.\r\n".to_string();
    }
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let _ = write!(out, "{:>3}: {} ({} dBm)", i + 1, entry.ssid, entry.rssi);
        if entry.open {
            out.push_str(" [open]");
        }
        out.push_str("\r\n");
    }
    out
}

/// Interactive provisioning over the serial console.
///
/// Entered fields are staged in a draft copy of the record; the supervisor
/// merges the completed part and persists it.
pub struct SerialSession {
    state: SerialState,
    buffer: String,
    draft: ProvisioningRecord,
    scan_then_network: bool,
}

impl SerialSession {
    /// Open a session. Returns the session and the banner to print.
    pub fn new(record: &ProvisioningRecord) -> (Self, String) {
        let session = Self {
            state: SerialState::Waiting,
            buffer: String::with_capacity(SERIAL_RX_BUFFER_SIZE),
            draft: record.clone(),
            scan_then_network: false,
        };
        (session, help_text())
    }

    pub fn state(&self) -> SerialState {
        self.state
    }

    /// Fields entered so far.
    pub fn draft(&self) -> &ProvisioningRecord {
        &self.draft
    }

    /// Feed one byte from the console.
    pub fn handle_byte(&mut self, byte: u8) -> SerialReply {
        let input = classify(self.state, byte);
        let (next, action) = transition(self.state, input);
        let from = self.state;
        self.state = next;

        match action {
            Action::None => SerialReply::default(),
            Action::Help => SerialReply::text(help_text()),
            Action::Scan { then_network } => {
                self.scan_then_network = then_network;
                SerialReply {
                    text: prompt(SerialState::WifiScan),
                    request: Some(SessionRequest::Scan),
                }
            }
            Action::Prompt => SerialReply::text(prompt(next)),
            Action::Push(byte) => {
                if self.buffer.len() >= SERIAL_RX_BUFFER_SIZE {
                    return SerialReply::default();
                }
                self.buffer.push(char::from(byte));
                let echo = if from == SerialState::WifiPassword {
                    '*'
                } else {
                    char::from(byte)
                };
                SerialReply::text(echo.to_string())
            }
            Action::Erase => {
                if self.buffer.pop().is_some() {
                    SerialReply::text("\x08 \x08")
                } else {
                    SerialReply::default()
                }
            }
            Action::Commit => self.commit(),
            Action::Cancel => {
                self.buffer.zeroize();
                SerialReply::text(format!("\r\n{}", MESSAGE_CANCELLED))
            }
        }
    }

    /// Report scan results requested by [`SessionRequest::Scan`].
    pub fn scan_complete(&mut self, entries: &[ScanEntry]) -> String {
        if self.state != SerialState::WifiScan {
            return String::new();
        }
        let mut text = format_scan(entries);
        text.push_str(&self.finish_scan());
        text
    }

    /// Report a failed scan. The network sub-flow continues without a list.
    pub fn scan_failed(&mut self, reason: &str) -> String {
        if self.state != SerialState::WifiScan {
            return String::new();
        }
        let mut text = format!("Scan failed: {}\r\n", reason);
        text.push_str(&self.finish_scan());
        text
    }

    /// Report that persisting the completed sub-flow failed.
    pub fn save_failed(&mut self, error: &dyn std::error::Error) -> String {
        self.state = SerialState::Waiting;
        format!(
            "Failed to save configuration: {}\r\nPlease try again.\r\n",
            error
        )
    }

    fn finish_scan(&mut self) -> String {
        if self.scan_then_network {
            self.state = SerialState::WifiNetwork;
            prompt(self.state)
        } else {
            self.state = SerialState::Waiting;
            String::new()
        }
    }

    fn commit(&mut self) -> SerialReply {
        let mut line = std::mem::take(&mut self.buffer);
        let result = self.apply_field(&line);
        line.zeroize();

        let mut text = String::from("\r\n");
        match result {
            Ok(next) => {
                let request = match (self.state, next) {
                    (SerialState::WifiPassword, SerialState::Waiting) => {
                        Some(SessionRequest::WifiComplete)
                    }
                    (SerialState::CloudPort, SerialState::Waiting) => {
                        Some(SessionRequest::CloudComplete)
                    }
                    _ => None,
                };
                self.state = next;
                text.push_str(&prompt(next));
                SerialReply { text, request }
            }
            Err(e) => {
                debug!("Serial field {:?} rejected: {}", self.state, e);
                let _ = write!(text, "Invalid input: {}\r\n", e);
                text.push_str(&prompt(self.state));
                SerialReply::text(text)
            }
        }
    }

    /// Validate `line` for the current field, store it, and return the next
    /// state.
    fn apply_field(&mut self, line: &str) -> Result<SerialState, ValidationError> {
        match self.state {
            SerialState::WifiNetwork => {
                validate_ssid(line)?;
                self.draft.wifi_ssid = line.to_string();
                Ok(SerialState::WifiPassword)
            }
            SerialState::WifiPassword => {
                validate_password(line)?;
                self.draft.wifi_password.zeroize();
                self.draft.wifi_password = line.to_string();
                Ok(SerialState::Waiting)
            }
            SerialState::CloudToken => {
                let token = line.trim();
                validate_token(token)?;
                self.draft.cloud_auth_token.zeroize();
                self.draft.cloud_auth_token = token.to_string();
                Ok(SerialState::CloudHost)
            }
            SerialState::CloudHost => {
                self.draft.cloud_host = parse_host(line)?;
                Ok(SerialState::CloudPort)
            }
            SerialState::CloudPort => {
                self.draft.cloud_port = parse_port(line)?;
                Ok(SerialState::Waiting)
            }
            SerialState::Waiting | SerialState::WifiScan => Ok(self.state),
        }
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.buffer.zeroize();
    }
}

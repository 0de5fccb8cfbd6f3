//! Connectivity supervisor.
//!
//! The [`Supervisor`] owns the run mode, the provisioning record and every
//! collaborator. It is the only writer of either: timers, the portal thread
//! and the serial reader post [`Event`]s, and the main loop hands them to
//! [`Supervisor::handle`] and calls [`Supervisor::poll`] every iteration.
//!
//! ```text
//!             SelfTest ──fail──> Error (fatal)
//!                │ pass
//!                v
//!           WaitConfig ──unconfigured──> Config <──> ConfigDeviceConnected
//!                │ configured               │ credentials saved
//!                v                          v
//!         ConnectingWifi ──associated──> ConnectingCloud ──active──> Running
//!                │ fail/timeout               │ fail/timeout           │ dropped
//!                v                            v                        v
//!              Error ──display window──> retry stage or Config   ConnectingCloud
//! ```
//!
//! Holding the button in a connecting mode, `Running` or a non-fatal `Error`
//! enters `ButtonHold`; a release before the threshold restores the previous
//! mode, holding past it forces `Config`.

mod button;
mod deadline;

pub use button::ButtonTracker;
pub use deadline::Deadline;
pub use self_test::{NoopSelfTest, SelfTest, SelfTestStatus};

use crate::event::Event;
use crate::indicator::Indicator;
use crate::mode::{ConnectStatus, Fault, RunMode};
use crate::network::{AssociationStatus, CloudSession, Network, SessionStatus};
use crate::provisioning::{
    generate_identity, AccessPoint, ApSession, Console, CredentialSubmission, DeviceIdentity,
    SerialSession, SerialState, SessionRequest, SubmissionOutcome,
};
use crate::settings::{
    BUTTON_HOLD_THRESHOLD, CLOUD_CONNECT_TIMEOUT, ERROR_DISPLAY_INTERVAL, WIFI_CONNECT_TIMEOUT,
};
use crate::store::{ConfigStore, ProvisioningRecord};
use log::{debug, error, info, warn};
use rand_core::RngCore;
use std::time::{Duration, Instant};

/// Runtime tunables.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub wifi_timeout: Duration,
    pub cloud_timeout: Duration,
    /// How long `Error` is shown before re-evaluating.
    pub error_display: Duration,
    pub button_hold: Duration,
    /// Run the first-boot self-test.
    pub self_test_enabled: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            wifi_timeout: WIFI_CONNECT_TIMEOUT,
            cloud_timeout: CLOUD_CONNECT_TIMEOUT,
            error_display: ERROR_DISPLAY_INTERVAL,
            button_hold: BUTTON_HOLD_THRESHOLD,
            self_test_enabled: false,
        }
    }
}

/// External collaborators the supervisor drives.
pub struct Collaborators {
    pub network: Box<dyn Network>,
    pub cloud: Box<dyn CloudSession>,
    pub access_point: Box<dyn AccessPoint>,
    pub console: Box<dyn Console>,
    pub self_test: Box<dyn SelfTest>,
    /// Random source for the device identity.
    pub rng: Box<dyn RngCore>,
}

/// The run-mode state machine.
pub struct Supervisor {
    config: SupervisorConfig,
    store: ConfigStore,
    record: ProvisioningRecord,
    indicator: Indicator,

    network: Box<dyn Network>,
    cloud: Box<dyn CloudSession>,
    access_point: Box<dyn AccessPoint>,
    console: Box<dyn Console>,
    self_test: Box<dyn SelfTest>,
    rng: Box<dyn RngCore>,

    mode: RunMode,
    previous_mode: RunMode,
    fault: Option<Fault>,
    started: bool,
    /// Deadline of the association or handshake in progress.
    attempt: Option<Deadline>,
    /// End of the error display window.
    error_until: Option<Deadline>,
    button: ButtonTracker,

    identity: Option<DeviceIdentity>,
    serial: Option<SerialSession>,
    ap: Option<ApSession>,
    /// The stored credentials reached `Running` since the last provisioning.
    has_run: bool,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        store: ConfigStore,
        indicator: Indicator,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            network,
            cloud,
            access_point,
            console,
            self_test,
            rng,
        } = collaborators;

        Self {
            config,
            store,
            record: ProvisioningRecord::default(),
            indicator,
            network,
            cloud,
            access_point,
            console,
            self_test,
            rng,
            mode: RunMode::WaitConfig,
            previous_mode: RunMode::WaitConfig,
            fault: None,
            started: false,
            attempt: None,
            error_until: None,
            button: ButtonTracker::new(),
            identity: None,
            serial: None,
            ap: None,
            has_run: false,
        }
    }

    /// Load the record and make the first transition.
    pub fn start(&mut self, now: Instant) {
        if self.started {
            return;
        }
        self.started = true;
        self.record = self.store.load();

        if self.config.self_test_enabled && !self.record.self_test_passed {
            info!("First boot, running self-test");
            self.transition(RunMode::SelfTest, now);
        } else {
            self.transition(RunMode::WaitConfig, now);
        }
    }

    // ==================== Accessors ====================

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn previous_mode(&self) -> RunMode {
        self.previous_mode
    }

    /// Fault behind the current (or restorable) `Error`.
    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    /// Status value exposed to project code.
    pub fn connect_status(&self) -> Option<ConnectStatus> {
        match self.mode {
            RunMode::Running => Some(ConnectStatus::Success),
            RunMode::Error => self.fault.and_then(Fault::connect_status),
            _ => None,
        }
    }

    pub fn record(&self) -> &ProvisioningRecord {
        &self.record
    }

    pub fn indicator(&self) -> &Indicator {
        &self.indicator
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// State of the serial session, `None` outside config mode.
    pub fn serial_state(&self) -> Option<SerialState> {
        self.serial.as_ref().map(SerialSession::state)
    }

    pub fn ap_session(&self) -> Option<&ApSession> {
        self.ap.as_ref()
    }

    // ==================== Events ====================

    /// Dispatch one event from the main loop.
    pub fn handle(&mut self, event: Event, now: Instant) {
        match event {
            Event::SerialByte(byte) => self.on_serial_byte(byte, now),
            Event::Button { pressed: true } => self.on_button_pressed(now),
            Event::Button { pressed: false } => self.on_button_released(now),
            Event::BlinkTick(generation) => {
                self.indicator.on_tick(generation);
            }
            Event::ApClientConnected => self.on_ap_client(now),
            Event::ApCredentials { submission, reply } => {
                let outcome = self.accept_credentials(&submission);
                let accepted = outcome == SubmissionOutcome::Accepted;
                if let Some(reply) = reply {
                    // The portal may have given up waiting
                    let _ = reply.send(outcome);
                }
                // Leaving config mode shuts the portal down, so it is
                // answered first
                if accepted {
                    self.transition(RunMode::ConnectingWifi, now);
                }
            }
            Event::ProjectOverride(active) => self.indicator.set_project_override(active),
        }
    }

    fn on_serial_byte(&mut self, byte: u8, now: Instant) {
        let Some(session) = self.serial.as_mut() else {
            debug!("Serial byte 0x{:02x} outside config mode ignored", byte);
            return;
        };
        let reply = session.handle_byte(byte);
        self.console.write_str(&reply.text);

        match reply.request {
            None => {}
            Some(SessionRequest::Scan) => self.serial_scan(),
            Some(SessionRequest::WifiComplete) => self.commit_serial_wifi(now),
            Some(SessionRequest::CloudComplete) => self.commit_serial_cloud(now),
        }
    }

    fn serial_scan(&mut self) {
        let result = self.network.scan();
        let Some(session) = self.serial.as_mut() else {
            return;
        };
        let text = match result {
            Ok(entries) => {
                debug!("Scan found {} networks", entries.len());
                session.scan_complete(&entries)
            }
            Err(e) => {
                warn!("WiFi scan failed: {}", e);
                session.scan_failed(&e.to_string())
            }
        };
        self.console.write_str(&text);
    }

    fn commit_serial_wifi(&mut self, now: Instant) {
        let Some(session) = self.serial.as_ref() else {
            return;
        };
        let wifi = match session.draft().wifi_credentials() {
            Ok(wifi) => wifi,
            Err(e) => {
                warn!("Serial WiFi draft rejected: {}", e);
                return;
            }
        };

        let mut record = self.record.clone();
        record.set_wifi(&wifi);
        record.refresh_configured();
        if !self.save_from_serial(record) {
            return;
        }

        if self.record.configured {
            self.console.write_str("WiFi settings saved.\r\n");
            self.transition(RunMode::ConnectingWifi, now);
        } else {
            self.console
                .write_str("WiFi settings saved. Enter your Blynk Auth token with 'b'.\r\n");
        }
    }

    fn commit_serial_cloud(&mut self, now: Instant) {
        let Some(session) = self.serial.as_ref() else {
            return;
        };
        let cloud = match session.draft().cloud_credentials() {
            Ok(cloud) => cloud,
            Err(e) => {
                warn!("Serial cloud draft rejected: {}", e);
                return;
            }
        };

        let mut record = self.record.clone();
        record.set_cloud(&cloud);
        record.refresh_configured();
        if !self.save_from_serial(record) {
            return;
        }

        if self.record.configured {
            self.console.write_str("Blynk settings saved.\r\n");
            let next = self.cloud_stage();
            self.transition(next, now);
        } else {
            self.console
                .write_str("Blynk settings saved. Configure your WiFi network with 'w'.\r\n");
        }
    }

    /// Persist a record staged by the serial session. On failure the session
    /// reports it and returns to `Waiting`.
    fn save_from_serial(&mut self, record: ProvisioningRecord) -> bool {
        match self.store.save(&record) {
            Ok(()) => {
                self.record = record;
                true
            }
            Err(e) => {
                error!("Failed to save configuration: {}", e);
                if let Some(session) = self.serial.as_mut() {
                    let text = session.save_failed(&e);
                    self.console.write_str(&text);
                }
                false
            }
        }
    }

    fn on_ap_client(&mut self, now: Instant) {
        let Some(ap) = self.ap.as_mut() else {
            return;
        };
        if ap.on_device_connected() && self.mode == RunMode::Config {
            self.transition(RunMode::ConfigDeviceConnected, now);
        }
    }

    /// Save credentials from the config portal and start connecting.
    pub fn on_credentials_received(
        &mut self,
        submission: &CredentialSubmission,
        now: Instant,
    ) -> SubmissionOutcome {
        let outcome = self.accept_credentials(submission);
        if outcome == SubmissionOutcome::Accepted {
            self.transition(RunMode::ConnectingWifi, now);
        }
        outcome
    }

    /// Validate and save a submission without leaving config mode.
    fn accept_credentials(&mut self, submission: &CredentialSubmission) -> SubmissionOutcome {
        if !self.mode.is_config() {
            warn!("Credentials received in {} mode, ignored", self.mode);
            return SubmissionOutcome::NotInConfigMode;
        }

        let mut record = self.record.clone();
        if let Err(e) = submission.apply_to(&mut record) {
            info!("Portal submission rejected: {}", e);
            return SubmissionOutcome::Invalid(e.to_string());
        }
        if let Err(e) = self.store.save(&record) {
            error!("Failed to save portal credentials: {}", e);
            return SubmissionOutcome::SaveFailed(e.to_string());
        }

        self.record = record;
        info!("Credentials received for '{}'", self.record.wifi_ssid);
        SubmissionOutcome::Accepted
    }

    fn on_button_pressed(&mut self, now: Instant) {
        let fatal = self.fault.is_some_and(Fault::is_fatal);
        if !self.mode.accepts_button_hold() || fatal {
            debug!("Button press in {} mode ignored", self.mode);
            return;
        }
        self.button.press(now);
        self.transition(RunMode::ButtonHold, now);
    }

    fn on_button_released(&mut self, now: Instant) {
        if self.mode != RunMode::ButtonHold {
            self.button.reset();
            return;
        }
        let held = self.button.release(now).unwrap_or_default();
        if held >= self.config.button_hold {
            info!("Button held for {} ms, entering config mode", held.as_millis());
            self.transition(RunMode::Config, now);
        } else {
            debug!("Button released after {} ms", held.as_millis());
            let restore = self.previous_mode;
            self.transition(restore, now);
        }
    }

    // ==================== Polling ====================

    /// Check deadlines and collaborator status. Call every loop iteration.
    pub fn poll(&mut self, now: Instant) {
        match self.mode {
            RunMode::SelfTest => self.poll_self_test(now),
            RunMode::ConnectingWifi => match self.network.association_status() {
                AssociationStatus::Connected => self.transition(RunMode::ConnectingCloud, now),
                AssociationStatus::Failed => self.fail(Fault::WifiAssociationFailure, now),
                AssociationStatus::Pending => {
                    if self.attempt.is_some_and(|d| d.expired(now)) {
                        self.fail(Fault::WifiAssociationTimeout, now);
                    }
                }
            },
            RunMode::ConnectingCloud => match self.cloud.session_status() {
                SessionStatus::Active => self.transition(RunMode::Running, now),
                SessionStatus::Rejected | SessionStatus::Dropped => {
                    self.fail(Fault::CloudHandshakeRejection, now)
                }
                SessionStatus::Pending => {
                    if self.attempt.is_some_and(|d| d.expired(now)) {
                        self.fail(Fault::CloudHandshakeTimeout, now);
                    }
                }
            },
            RunMode::Running => {
                if self.network.association_status() != AssociationStatus::Connected {
                    warn!("WiFi association lost");
                    self.transition(RunMode::ConnectingWifi, now);
                } else if matches!(
                    self.cloud.session_status(),
                    SessionStatus::Dropped | SessionStatus::Rejected
                ) {
                    warn!("Cloud session dropped");
                    self.transition(RunMode::ConnectingCloud, now);
                }
            }
            RunMode::ButtonHold => {
                if self
                    .button
                    .held_for(now)
                    .is_some_and(|held| held >= self.config.button_hold)
                {
                    self.button.reset();
                    info!("Button held, entering config mode");
                    self.transition(RunMode::Config, now);
                }
            }
            RunMode::Error => {
                if self.error_until.is_some_and(|d| d.expired(now)) {
                    self.error_until = None;
                    let next = self.after_error();
                    self.transition(next, now);
                }
            }
            RunMode::WaitConfig | RunMode::Config | RunMode::ConfigDeviceConnected => {}
        }
    }

    fn poll_self_test(&mut self, now: Instant) {
        match self.self_test.poll() {
            SelfTestStatus::Running => {}
            SelfTestStatus::Passed => {
                info!("Self-test passed");
                self.record.self_test_passed = true;
                if let Err(e) = self.store.save(&self.record) {
                    error!("Failed to persist self-test result: {}", e);
                }
                self.transition(RunMode::WaitConfig, now);
            }
            SelfTestStatus::Failed(reason) => {
                error!("Self-test failed: {}", reason);
                self.fail(Fault::SelfTestFailure, now);
            }
        }
    }

    /// Where to go when the error window closes.
    ///
    /// Credentials that have reached `Running` since they were provisioned are
    /// retried from the failed stage. Credentials that never worked send the
    /// board back to config mode.
    ///
    /// `has_run` lives in memory only, so a board that reboots into a WiFi
    /// outage lands in config mode after its first failed attempt even when
    /// the stored credentials worked before the reboot.
    fn after_error(&mut self) -> RunMode {
        let Some(fault) = self.fault else {
            return RunMode::Config;
        };
        if !self.record.configured || !self.has_run {
            return RunMode::Config;
        }
        if fault.is_cloud() {
            self.cloud_stage()
        } else {
            RunMode::ConnectingWifi
        }
    }

    /// `ConnectingCloud` when the network is already associated.
    fn cloud_stage(&mut self) -> RunMode {
        if self.network.association_status() == AssociationStatus::Connected {
            RunMode::ConnectingCloud
        } else {
            RunMode::ConnectingWifi
        }
    }

    // ==================== Transitions ====================

    fn fail(&mut self, fault: Fault, now: Instant) {
        self.fault = Some(fault);
        self.transition(RunMode::Error, now);
    }

    fn transition(&mut self, to: RunMode, now: Instant) {
        let from = self.mode;
        self.exit(from, to);

        self.previous_mode = from;
        self.mode = to;
        if !matches!(to, RunMode::Error | RunMode::ButtonHold) {
            self.fault = None;
        }
        if to == RunMode::Config {
            self.ensure_identity();
        }

        info!("Run mode: {} -> {}", from, to);
        self.indicator.set_mode(to, self.fault);
        self.enter(to, now);
    }

    fn exit(&mut self, from: RunMode, to: RunMode) {
        match from {
            RunMode::ConnectingWifi => {
                self.attempt = None;
                if to != RunMode::ConnectingCloud {
                    self.network.abort();
                }
            }
            RunMode::ConnectingCloud => {
                self.attempt = None;
                if to != RunMode::Running {
                    self.cloud.abort();
                }
            }
            RunMode::Running => {
                if to != RunMode::ButtonHold {
                    self.cloud.abort();
                }
            }
            RunMode::Error => self.error_until = None,
            RunMode::Config | RunMode::ConfigDeviceConnected => {
                if !to.is_config() {
                    self.close_provisioning();
                }
            }
            RunMode::SelfTest | RunMode::WaitConfig | RunMode::ButtonHold => {}
        }
    }

    fn enter(&mut self, to: RunMode, now: Instant) {
        match to {
            RunMode::SelfTest | RunMode::ButtonHold | RunMode::ConfigDeviceConnected => {}
            RunMode::WaitConfig => {
                let configured = self.store.is_configured();
                if configured && self.record.configured {
                    self.transition(RunMode::ConnectingWifi, now);
                } else {
                    if configured {
                        warn!("Configured flag set but stored record is incomplete");
                    }
                    self.transition(RunMode::Config, now);
                }
            }
            RunMode::Config => {
                self.network.abort();
                self.cloud.abort();
                self.has_run = false;
                self.open_provisioning();
            }
            RunMode::ConnectingWifi => self.begin_association(now),
            RunMode::ConnectingCloud => self.begin_session(now),
            RunMode::Running => {
                self.has_run = true;
                info!(
                    "Connected to cloud (status {})",
                    ConnectStatus::Success.code()
                );
            }
            RunMode::Error => match self.fault {
                Some(fault) if fault.is_fatal() => {
                    error!("{}; halting in error mode", fault);
                }
                Some(fault) => {
                    let code = fault.connect_status().map(ConnectStatus::code).unwrap_or(0);
                    warn!("{} (status {})", fault, code);
                    self.error_until = Some(Deadline::new(now, self.config.error_display));
                }
                None => {
                    self.error_until = Some(Deadline::new(now, self.config.error_display));
                }
            },
        }
    }

    fn begin_association(&mut self, now: Instant) {
        let wifi = match self.record.wifi_credentials() {
            Ok(wifi) => wifi,
            Err(e) => {
                warn!("Stored WiFi credentials unusable: {}", e);
                return self.fail(Fault::WifiAssociationFailure, now);
            }
        };
        if let Err(e) = self.network.begin_association(&wifi) {
            warn!("Failed to start WiFi association: {}", e);
            return self.fail(Fault::WifiAssociationFailure, now);
        }
        self.attempt = Some(Deadline::new(now, self.config.wifi_timeout));
    }

    fn begin_session(&mut self, now: Instant) {
        let cloud = match self.record.cloud_credentials() {
            Ok(cloud) => cloud,
            Err(e) => {
                warn!("Stored cloud credentials unusable: {}", e);
                return self.fail(Fault::CloudCredentialsMissing, now);
            }
        };
        if let Err(e) = self.cloud.begin_session(&cloud) {
            warn!("Failed to start cloud session: {}", e);
            return self.fail(Fault::CloudHandshakeRejection, now);
        }
        self.attempt = Some(Deadline::new(now, self.config.cloud_timeout));
    }

    fn ensure_identity(&mut self) {
        if self.identity.is_some() {
            return;
        }
        let identity = generate_identity(&mut self.store, &mut self.record, &mut *self.rng);
        self.indicator.set_identity_pattern(identity.colors());
        self.identity = Some(identity);
    }

    fn open_provisioning(&mut self) {
        if self.ap.is_none() {
            if let Some(identity) = self.identity {
                self.ap = Some(ApSession::start(&mut *self.access_point, identity));
            }
        }
        if self.serial.is_none() {
            let (session, banner) = SerialSession::new(&self.record);
            self.console.write_str(&banner);
            self.serial = Some(session);
        }
    }

    fn close_provisioning(&mut self) {
        if let Some(ap) = self.ap.take() {
            ap.stop(&mut *self.access_point);
        }
        self.serial = None;
    }
}

#[cfg(test)]
mod tests;

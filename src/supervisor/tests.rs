use super::*;
use crate::indicator::{BlinkScheduler, Blink, Rgb, StatusLed, COLOR_CONNECTED_CLOUD};
use crate::credentials::{CloudCredentials, WifiCredentials};
use crate::network::{NetworkError, ScanEntry};
use crate::provisioning::ApError;
use crate::store::MemoryStorage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;

const TOKEN: &str = "0123456789abcdef0123456789abcdef";

// ==================== Fakes ====================

struct NetState {
    status: AssociationStatus,
    begins: usize,
    aborts: usize,
    scan: Vec<ScanEntry>,
}

struct FakeNetwork(Rc<RefCell<NetState>>);

impl Network for FakeNetwork {
    fn begin_association(&mut self, _credentials: &WifiCredentials) -> Result<(), NetworkError> {
        let mut state = self.0.borrow_mut();
        state.begins += 1;
        state.status = AssociationStatus::Pending;
        Ok(())
    }

    fn association_status(&mut self) -> AssociationStatus {
        self.0.borrow().status
    }

    fn abort(&mut self) {
        let mut state = self.0.borrow_mut();
        state.aborts += 1;
        state.status = AssociationStatus::Pending;
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, NetworkError> {
        Ok(self.0.borrow().scan.clone())
    }
}

struct CloudState {
    status: SessionStatus,
    begins: usize,
    aborts: usize,
}

struct FakeCloud(Rc<RefCell<CloudState>>);

impl CloudSession for FakeCloud {
    fn begin_session(&mut self, _credentials: &CloudCredentials) -> Result<(), NetworkError> {
        let mut state = self.0.borrow_mut();
        state.begins += 1;
        state.status = SessionStatus::Pending;
        Ok(())
    }

    fn session_status(&mut self) -> SessionStatus {
        self.0.borrow().status
    }

    fn abort(&mut self) {
        let mut state = self.0.borrow_mut();
        state.aborts += 1;
        state.status = SessionStatus::Dropped;
    }
}

#[derive(Default)]
struct ApState {
    starts: Vec<String>,
    stops: usize,
}

struct FakeAp(Rc<RefCell<ApState>>);

impl AccessPoint for FakeAp {
    fn start(&mut self, identity: &DeviceIdentity) -> Result<(), ApError> {
        self.0.borrow_mut().starts.push(identity.ssid());
        Ok(())
    }

    fn stop(&mut self) {
        self.0.borrow_mut().stops += 1;
    }
}

struct FakeConsole(Rc<RefCell<String>>);

impl Console for FakeConsole {
    fn write_str(&mut self, text: &str) {
        self.0.borrow_mut().push_str(text);
    }
}

struct FakeSelfTest(Rc<RefCell<SelfTestStatus>>);

impl SelfTest for FakeSelfTest {
    fn poll(&mut self) -> SelfTestStatus {
        self.0.borrow().clone()
    }
}

struct FakeLed(Rc<RefCell<Vec<Rgb>>>);

impl StatusLed for FakeLed {
    fn set_color(&mut self, color: Rgb) {
        self.0.borrow_mut().push(color);
    }
}

struct NullScheduler;

impl BlinkScheduler for NullScheduler {
    fn schedule_periodic(&mut self, _period: Duration, _generation: u64) {}
    fn cancel_periodic(&mut self) {}
}

// ==================== Harness ====================

struct Harness {
    supervisor: Supervisor,
    storage: MemoryStorage,
    net: Rc<RefCell<NetState>>,
    cloud: Rc<RefCell<CloudState>>,
    ap: Rc<RefCell<ApState>>,
    console: Rc<RefCell<String>>,
    self_test: Rc<RefCell<SelfTestStatus>>,
    leds: Rc<RefCell<Vec<Rgb>>>,
    t0: Instant,
}

impl Harness {
    fn new(storage: MemoryStorage, config: SupervisorConfig) -> Self {
        Self::build(storage, config, None)
    }

    /// Harness with a real access point in place of the counting fake.
    fn with_access_point(access_point: Box<dyn AccessPoint>) -> Self {
        Self::build(MemoryStorage::new(), SupervisorConfig::default(), Some(access_point))
    }

    fn build(
        storage: MemoryStorage,
        config: SupervisorConfig,
        access_point: Option<Box<dyn AccessPoint>>,
    ) -> Self {
        let net = Rc::new(RefCell::new(NetState {
            status: AssociationStatus::Pending,
            begins: 0,
            aborts: 0,
            scan: vec![ScanEntry {
                ssid: "HomeNetwork".into(),
                rssi: -52,
                open: false,
            }],
        }));
        let cloud = Rc::new(RefCell::new(CloudState {
            status: SessionStatus::Dropped,
            begins: 0,
            aborts: 0,
        }));
        let ap = Rc::new(RefCell::new(ApState::default()));
        let console = Rc::new(RefCell::new(String::new()));
        let self_test = Rc::new(RefCell::new(SelfTestStatus::Running));
        let leds = Rc::new(RefCell::new(Vec::new()));

        let access_point: Box<dyn AccessPoint> = match access_point {
            Some(access_point) => access_point,
            None => Box::new(FakeAp(ap.clone())),
        };

        let indicator = Indicator::new(Box::new(FakeLed(leds.clone())), Box::new(NullScheduler));
        let collaborators = Collaborators {
            network: Box::new(FakeNetwork(net.clone())),
            cloud: Box::new(FakeCloud(cloud.clone())),
            access_point,
            console: Box::new(FakeConsole(console.clone())),
            self_test: Box::new(FakeSelfTest(self_test.clone())),
            rng: Box::new(StdRng::seed_from_u64(7)),
        };
        let store = ConfigStore::new(Box::new(storage.clone()));

        Self {
            supervisor: Supervisor::new(config, store, indicator, collaborators),
            storage,
            net,
            cloud,
            ap,
            console,
            self_test,
            leds,
            t0: Instant::now(),
        }
    }

    fn at(&self, ms: u64) -> Instant {
        self.t0 + Duration::from_millis(ms)
    }

    fn start(&mut self) {
        let now = self.t0;
        self.supervisor.start(now);
    }

    fn poll(&mut self, ms: u64) -> RunMode {
        let now = self.at(ms);
        self.supervisor.poll(now);
        self.supervisor.mode()
    }

    fn send(&mut self, event: Event, ms: u64) {
        let now = self.at(ms);
        self.supervisor.handle(event, now);
    }

    fn type_text(&mut self, text: &str, ms: u64) {
        for byte in text.bytes() {
            self.send(Event::SerialByte(byte), ms);
        }
    }

    fn stored(&self) -> ProvisioningRecord {
        ConfigStore::new(Box::new(self.storage.clone())).load()
    }

    /// Drive a configured board to `Running` at t = 2 s.
    fn run_to_running(&mut self) {
        self.start();
        assert_eq!(self.supervisor.mode(), RunMode::ConnectingWifi);
        self.net.borrow_mut().status = AssociationStatus::Connected;
        assert_eq!(self.poll(1000), RunMode::ConnectingCloud);
        self.cloud.borrow_mut().status = SessionStatus::Active;
        assert_eq!(self.poll(2000), RunMode::Running);
    }
}

fn provisioned_record() -> ProvisioningRecord {
    let mut record = ProvisioningRecord::default();
    record.wifi_ssid = "HomeNetwork".into();
    record.wifi_password = "password123".into();
    record.cloud_auth_token = TOKEN.into();
    record.refresh_configured();
    record
}

fn configured_storage() -> MemoryStorage {
    let storage = MemoryStorage::new();
    let mut store = ConfigStore::new(Box::new(storage.clone()));
    store.save(&provisioned_record()).unwrap();
    storage
}

fn fresh() -> Harness {
    Harness::new(MemoryStorage::new(), SupervisorConfig::default())
}

fn configured() -> Harness {
    Harness::new(configured_storage(), SupervisorConfig::default())
}

// ==================== Boot ====================

#[test]
fn test_fresh_device_boots_into_config() {
    let mut h = fresh();
    h.start();

    assert_eq!(h.supervisor.mode(), RunMode::Config);
    assert_eq!(h.net.borrow().begins, 0);
    assert_eq!(h.ap.borrow().starts.len(), 1);
    assert!(h.ap.borrow().starts[0].starts_with("BlynkMe"));
    assert_eq!(h.supervisor.serial_state(), Some(SerialState::Waiting));
    assert!(h.console.borrow().contains("Serial Config"));

    // Identity was persisted on the way in
    let stored = h.stored();
    assert!(stored.ssid_suffix_generated);
    assert_eq!(
        h.supervisor.identity().map(|i| i.indices()),
        Some(stored.ssid_suffix)
    );
}

#[test]
fn test_identity_survives_reboot() {
    let storage = MemoryStorage::new();
    let mut first = Harness::new(storage.clone(), SupervisorConfig::default());
    first.start();
    let ssid = first.ap.borrow().starts[0].clone();
    drop(first);

    let mut second = Harness::new(storage, SupervisorConfig::default());
    second.start();
    assert_eq!(second.ap.borrow().starts[0], ssid);
}

#[test]
fn test_configured_device_connects_to_running() {
    let mut h = configured();
    h.start();
    assert_eq!(h.supervisor.mode(), RunMode::ConnectingWifi);
    assert_eq!(h.net.borrow().begins, 1);
    assert!(h.ap.borrow().starts.is_empty());

    assert_eq!(h.poll(2500), RunMode::ConnectingWifi);
    h.net.borrow_mut().status = AssociationStatus::Connected;
    assert_eq!(h.poll(5000), RunMode::ConnectingCloud);
    assert_eq!(h.cloud.borrow().begins, 1);

    h.cloud.borrow_mut().status = SessionStatus::Active;
    assert_eq!(h.poll(7000), RunMode::Running);
    assert_eq!(h.supervisor.connect_status(), Some(ConnectStatus::Success));

    let spec = h.supervisor.indicator().spec().unwrap();
    assert_eq!(spec.color, COLOR_CONNECTED_CLOUD);
    assert_eq!(spec.blink, Blink::Solid);
    assert_eq!(h.leds.borrow().last(), Some(&COLOR_CONNECTED_CLOUD));
}

#[test]
fn test_wifi_timeout_falls_back_to_config() {
    let mut h = configured();
    h.start();

    assert_eq!(h.poll(29_999), RunMode::ConnectingWifi);
    assert_eq!(h.poll(30_000), RunMode::ConnectingWifi);
    assert_eq!(h.poll(30_001), RunMode::Error);
    assert_eq!(h.supervisor.fault(), Some(Fault::WifiAssociationTimeout));
    assert_eq!(
        h.supervisor.connect_status(),
        Some(ConnectStatus::WifiConnectError)
    );
    assert!(h.net.borrow().aborts >= 1);

    // Error display window, then config mode
    assert_eq!(h.poll(35_001), RunMode::Error);
    assert_eq!(h.poll(35_002), RunMode::Config);
    assert_eq!(h.supervisor.fault(), None);
    assert_eq!(h.net.borrow().begins, 1);
}

#[test]
fn test_association_failure_is_wifi_error() {
    let mut h = configured();
    h.start();
    h.net.borrow_mut().status = AssociationStatus::Failed;
    assert_eq!(h.poll(100), RunMode::Error);
    assert_eq!(h.supervisor.fault(), Some(Fault::WifiAssociationFailure));
}

#[test]
fn test_cloud_timeout() {
    let mut h = configured();
    h.start();
    h.net.borrow_mut().status = AssociationStatus::Connected;
    assert_eq!(h.poll(1000), RunMode::ConnectingCloud);

    assert_eq!(h.poll(16_000), RunMode::ConnectingCloud);
    assert_eq!(h.poll(16_001), RunMode::Error);
    assert_eq!(h.supervisor.fault(), Some(Fault::CloudHandshakeTimeout));
    assert_eq!(
        h.supervisor.connect_status(),
        Some(ConnectStatus::BlynkConnectError)
    );
}

// ==================== Running ====================

#[test]
fn test_dropped_session_reconnects_cloud() {
    let mut h = configured();
    h.run_to_running();

    h.cloud.borrow_mut().status = SessionStatus::Dropped;
    assert_eq!(h.poll(3000), RunMode::ConnectingCloud);
    assert_eq!(h.cloud.borrow().begins, 2);
    assert_eq!(h.net.borrow().begins, 1);
}

#[test]
fn test_lost_association_reconnects_wifi() {
    let mut h = configured();
    h.run_to_running();

    h.net.borrow_mut().status = AssociationStatus::Pending;
    assert_eq!(h.poll(3000), RunMode::ConnectingWifi);
    assert_eq!(h.net.borrow().begins, 2);
}

#[test]
fn test_error_after_running_retries_failed_stage() {
    let mut h = configured();
    h.run_to_running();

    h.cloud.borrow_mut().status = SessionStatus::Dropped;
    assert_eq!(h.poll(3000), RunMode::ConnectingCloud);
    h.cloud.borrow_mut().status = SessionStatus::Rejected;
    assert_eq!(h.poll(3100), RunMode::Error);
    assert_eq!(h.supervisor.fault(), Some(Fault::CloudHandshakeRejection));

    // Network still associated, so only the cloud stage is retried
    assert_eq!(h.poll(8101), RunMode::ConnectingCloud);
    assert_eq!(h.cloud.borrow().begins, 3);
    assert_eq!(h.net.borrow().begins, 1);
}

#[test]
fn test_reboot_into_outage_returns_to_config() {
    let mut before = configured();
    before.run_to_running();

    // Same stored record, new boot: the earlier Running is not remembered
    let mut h = Harness::new(before.storage.clone(), SupervisorConfig::default());
    h.start();
    assert_eq!(h.supervisor.mode(), RunMode::ConnectingWifi);
    h.net.borrow_mut().status = AssociationStatus::Failed;
    assert_eq!(h.poll(1000), RunMode::Error);
    assert_eq!(h.poll(6000), RunMode::Error);
    assert_eq!(h.poll(6001), RunMode::Config);
    assert!(h.stored().configured);
}

// ==================== Button ====================

#[test]
fn test_short_hold_restores_previous_mode() {
    let mut h = configured();
    h.run_to_running();

    h.send(Event::Button { pressed: true }, 10_000);
    assert_eq!(h.supervisor.mode(), RunMode::ButtonHold);
    assert_eq!(h.supervisor.previous_mode(), RunMode::Running);
    assert_eq!(h.poll(12_999), RunMode::ButtonHold);

    h.send(Event::Button { pressed: false }, 12_999);
    assert_eq!(h.supervisor.mode(), RunMode::Running);
    assert_eq!(h.cloud.borrow().aborts, 0);
}

#[test]
fn test_long_hold_forces_config() {
    let mut h = configured();
    h.run_to_running();

    h.send(Event::Button { pressed: true }, 10_000);
    assert_eq!(h.poll(13_000), RunMode::Config);
    assert_eq!(h.ap.borrow().starts.len(), 1);

    // Release after the switch changes nothing
    h.send(Event::Button { pressed: false }, 13_500);
    assert_eq!(h.supervisor.mode(), RunMode::Config);

    // Stored credentials are kept until replaced
    assert!(h.stored().configured);
}

#[test]
fn test_release_at_threshold_without_poll_forces_config() {
    let mut h = configured();
    h.run_to_running();

    h.send(Event::Button { pressed: true }, 10_000);
    h.send(Event::Button { pressed: false }, 13_000);
    assert_eq!(h.supervisor.mode(), RunMode::Config);
}

#[test]
fn test_hold_restarts_wifi_attempt() {
    let mut h = configured();
    h.start();
    assert_eq!(h.net.borrow().begins, 1);

    h.send(Event::Button { pressed: true }, 1000);
    assert_eq!(h.net.borrow().aborts, 1);
    h.send(Event::Button { pressed: false }, 1500);
    assert_eq!(h.supervisor.mode(), RunMode::ConnectingWifi);
    assert_eq!(h.net.borrow().begins, 2);

    // The new attempt has its own deadline
    assert_eq!(h.poll(31_500), RunMode::ConnectingWifi);
    assert_eq!(h.poll(31_501), RunMode::Error);
}

#[test]
fn test_button_ignored_in_config() {
    let mut h = fresh();
    h.start();
    h.send(Event::Button { pressed: true }, 100);
    assert_eq!(h.supervisor.mode(), RunMode::Config);
    assert_eq!(h.poll(5000), RunMode::Config);
}

// ==================== Indicator ====================

#[test]
fn test_indicator_tracks_every_transition() {
    let mut h = configured();
    h.start();
    // WaitConfig, ConnectingWifi
    assert_eq!(h.supervisor.indicator().mode_changes(), 2);
    assert_eq!(h.supervisor.indicator().mode(), Some(h.supervisor.mode()));

    let mut expected = 2;
    let steps: [(u64, fn(&Harness)); 4] = [
        (1000, |h| h.net.borrow_mut().status = AssociationStatus::Connected),
        (2000, |h| h.cloud.borrow_mut().status = SessionStatus::Active),
        (3000, |h| h.cloud.borrow_mut().status = SessionStatus::Dropped),
        (4000, |h| h.cloud.borrow_mut().status = SessionStatus::Rejected),
    ];
    for (ms, step) in steps {
        step(&h);
        let before = h.supervisor.mode();
        let after = h.poll(ms);
        assert_ne!(before, after);
        expected += 1;
        assert_eq!(h.supervisor.indicator().mode_changes(), expected);
        assert_eq!(h.supervisor.indicator().mode(), Some(after));
    }
    assert_eq!(h.supervisor.mode(), RunMode::Error);
}

#[test]
fn test_project_override_event() {
    let mut h = configured();
    h.start();
    let writes = h.leds.borrow().len();

    h.send(Event::ProjectOverride(true), 100);
    assert!(h.supervisor.indicator().is_overridden());
    h.net.borrow_mut().status = AssociationStatus::Connected;
    assert_eq!(h.poll(200), RunMode::ConnectingCloud);
    assert_eq!(h.leds.borrow().len(), writes);
    assert_eq!(
        h.supervisor.indicator().mode(),
        Some(RunMode::ConnectingCloud)
    );
}

// ==================== Serial provisioning ====================

#[test]
fn test_short_token_stays_in_field() {
    let mut h = fresh();
    h.start();
    let writes = h.storage.write_count();

    h.type_text("b", 100);
    h.type_text(&TOKEN[..31], 200);
    h.type_text("\r", 300);

    assert_eq!(h.supervisor.serial_state(), Some(SerialState::CloudToken));
    assert_eq!(h.supervisor.mode(), RunMode::Config);
    assert_eq!(h.storage.write_count(), writes);
}

#[test]
fn test_serial_provisioning_connects() {
    let mut h = fresh();
    h.start();

    h.type_text("w", 100);
    assert_eq!(h.supervisor.serial_state(), Some(SerialState::WifiNetwork));
    assert!(h.console.borrow().contains("HomeNetwork (-52 dBm)"));

    h.type_text("HomeNetwork\rpassword123\r", 200);
    assert_eq!(h.supervisor.mode(), RunMode::Config);
    assert!(h.console.borrow().contains("Enter your Blynk Auth token"));
    assert_eq!(h.stored().wifi_ssid, "HomeNetwork");

    h.type_text("b", 300);
    h.type_text(TOKEN, 300);
    h.type_text("\r\r\r", 300);
    assert_eq!(h.supervisor.mode(), RunMode::ConnectingWifi);
    assert_eq!(h.supervisor.serial_state(), None);
    assert_eq!(h.ap.borrow().stops, 1);

    let stored = h.stored();
    assert!(stored.configured);
    assert_eq!(stored.cloud_auth_token, TOKEN);
    assert_eq!(stored.cloud_host, "blynk-cloud.com");
    assert_eq!(stored.cloud_port, 8442);
    assert!(h.storage.get_raw(crate::store::CONFIGURED_KEY).is_some());
}

#[test]
fn test_save_failure_reported_on_console() {
    let mut h = fresh();
    h.start();
    h.storage.set_fail_writes(true);

    h.type_text("w", 100);
    h.type_text("HomeNetwork\rpassword123\r", 200);

    assert!(h.console.borrow().contains("Failed to save configuration"));
    assert_eq!(h.supervisor.mode(), RunMode::Config);
    assert_eq!(h.supervisor.serial_state(), Some(SerialState::Waiting));
    assert!(!h.supervisor.record().configured);

    // Retry once storage recovers
    h.storage.set_fail_writes(false);
    h.type_text("w", 300);
    h.type_text("HomeNetwork\rpassword123\r", 400);
    assert_eq!(h.stored().wifi_ssid, "HomeNetwork");
}

#[test]
fn test_serial_ignored_outside_config() {
    let mut h = configured();
    h.start();
    let output = h.console.borrow().clone();
    h.type_text("h", 100);
    assert_eq!(*h.console.borrow(), output);
}

// ==================== AP provisioning ====================

#[test]
fn test_portal_submission_connects() {
    let mut h = fresh();
    h.start();

    h.send(Event::ApClientConnected, 100);
    assert_eq!(h.supervisor.mode(), RunMode::ConfigDeviceConnected);
    assert!(h.supervisor.ap_session().is_some_and(|ap| ap.device_connected()));

    let (tx, rx) = mpsc::channel();
    let submission = CredentialSubmission::from_query(&format!(
        "ssid=Home+Network&pass=password123&blynk={}",
        TOKEN
    ));
    h.send(
        Event::ApCredentials {
            submission,
            reply: Some(tx),
        },
        200,
    );

    assert_eq!(rx.recv().unwrap(), SubmissionOutcome::Accepted);
    assert_eq!(h.supervisor.mode(), RunMode::ConnectingWifi);
    assert_eq!(h.ap.borrow().stops, 1);
    assert_eq!(h.stored().wifi_ssid, "Home Network");
}

#[test]
fn test_portal_answers_before_leaving_config_mode() {
    use crate::provisioning::PortalAccessPoint;
    use crate::settings::PORTAL_REPLY_TIMEOUT;
    use std::io::{Read, Write};
    use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream};
    use std::thread;

    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (events, mut inbox) = tokio::sync::mpsc::unbounded_channel();
    let portal =
        PortalAccessPoint::new(None, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), port, events);
    let mut h = Harness::with_access_point(Box::new(portal));
    h.start();
    assert_eq!(h.supervisor.mode(), RunMode::Config);

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        write!(
            stream,
            "GET /config?ssid=Home&pass=&blynk={} HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
            TOKEN
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    });

    // Main loop: dispatch portal events until the submission is handled
    loop {
        let event = inbox.blocking_recv().expect("portal closed the event queue");
        let submission = matches!(event, Event::ApCredentials { .. });
        let started = Instant::now();
        h.send(event, 100);
        assert!(
            started.elapsed() < PORTAL_REPLY_TIMEOUT / 4,
            "event handling blocked for {:?}",
            started.elapsed()
        );
        if submission {
            break;
        }
    }

    let response = client.join().unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert_eq!(h.supervisor.mode(), RunMode::ConnectingWifi);
    assert_eq!(h.stored().wifi_ssid, "Home");
}

#[test]
fn test_portal_invalid_submission() {
    let mut h = fresh();
    h.start();
    let writes = h.storage.write_count();

    let submission = CredentialSubmission::from_query("ssid=Home&pass=short&blynk=abc");
    let outcome = h.supervisor.on_credentials_received(&submission, h.at(100));
    assert!(matches!(outcome, SubmissionOutcome::Invalid(_)));
    assert_eq!(h.supervisor.mode(), RunMode::Config);
    assert_eq!(h.storage.write_count(), writes);
}

#[test]
fn test_portal_save_failure() {
    let mut h = fresh();
    h.start();
    h.storage.set_fail_writes(true);

    let submission = CredentialSubmission::from_query(&format!(
        "ssid=Home&pass=password123&blynk={}",
        TOKEN
    ));
    let outcome = h.supervisor.on_credentials_received(&submission, h.at(100));
    assert!(matches!(outcome, SubmissionOutcome::SaveFailed(_)));
    assert_eq!(h.supervisor.mode(), RunMode::Config);
}

#[test]
fn test_portal_outside_config_mode() {
    let mut h = configured();
    h.start();
    let submission = CredentialSubmission::from_query("ssid=Home");
    let outcome = h.supervisor.on_credentials_received(&submission, h.at(100));
    assert_eq!(outcome, SubmissionOutcome::NotInConfigMode);
    assert_eq!(h.supervisor.mode(), RunMode::ConnectingWifi);
}

// ==================== Self-test ====================

fn self_test_config() -> SupervisorConfig {
    SupervisorConfig {
        self_test_enabled: true,
        ..SupervisorConfig::default()
    }
}

#[test]
fn test_self_test_pass_is_persisted() {
    let storage = MemoryStorage::new();
    let mut h = Harness::new(storage.clone(), self_test_config());
    h.start();
    assert_eq!(h.supervisor.mode(), RunMode::SelfTest);
    assert_eq!(h.poll(100), RunMode::SelfTest);

    *h.self_test.borrow_mut() = SelfTestStatus::Passed;
    assert_eq!(h.poll(200), RunMode::Config);
    assert!(h.stored().self_test_passed);
    drop(h);

    // Not run again on the next boot
    let mut h = Harness::new(storage, self_test_config());
    h.start();
    assert_eq!(h.supervisor.mode(), RunMode::Config);
}

#[test]
fn test_self_test_failure_is_fatal() {
    let mut h = Harness::new(MemoryStorage::new(), self_test_config());
    h.start();

    *h.self_test.borrow_mut() = SelfTestStatus::Failed("LED".into());
    assert_eq!(h.poll(100), RunMode::Error);
    assert_eq!(h.supervisor.fault(), Some(Fault::SelfTestFailure));
    assert_eq!(h.supervisor.connect_status(), None);

    assert_eq!(h.poll(60_000), RunMode::Error);
    h.send(Event::Button { pressed: true }, 60_000);
    assert_eq!(h.supervisor.mode(), RunMode::Error);
    assert_eq!(h.poll(70_000), RunMode::Error);
}

//! Blynk Board firmware binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `cargo run --bin blynk-board`
//! - **ESP32**: `cargo espflash flash --bin blynk-board --features esp32 --release`
//!
//! ## Serial console
//!
//! In config mode type `h` for the command list (`s` scan, `w` WiFi, `b`
//! Blynk token/host/port). On host the console is stdin/stdout.
//!
//! ## Environment (host)
//!
//! - `BLYNK_BOARD_DIR`: where the provisioning record is kept (default `~/.blynk-board`)
//! - `BLYNK_PORTAL_PORT`: config portal port (default 8080)
//! - `RUST_LOG`: log filter (default `info`)

use blynk_board_esp32::event::Event;
use blynk_board_esp32::indicator::{Indicator, StatusLed, TokioBlinkScheduler};
use blynk_board_esp32::network::{Network, TcpCloudSession};
use blynk_board_esp32::provisioning::{AccessPoint, PortalAccessPoint, StdoutConsole};
use blynk_board_esp32::settings::{FIRMWARE_VERSION, HARDWARE_VERSION, LOOP_POLL_INTERVAL};
use blynk_board_esp32::store::ConfigStore;
use blynk_board_esp32::supervisor::NoopSelfTest;
use blynk_board_esp32::{Collaborators, Supervisor, SupervisorConfig};
use log::{debug, error, info, warn};
use rand_core::OsRng;
use std::error::Error;
use std::io::{self, Read};
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::MissedTickBehavior;

/// Platform pieces the supervisor is assembled from.
struct Board {
    store: ConfigStore,
    led: Box<dyn StatusLed>,
    network: Box<dyn Network>,
    access_point: Box<dyn AccessPoint>,
    button: Button,
}

// ==================== ESP32 ====================

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

/// GPIO0 button, active low.
#[cfg(feature = "esp32")]
struct Button {
    pin: esp_idf_hal::gpio::PinDriver<'static, esp_idf_hal::gpio::Gpio0, esp_idf_hal::gpio::Input>,
    pressed: bool,
}

#[cfg(feature = "esp32")]
impl Button {
    /// Sample the level. Returns the new state when it changed.
    fn sample(&mut self) -> Option<bool> {
        let pressed = self.pin.is_low();
        if pressed == self.pressed {
            return None;
        }
        self.pressed = pressed;
        Some(pressed)
    }
}

#[cfg(feature = "esp32")]
fn platform_board(events: &UnboundedSender<Event>) -> Result<Board, Box<dyn Error>> {
    use blynk_board_esp32::indicator::Ws2812Led;
    use blynk_board_esp32::network::{EspAccessPoint, EspNetwork};
    use blynk_board_esp32::settings::DEFAULT_PORTAL_PORT;
    use blynk_board_esp32::store::NvsStorage;
    use blynk_board_esp32::wifi::WifiManager;
    use esp_idf_hal::gpio::{PinDriver, Pull};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use std::cell::RefCell;
    use std::rc::Rc;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let storage = NvsStorage::init(nvs.clone())?;
    let wifi = Rc::new(RefCell::new(WifiManager::new(
        peripherals.modem,
        sysloop,
        Some(nvs),
    )?));

    let led = Ws2812Led::new(peripherals.rmt.channel0, peripherals.pins.gpio4)
        .map_err(|e| format!("LED init failed: {:?}", e))?;

    let mut pin = PinDriver::input(peripherals.pins.gpio0)?;
    pin.set_pull(Pull::Up)?;

    let access_point = PortalAccessPoint::new(
        Some(Box::new(EspAccessPoint::new(wifi.clone()))),
        None,
        DEFAULT_PORTAL_PORT,
        events.clone(),
    );

    Ok(Board {
        store: ConfigStore::new(Box::new(storage)),
        led: Box::new(led),
        network: Box::new(EspNetwork::new(wifi)),
        access_point: Box::new(access_point),
        button: Button {
            pin,
            pressed: false,
        },
    })
}

#[cfg(feature = "esp32")]
async fn shutdown_signal() {
    std::future::pending::<()>().await
}

// ==================== Host ====================

/// Config portal port when `BLYNK_PORTAL_PORT` is not set.
#[cfg(not(feature = "esp32"))]
const HOST_PORTAL_PORT: u16 = 8080;

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Hosts have no button.
#[cfg(not(feature = "esp32"))]
struct Button;

#[cfg(not(feature = "esp32"))]
impl Button {
    fn sample(&mut self) -> Option<bool> {
        None
    }
}

#[cfg(not(feature = "esp32"))]
fn portal_port() -> u16 {
    match std::env::var("BLYNK_PORTAL_PORT") {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!(
                "Invalid BLYNK_PORTAL_PORT '{}', using {}",
                value, HOST_PORTAL_PORT
            );
            HOST_PORTAL_PORT
        }),
        Err(_) => HOST_PORTAL_PORT,
    }
}

#[cfg(not(feature = "esp32"))]
fn platform_board(events: &UnboundedSender<Event>) -> Result<Board, Box<dyn Error>> {
    use blynk_board_esp32::indicator::LogLed;
    use blynk_board_esp32::network::HostNetwork;
    use blynk_board_esp32::store::{default_storage_dir, FileStorage};

    let dir = default_storage_dir()?;
    let storage = FileStorage::new(&dir)?;
    info!("Provisioning record in {}", dir.display());

    let access_point = PortalAccessPoint::new(None, None, portal_port(), events.clone());

    Ok(Board {
        store: ConfigStore::new(Box::new(storage)),
        led: Box::new(LogLed::new()),
        network: Box::new(HostNetwork::new()),
        access_point: Box::new(access_point),
        button: Button,
    })
}

#[cfg(not(feature = "esp32"))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await
    }
}

// ==================== Main loop ====================

/// Forward console bytes to the main loop.
///
/// Runs on a plain thread: a blocking stdin read would otherwise hold up
/// runtime shutdown.
fn spawn_serial_reader(events: UnboundedSender<Event>) -> io::Result<()> {
    thread::Builder::new()
        .name("serial".into())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = [0u8; 64];
            loop {
                let n = match stdin.read(&mut buf) {
                    Ok(0) if cfg!(feature = "esp32") => {
                        // UART has no data yet
                        thread::sleep(LOOP_POLL_INTERVAL);
                        continue;
                    }
                    Ok(0) => {
                        debug!("Console input closed");
                        return;
                    }
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        thread::sleep(LOOP_POLL_INTERVAL);
                        continue;
                    }
                    Err(e) => {
                        warn!("Console read failed: {}", e);
                        return;
                    }
                };

                for &byte in &buf[..n] {
                    // Terminals send LF on enter; the console protocol submits on CR
                    let byte = if !cfg!(feature = "esp32") && byte == b'\n' {
                        b'\r'
                    } else {
                        byte
                    };
                    if events.send(Event::SerialByte(byte)).is_err() {
                        return;
                    }
                }
            }
        })?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    platform_init();

    info!(
        "=== Blynk Board firmware {} (hardware {}) starting ===",
        FIRMWARE_VERSION, HARDWARE_VERSION
    );

    #[cfg(feature = "esp32")]
    info!("Platform: ESP32");
    #[cfg(not(feature = "esp32"))]
    info!("Platform: Host");

    let (events, mut inbox) = mpsc::unbounded_channel();

    let Board {
        store,
        led,
        network,
        access_point,
        mut button,
    } = match platform_board(&events) {
        Ok(board) => board,
        Err(e) => {
            error!("Board initialization failed: {}", e);
            return;
        }
    };

    let indicator = Indicator::new(led, Box::new(TokioBlinkScheduler::new(events.clone())));
    let collaborators = Collaborators {
        network,
        cloud: Box::new(TcpCloudSession::new()),
        access_point,
        console: Box::new(StdoutConsole),
        self_test: Box::new(NoopSelfTest),
        rng: Box::new(OsRng),
    };
    let mut supervisor = Supervisor::new(
        SupervisorConfig::default(),
        store,
        indicator,
        collaborators,
    );

    if let Err(e) = spawn_serial_reader(events.clone()) {
        warn!("Serial console unavailable: {}", e);
    }

    supervisor.start(Instant::now());

    let mut ticker = tokio::time::interval(LOOP_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
            Some(event) = inbox.recv() => {
                supervisor.handle(event, Instant::now());
            }
            _ = ticker.tick() => {
                if let Some(pressed) = button.sample() {
                    supervisor.handle(Event::Button { pressed }, Instant::now());
                }
                supervisor.poll(Instant::now());
            }
        }
    }

    info!("Final run mode: {}", supervisor.mode());
}

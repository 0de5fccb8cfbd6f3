//! On-board TAP test binary.
//!
//! Runs the `#[tap_test]` functions and prints TAP on the console. On the
//! board the status LED shows the result once the run ends: green for a
//! pass, red for a failure.
//!
//! ```bash
//! # Host (board-only tests are skipped)
//! cargo run --bin device-tests --features tap-tests
//!
//! # Board
//! cargo espflash flash --bin device-tests --features esp32,tap-tests --release --monitor
//!
//! # One module
//! TAP_FILTER=store:: cargo espflash flash --bin device-tests --features esp32,tap-tests --release --monitor
//! ```

use blynk_board_esp32::settings::{FIRMWARE_VERSION, HARDWARE_VERSION};
use blynk_board_esp32::testing;

/// Show the outcome on the status LED and park.
#[cfg(feature = "esp32")]
fn report(success: bool) -> ! {
    use blynk_board_esp32::indicator::{
        StatusLed, Ws2812Led, COLOR_CANT_CONNECT_WIFI, COLOR_CONNECTING_WIFI,
    };
    use esp_idf_hal::peripherals::Peripherals;

    let color = if success {
        COLOR_CONNECTING_WIFI
    } else {
        COLOR_CANT_CONNECT_WIFI
    };
    // Held until the end so the driver stays up while parked
    let _led = match Peripherals::take() {
        Ok(peripherals) => {
            match Ws2812Led::new(peripherals.rmt.channel0, peripherals.pins.gpio4) {
                Ok(mut led) => {
                    led.set_color(color);
                    Some(led)
                }
                Err(e) => {
                    log::warn!("Status LED unavailable: {:?}", e);
                    None
                }
            }
        }
        Err(e) => {
            log::warn!("Peripherals unavailable: {:?}", e);
            None
        }
    };

    log::info!("Tests complete. Halting.");
    loop {
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}

#[cfg(not(feature = "esp32"))]
fn report(success: bool) -> ! {
    std::process::exit(if success { 0 } else { 1 });
}

fn main() {
    #[cfg(feature = "esp32")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
    }

    // stderr, so the TAP stream on stdout starts with its version line
    eprintln!(
        "blynk-board firmware {} (hardware {}), {} tests registered",
        FIRMWARE_VERSION,
        HARDWARE_VERSION,
        testing::test_count()
    );

    let success = testing::run_matching(option_env!("TAP_FILTER"));
    report(success)
}

//! Provisioning utility.
//!
//! Writes WiFi and Blynk credentials into the board's configuration store,
//! so a board can be shipped (or a host board started) already provisioned.
//!
//! Credentials are taken from environment variables at compile time:
//!
//!   WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret" BLYNK_TOKEN="<32 chars>" \
//!     cargo espflash flash --bin configure-board --features esp32 --release --monitor
//!
//! `BLYNK_HOST` and `BLYNK_PORT` are optional. For open networks set
//! `WIFI_PASSWORD=""`. On host the record is written under `BLYNK_BOARD_DIR`
//! (default `~/.blynk-board`).

use blynk_board_esp32::credentials::{CloudCredentials, WifiCredentials};
use blynk_board_esp32::store::{ConfigStore, Storage};

/// WiFi SSID - set via WIFI_SSID environment variable at compile time.
const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");

/// WiFi password - set via WIFI_PASSWORD environment variable at compile time.
/// Empty string for open networks.
const WIFI_PASSWORD: Option<&str> = option_env!("WIFI_PASSWORD");

/// 32-character Blynk auth token.
const BLYNK_TOKEN: Option<&str> = option_env!("BLYNK_TOKEN");

/// Blank for the default server.
const BLYNK_HOST: Option<&str> = option_env!("BLYNK_HOST");

/// Blank for the default port.
const BLYNK_PORT: Option<&str> = option_env!("BLYNK_PORT");

const USAGE: &str = "Usage:\n  \
    WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" BLYNK_TOKEN=\"<32 chars>\" \\\n    \
    cargo espflash flash --bin configure-board --features esp32 --release --monitor\n\n\
    Optional: BLYNK_HOST, BLYNK_PORT";

/// Print error message and halt. On ESP32, we pause briefly then return
/// so the process terminates cleanly (espflash monitor will show the output).
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    eprintln!("\n=== Configuration failed ===\n");
    // Brief pause to ensure serial output is flushed before process exits
    #[cfg(feature = "esp32")]
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

#[cfg(feature = "esp32")]
fn open_storage() -> Result<Box<dyn Storage>, String> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let storage = blynk_board_esp32::store::NvsStorage::take()
        .map_err(|e| format!("Error initializing NVS: {:?}", e))?;
    Ok(Box::new(storage))
}

#[cfg(not(feature = "esp32"))]
fn open_storage() -> Result<Box<dyn Storage>, String> {
    use blynk_board_esp32::store::{default_storage_dir, FileStorage};

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let dir = default_storage_dir().map_err(|e| format!("Error locating storage: {}", e))?;
    println!("Storage: {}", dir.display());
    let storage = FileStorage::new(dir).map_err(|e| format!("Error opening storage: {}", e))?;
    Ok(Box::new(storage))
}

fn main() {
    let storage = open_storage().unwrap_or_else(|e| halt_with_error(&e));

    println!("\n=== Blynk Board Configuration Utility ===\n");

    // Check for compile-time credentials
    let (ssid, token) = match (WIFI_SSID, BLYNK_TOKEN) {
        (Some(ssid), Some(token)) if !ssid.is_empty() && !token.is_empty() => (ssid, token),
        _ => halt_with_error(&format!(
            "Error: WIFI_SSID and BLYNK_TOKEN must be set at compile time.\n\n{}",
            USAGE
        )),
    };
    let password = WIFI_PASSWORD.unwrap_or("");

    let wifi = WifiCredentials::new(ssid, password)
        .unwrap_or_else(|e| halt_with_error(&format!("Error: {}", e)));
    let cloud = CloudCredentials::parse(
        token,
        BLYNK_HOST.unwrap_or(""),
        BLYNK_PORT.unwrap_or(""),
    )
    .unwrap_or_else(|e| halt_with_error(&format!("Error: {}", e)));

    println!("SSID: {}", wifi.ssid);
    println!(
        "Password: {} ({} chars)",
        if wifi.is_open() { "(none)" } else { "****" },
        wifi.password.len()
    );
    println!("Blynk server: {}", cloud.endpoint());

    // Keep the device identity and self-test result already stored
    let mut store = ConfigStore::new(storage);
    let mut record = store.load();
    record.set_wifi(&wifi);
    record.set_cloud(&cloud);
    record.refresh_configured();

    if let Err(e) = store.save(&record) {
        halt_with_error(&format!("Error saving configuration: {}", e));
    }

    println!("\n=== Configuration saved ===");
    println!("\nThe board will connect on its next boot.");
    println!("Credentials persist across reboots.");

    println!("\n=== Done - you can disconnect the device ===\n");

    // Brief pause to ensure serial output is visible, then exit cleanly
    #[cfg(feature = "esp32")]
    std::thread::sleep(std::time::Duration::from_secs(2));
}

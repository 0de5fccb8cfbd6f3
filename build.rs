/// Variables read with `option_env!` by `configure-board` and `device-tests`.
const COMPILE_TIME_ENV: [&str; 6] = [
    "WIFI_SSID",
    "WIFI_PASSWORD",
    "BLYNK_TOKEN",
    "BLYNK_HOST",
    "BLYNK_PORT",
    "TAP_FILTER",
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for var in COMPILE_TIME_ENV {
        println!("cargo:rerun-if-env-changed={}", var);
    }

    // ESP-IDF targets (Xtensa and RISC-V boards alike) need the IDF build
    // environment; host builds skip it
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}

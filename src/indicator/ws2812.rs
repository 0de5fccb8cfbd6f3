//! WS2812 status LED on the RMT peripheral.

use super::{Rgb, StatusLed};
use esp_idf_hal::gpio::OutputPin;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::rmt::RmtChannel;
use log::{debug, warn};
use smart_leds::{SmartLedsWrite, RGB8};
use ws2812_esp32_rmt_driver::{Ws2812Esp32Rmt, Ws2812Esp32RmtDriverError};

/// The board's single addressable RGB LED.
pub struct Ws2812Led {
    driver: Ws2812Esp32Rmt<'static>,
}

impl Ws2812Led {
    pub fn new<C: RmtChannel>(
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = impl OutputPin> + 'static,
    ) -> Result<Self, Ws2812Esp32RmtDriverError> {
        let driver = Ws2812Esp32Rmt::new(channel, pin)?;
        Ok(Self { driver })
    }
}

impl StatusLed for Ws2812Led {
    fn set_color(&mut self, color: Rgb) {
        let pixel = RGB8::new(color.red(), color.green(), color.blue());
        match self.driver.write([pixel]) {
            Ok(()) => debug!("LED {}", color),
            Err(e) => warn!("Failed to write LED color {}: {:?}", color, e),
        }
    }
}

//! Blink timer on the tokio runtime, and a logging LED for hosts.

use super::{BlinkScheduler, Rgb, StatusLed};
use crate::event::Event;
use log::{debug, trace};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Posts [`Event::BlinkTick`] to the main loop from a spawned tokio task.
///
/// Must be used from within a tokio runtime.
pub struct TokioBlinkScheduler {
    events: UnboundedSender<Event>,
    cancel: Option<CancellationToken>,
}

impl TokioBlinkScheduler {
    pub fn new(events: UnboundedSender<Event>) -> Self {
        Self {
            events,
            cancel: None,
        }
    }
}

impl BlinkScheduler for TokioBlinkScheduler {
    fn schedule_periodic(&mut self, period: Duration, generation: u64) {
        self.cancel_periodic();

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            timer.tick().await; // Skip first

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = timer.tick() => {
                        if events.send(Event::BlinkTick(generation)).is_err() {
                            // Main loop is gone
                            break;
                        }
                    }
                }
            }
            trace!("Blink timer {} stopped", generation);
        });

        debug!("Blink timer {} every {:?}", generation, period);
        self.cancel = Some(cancel);
    }

    fn cancel_periodic(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

impl Drop for TokioBlinkScheduler {
    fn drop(&mut self) {
        self.cancel_periodic();
    }
}

/// LED stand-in that logs color changes.
#[derive(Debug, Default)]
pub struct LogLed {
    current: Option<Rgb>,
}

impl LogLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Rgb> {
        self.current
    }
}

impl StatusLed for LogLed {
    fn set_color(&mut self, color: Rgb) {
        if self.current != Some(color) {
            debug!("LED {}", color);
        }
        self.current = Some(color);
    }
}

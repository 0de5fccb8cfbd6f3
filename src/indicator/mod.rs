//! Status indicator driver.
//!
//! Maps the current [`RunMode`] to a color and a blink period through
//! [`StatusSpec::lookup`], and drives a periodic blink timer through a
//! [`BlinkScheduler`]. Timer callbacks do not touch the LED directly: the
//! scheduler posts [`Event::BlinkTick`](crate::Event::BlinkTick) to the main
//! loop, which hands it to [`Indicator::on_tick`].
//!
//! Each schedule carries a generation number. Reprogramming the timer bumps
//! the generation, so a tick that was already queued for the old schedule is
//! ignored.
//!
//! LEDs: [`LogLed`] on host, `Ws2812Led` on the board (`esp32` feature).

mod blink;
mod status;
#[cfg(feature = "esp32")]
mod ws2812;

pub use blink::{LogLed, TokioBlinkScheduler};
pub use status::*;
#[cfg(feature = "esp32")]
pub use ws2812::Ws2812Led;

use crate::mode::{Fault, RunMode};
use log::debug;
use std::time::Duration;

/// Physical RGB LED.
pub trait StatusLed {
    fn set_color(&mut self, color: Rgb);
}

/// Periodic timer feeding blink ticks to the main loop.
pub trait BlinkScheduler {
    /// Replace any running timer with one firing every `period`, tagged with
    /// `generation`.
    fn schedule_periodic(&mut self, period: Duration, generation: u64);

    /// Stop the running timer, if any.
    fn cancel_periodic(&mut self);
}

/// Steps in the identity pattern: the four suffix colors, then off.
const IDENTITY_STEPS: usize = 5;

pub struct Indicator {
    led: Box<dyn StatusLed>,
    scheduler: Box<dyn BlinkScheduler>,
    mode: Option<RunMode>,
    spec: Option<StatusSpec>,
    generation: u64,
    lit: bool,
    step: usize,
    identity: Option<[Rgb; 4]>,
    project_override: bool,
    mode_changes: u64,
}

impl Indicator {
    pub fn new(led: Box<dyn StatusLed>, scheduler: Box<dyn BlinkScheduler>) -> Self {
        Self {
            led,
            scheduler,
            mode: None,
            spec: None,
            generation: 0,
            lit: false,
            step: 0,
            identity: None,
            project_override: false,
            mode_changes: 0,
        }
    }

    /// Show `mode`. Replaces any previously scheduled blink timer.
    pub fn set_mode(&mut self, mode: RunMode, fault: Option<Fault>) {
        self.mode = Some(mode);
        self.spec = Some(StatusSpec::lookup(mode, fault));
        self.mode_changes += 1;

        if self.project_override {
            debug!("Indicator override active, not showing {}", mode);
            return;
        }
        self.apply();
    }

    /// Colors cycled while in [`RunMode::Config`], so the board can be matched
    /// to its access point name.
    pub fn set_identity_pattern(&mut self, colors: [Rgb; 4]) {
        self.identity = Some(colors);
    }

    /// Raise or release the project-level override.
    ///
    /// While raised, mode changes are recorded but the LED and timer are left
    /// to the project. Releasing re-applies the current mode.
    pub fn set_project_override(&mut self, active: bool) {
        if self.project_override == active {
            return;
        }
        self.project_override = active;
        if active {
            self.generation += 1;
            self.scheduler.cancel_periodic();
            debug!("Indicator handed over to project");
        } else {
            debug!("Indicator released by project");
            self.apply();
        }
    }

    /// Handle a blink tick. Returns false if the tick was stale.
    pub fn on_tick(&mut self, generation: u64) -> bool {
        if self.project_override || generation != self.generation {
            return false;
        }
        let Some(spec) = self.spec else {
            return false;
        };
        if spec.blink == Blink::Solid {
            return false;
        }

        let color = match (self.mode, self.identity) {
            (Some(RunMode::Config), Some(colors)) => {
                self.step = (self.step + 1) % IDENTITY_STEPS;
                colors.get(self.step).copied().unwrap_or(Rgb::OFF)
            }
            _ => {
                self.lit = !self.lit;
                if self.lit {
                    spec.color
                } else {
                    Rgb::OFF
                }
            }
        };
        self.led.set_color(color);
        true
    }

    /// Mode most recently passed to [`set_mode`](Self::set_mode).
    pub fn mode(&self) -> Option<RunMode> {
        self.mode
    }

    pub fn spec(&self) -> Option<StatusSpec> {
        self.spec
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_overridden(&self) -> bool {
        self.project_override
    }

    /// Number of `set_mode` calls so far.
    pub fn mode_changes(&self) -> u64 {
        self.mode_changes
    }

    fn apply(&mut self) {
        let Some(spec) = self.spec else {
            return;
        };
        self.generation += 1;
        self.scheduler.cancel_periodic();
        self.lit = true;
        self.step = 0;

        let first = match (self.mode, self.identity) {
            (Some(RunMode::Config), Some(colors)) => colors[0],
            _ => spec.color,
        };
        self.led.set_color(first);

        if let Blink::Period(period) = spec.blink {
            self.scheduler.schedule_periodic(period, self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Color(Rgb),
        Schedule(Duration, u64),
        Cancel,
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Call>>>);

    impl Recorder {
        fn take(&self) -> Vec<Call> {
            std::mem::take(&mut *self.0.borrow_mut())
        }
    }

    impl StatusLed for Recorder {
        fn set_color(&mut self, color: Rgb) {
            self.0.borrow_mut().push(Call::Color(color));
        }
    }

    impl BlinkScheduler for Recorder {
        fn schedule_periodic(&mut self, period: Duration, generation: u64) {
            self.0.borrow_mut().push(Call::Schedule(period, generation));
        }

        fn cancel_periodic(&mut self) {
            self.0.borrow_mut().push(Call::Cancel);
        }
    }

    fn indicator() -> (Indicator, Recorder) {
        let rec = Recorder::default();
        let ind = Indicator::new(Box::new(rec.clone()), Box::new(rec.clone()));
        (ind, rec)
    }

    #[test]
    fn test_blinking_mode_schedules_timer() {
        let (mut ind, rec) = indicator();
        ind.set_mode(RunMode::ConnectingWifi, None);
        assert_eq!(
            rec.take(),
            vec![
                Call::Cancel,
                Call::Color(COLOR_CONNECTING_WIFI),
                Call::Schedule(BLINK_CONNECTING_WIFI, ind.generation()),
            ]
        );
        assert_eq!(ind.mode(), Some(RunMode::ConnectingWifi));
    }

    #[test]
    fn test_solid_mode_schedules_nothing() {
        let (mut ind, rec) = indicator();
        ind.set_mode(RunMode::Running, None);
        assert_eq!(
            rec.take(),
            vec![Call::Cancel, Call::Color(COLOR_CONNECTED_CLOUD)]
        );
        assert!(!ind.on_tick(ind.generation()));
    }

    #[test]
    fn test_tick_toggles_color() {
        let (mut ind, rec) = indicator();
        ind.set_mode(RunMode::ConnectingCloud, None);
        rec.take();
        let gen = ind.generation();

        assert!(ind.on_tick(gen));
        assert!(ind.on_tick(gen));
        assert_eq!(
            rec.take(),
            vec![Call::Color(Rgb::OFF), Call::Color(COLOR_CONNECTING_CLOUD)]
        );
    }

    #[test]
    fn test_stale_tick_ignored() {
        let (mut ind, rec) = indicator();
        ind.set_mode(RunMode::ConnectingWifi, None);
        let old = ind.generation();
        ind.set_mode(RunMode::ConnectingCloud, None);
        rec.take();

        assert!(!ind.on_tick(old));
        assert!(rec.take().is_empty());
    }

    #[test]
    fn test_every_set_mode_replaces_schedule() {
        let (mut ind, rec) = indicator();
        ind.set_mode(RunMode::Config, None);
        ind.set_mode(RunMode::ConfigDeviceConnected, None);
        let calls = rec.take();
        let cancels = calls.iter().filter(|c| **c == Call::Cancel).count();
        let schedules = calls
            .iter()
            .filter(|c| matches!(c, Call::Schedule(..)))
            .count();
        assert_eq!(cancels, 2);
        assert_eq!(schedules, 2);
        assert_eq!(ind.mode_changes(), 2);
    }

    #[test]
    fn test_identity_pattern_in_config() {
        let (mut ind, rec) = indicator();
        let colors = [Rgb(1), Rgb(2), Rgb(3), Rgb(4)];
        ind.set_identity_pattern(colors);
        ind.set_mode(RunMode::Config, None);
        let gen = ind.generation();
        for _ in 0..5 {
            ind.on_tick(gen);
        }
        let shown: Vec<Call> = rec
            .take()
            .into_iter()
            .filter(|c| matches!(c, Call::Color(_)))
            .collect();
        assert_eq!(
            shown,
            vec![
                Call::Color(Rgb(1)),
                Call::Color(Rgb(2)),
                Call::Color(Rgb(3)),
                Call::Color(Rgb(4)),
                Call::Color(Rgb::OFF),
                Call::Color(Rgb(1)),
            ]
        );
    }

    #[test]
    fn test_project_override() {
        let (mut ind, rec) = indicator();
        ind.set_mode(RunMode::ConnectingWifi, None);
        let gen = ind.generation();

        ind.set_project_override(true);
        rec.take();
        assert!(!ind.on_tick(gen));

        // Mode is tracked but the LED is left alone
        ind.set_mode(RunMode::Running, None);
        assert_eq!(ind.mode(), Some(RunMode::Running));
        assert!(rec.take().is_empty());

        ind.set_project_override(false);
        assert_eq!(
            rec.take(),
            vec![Call::Cancel, Call::Color(COLOR_CONNECTED_CLOUD)]
        );
    }
}

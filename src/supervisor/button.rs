//! Button hold tracking.

use std::time::{Duration, Instant};

/// Tracks how long the button has been held.
#[derive(Debug, Default)]
pub struct ButtonTracker {
    pressed_at: Option<Instant>,
}

impl ButtonTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a press. A repeated press while held keeps the first time.
    pub fn press(&mut self, now: Instant) {
        if self.pressed_at.is_none() {
            self.pressed_at = Some(now);
        }
    }

    /// Record a release and return how long the button was held.
    pub fn release(&mut self, now: Instant) -> Option<Duration> {
        self.pressed_at
            .take()
            .map(|at| now.saturating_duration_since(at))
    }

    /// Hold duration so far, `None` when released.
    pub fn held_for(&self, now: Instant) -> Option<Duration> {
        self.pressed_at
            .map(|at| now.saturating_duration_since(at))
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed_at.is_some()
    }

    /// Forget a press without reporting it.
    pub fn reset(&mut self) {
        self.pressed_at = None;
    }
}

//! Monotonic clock.
//!
//! Values are milliseconds since a process-wide origin captured on first use.
//! The origin is arbitrary and must never be read as wall-clock time.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static ORIGIN: OnceLock<Instant> = OnceLock::new();

fn origin() -> Instant {
    *ORIGIN.get_or_init(Instant::now)
}

/// Milliseconds elapsed since the process-wide origin. Never decreases.
pub fn now_ms() -> f64 {
    duration_ms(origin().elapsed())
}

/// Convert a duration to fractional milliseconds.
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

/// Cheap handle onto the process clock, for types that want to carry one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        Self
    }

    pub fn now_ms(&self) -> f64 {
        now_ms()
    }

    /// Time remaining until `deadline_ms`, or zero if it has passed.
    /// `None` when the deadline is infinite.
    pub fn until(&self, deadline_ms: f64) -> Option<Duration> {
        if !deadline_ms.is_finite() {
            return None;
        }
        let remaining = deadline_ms - self.now_ms();
        if remaining <= 0.0 {
            Some(Duration::ZERO)
        } else {
            Some(Duration::from_secs_f64(remaining / 1_000.0))
        }
    }
}

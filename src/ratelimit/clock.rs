//! Time sources for the rate limiter.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// A source of monotonic time, in seconds.
///
/// Only differences between readings matter to the limiter, so the origin
/// is implementation-defined.
pub trait Clock: Send + Sync {
    /// Current reading in seconds.
    fn now(&self) -> f64;
}

/// Clock backed by [`Instant`], counting seconds since it was created.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same reading, so a test can hand one clone to the
/// limiter and keep another to advance time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    seconds: Arc<Mutex<f64>>,
}

impl ManualClock {
    /// Create a clock starting at `seconds`.
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds: Arc::new(Mutex::new(seconds)),
        }
    }

    /// Jump to an absolute reading.
    pub fn set(&self, seconds: f64) {
        *self.seconds.lock() = seconds;
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        *self.seconds.lock() += seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.seconds.lock()
    }
}

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of 32-bit protocol timestamps.
///
/// Ticks wrap; every consumer compares them with wrapping arithmetic.
pub trait Clock {
    fn now(&self) -> u32;
}

/// Milliseconds since the clock was created, wrapping at `u32::MAX`.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u32 {
        // Truncation is the wrap.
        self.origin.elapsed().as_millis() as u32
    }
}

/// Clock advanced by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self {
            ticks: Arc::new(AtomicU32::new(start)),
        }
    }

    pub fn advance(&self, ticks: u32) {
        // fetch_add wraps on overflow
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }

    pub fn set(&self, ticks: u32) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }
}

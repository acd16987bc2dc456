//! Monotonic timestamps for captured frames.

use std::time::Instant;

/// Source of capture timestamps, in nanoseconds on a monotonic clock.
pub trait Clock: Send + Sync {
    fn now_nanos(&self) -> u64;
}

/// Monotonic clock counting from its creation.
#[derive(Debug, Clone, Copy)]
pub struct SteadyClock {
    origin: Instant,
}

impl SteadyClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SteadyClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SteadyClock {
    fn now_nanos(&self) -> u64 {
        // u64 nanoseconds last ~584 years.
        self.origin.elapsed().as_nanos() as u64
    }
}

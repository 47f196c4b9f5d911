//! Delay and clock backed by the standard library.

use std::time::{Duration, Instant};

use crate::traits::{Clock, Delay};

/// Blocking delay using `std::thread::sleep`.
///
/// Sleep granularity on Linux is tens of microseconds, so 100us sample
/// spacing is a lower bound rather than an exact period.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(u64::from(us)));
    }
}

/// Milliseconds since the clock was created.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Start a clock at 0.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        StdDelay.delay_ms(2);
        assert!(clock.now_ms() >= a + 2);
    }
}

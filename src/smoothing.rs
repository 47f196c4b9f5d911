//! Smoothing of power readings before they are published.
//!
//! Two stages sit between the raw RMS power and MQTT:
//!
//! - [`PowerSmoother`]: an exponential moving average that snaps straight
//!   to the new value when load appears, disappears or jumps by more than a
//!   spike threshold, and smooths small changes otherwise.
//! - [`SampleWindow`]: a short FIFO of smoothed readings whose median is
//!   what finally gets published.
//!
//! # Example
//!
//! ```rust
//! use hrv_bridge::smoothing::{EmaState, PowerSmoother};
//!
//! let mut ema = PowerSmoother::default();
//! assert_eq!(ema.update(0.0), 0.0);
//! assert_eq!(ema.update(45.0), 45.0); // load appeared: no lag
//! ema.update(46.0);                   // 0.3 * 46 + 0.7 * 45
//! assert_eq!(ema.published(), 45);
//! assert!(matches!(ema.state(), EmaState::Tracking(_)));
//! ```

use heapless::Deque;

/// Default EMA weight of the newest reading.
pub const EMA_ALPHA: f32 = 0.3;

/// Changes larger than this (watts) bypass smoothing.
pub const SPIKE_THRESHOLD_WATTS: f32 = 50.0;

/// Largest window a [`SampleWindow`] can hold.
pub const MAX_WINDOW: usize = 16;

// ============================================================================
// EMA
// ============================================================================

/// Smoother state for one channel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum EmaState {
    /// No load. The next non-zero reading is taken as is.
    #[default]
    Zero,
    /// Smoothed value in watts.
    Tracking(f32),
}

/// Spike-resetting exponential moving average.
///
/// Transitions per reading `raw`:
///
/// | State | Reading | Next |
/// |-------|---------|------|
/// | any | `raw == 0` | `Zero` |
/// | `Zero` | `raw > 0` | `Tracking(raw)` |
/// | `Tracking(v)` | `abs(raw - v) > threshold` | `Tracking(raw)` |
/// | `Tracking(v)` | otherwise | `Tracking(alpha * raw + (1 - alpha) * v)` |
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerSmoother {
    alpha: f32,
    spike_threshold: f32,
    state: EmaState,
}

impl Default for PowerSmoother {
    fn default() -> Self {
        Self::new(EMA_ALPHA, SPIKE_THRESHOLD_WATTS)
    }
}

impl PowerSmoother {
    /// Create a smoother. `alpha` is clamped to 0.0-1.0.
    pub fn new(alpha: f32, spike_threshold: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            spike_threshold,
            state: EmaState::Zero,
        }
    }

    /// Current state.
    pub fn state(&self) -> EmaState {
        self.state
    }

    /// Current smoothed value in watts.
    pub fn value(&self) -> f32 {
        match self.state {
            EmaState::Zero => 0.0,
            EmaState::Tracking(v) => v,
        }
    }

    /// Smoothed value rounded to whole watts, halves to even.
    pub fn published(&self) -> i32 {
        self.value().round_ties_even() as i32
    }

    /// Feed one raw reading and return the new smoothed value.
    ///
    /// Readings are expected to be non-negative; anything at or below zero
    /// is treated as no load.
    pub fn update(&mut self, raw: f32) -> f32 {
        self.state = match self.state {
            _ if raw <= 0.0 || raw.is_nan() => EmaState::Zero,
            EmaState::Zero => EmaState::Tracking(raw),
            EmaState::Tracking(v) if (raw - v).abs() > self.spike_threshold => {
                EmaState::Tracking(raw)
            }
            EmaState::Tracking(v) => {
                EmaState::Tracking(self.alpha * raw + (1.0 - self.alpha) * v)
            }
        };
        self.value()
    }

    /// Forget history.
    pub fn reset(&mut self) {
        self.state = EmaState::Zero;
    }
}

// ============================================================================
// Sample Window
// ============================================================================

/// Bounded FIFO of readings; the oldest is evicted when full.
#[derive(Clone, Debug)]
pub struct SampleWindow {
    samples: Deque<f32, MAX_WINDOW>,
    capacity: usize,
}

impl SampleWindow {
    /// Create a window holding `capacity` readings (1 to [`MAX_WINDOW`]).
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Deque::new(),
            capacity: capacity.clamp(1, MAX_WINDOW),
        }
    }

    /// Window size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of readings held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no readings are held.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a reading, evicting the oldest if the window is full.
    pub fn push(&mut self, value: f32) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        // Cannot fail: len < capacity <= MAX_WINDOW
        let _ = self.samples.push_back(value);
    }

    /// Readings oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    /// Middle element of the sorted readings (upper median for even counts).
    pub fn median(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: heapless::Vec<f32, MAX_WINDOW> = self.samples.iter().copied().collect();
        sorted.sort_unstable_by(|a, b| a.total_cmp(b));
        sorted.get(sorted.len() / 2).copied()
    }

    /// Drop all readings.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

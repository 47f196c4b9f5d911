//! Shared state for the bridge services.
//!
//! `SharedBridgeState` gives thread-safe access to the calibration tables and
//! the output device. The MQTT loop applies commands through it; any other
//! thread (shutdown path, diagnostics) sees the same tables and outputs.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hrv_bridge::calibration::CalibrationManager;
//! use hrv_bridge::hal::MockOutput;
//! use hrv_bridge::services::SharedBridgeState;
//!
//! let state = Arc::new(SharedBridgeState::new(
//!     CalibrationManager::default(),
//!     MockOutput::new(),
//! ));
//!
//! let duty = state.set_output_percent(18, 25.0).unwrap();
//! assert!((duty - 25.0).abs() < 0.01);
//! state.with_output(|out| assert_eq!(out.duty(18), Some(duty)));
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::info;

use crate::calibration::{CalibrationError, CalibrationManager};
use crate::hal::SystemClock;
use crate::traits::{AnalogOutput, ChannelId, Clock};

// ============================================================================
// Output Snapshot
// ============================================================================

/// Last values applied to the outputs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputSnapshot {
    /// Applied duty cycle per PWM channel
    pub duties: BTreeMap<ChannelId, f32>,
    /// Level per digital channel
    pub digitals: BTreeMap<ChannelId, bool>,
}

// ============================================================================
// Shared Bridge State
// ============================================================================

/// Shared state for all bridge services.
///
/// # Thread Safety
///
/// - Calibration and output have separate locks. A percent command takes the
///   calibration lock only long enough to compute the duty.
/// - A poisoned lock is recovered rather than propagated: the guarded data
///   stays valid after any panic in a closure.
/// - All timestamps come from the same clock.
pub struct SharedBridgeState<O: AnalogOutput> {
    calibration: Mutex<CalibrationManager>,
    output: Mutex<O>,
    snapshot: Mutex<OutputSnapshot>,
    clock: SystemClock,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<O: AnalogOutput> SharedBridgeState<O> {
    /// Create shared state. The clock starts at 0 now.
    pub fn new(calibration: CalibrationManager, output: O) -> Self {
        Self {
            calibration: Mutex::new(calibration),
            output: Mutex::new(output),
            snapshot: Mutex::new(OutputSnapshot::default()),
            clock: SystemClock::new(),
        }
    }

    /// Milliseconds since the state was created.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Access the calibration manager with the lock held.
    pub fn with_calibration<R>(&self, f: impl FnOnce(&mut CalibrationManager) -> R) -> R {
        f(&mut lock(&self.calibration))
    }

    /// Access the output device with the lock held.
    pub fn with_output<R>(&self, f: impl FnOnce(&mut O) -> R) -> R {
        f(&mut lock(&self.output))
    }

    /// Copy of the last applied output values.
    pub fn snapshot(&self) -> OutputSnapshot {
        lock(&self.snapshot).clone()
    }

    /// Drive a PWM channel to a calibrated percent. Returns the duty applied.
    pub fn set_output_percent(&self, channel: ChannelId, percent: f32) -> Result<f32, O::Error> {
        let duty = self.with_calibration(|cal| cal.pwm_for_percent(channel, percent));
        self.set_duty(channel, duty)?;
        info!("GPIO{} output {:.1}% -> duty {:.1}%", channel, percent, duty);
        Ok(duty)
    }

    /// Drive a PWM channel to a raw duty cycle (clamped to 0-100).
    pub fn set_duty(&self, channel: ChannelId, duty: f32) -> Result<f32, O::Error> {
        let duty = if duty.is_nan() { 0.0 } else { duty.clamp(0.0, 100.0) };
        self.with_output(|out| out.set_duty(channel, duty))?;
        lock(&self.snapshot).duties.insert(channel, duty);
        Ok(duty)
    }

    /// Switch a digital output.
    pub fn set_digital(&self, channel: ChannelId, on: bool) -> Result<(), O::Error> {
        self.with_output(|out| out.set_digital(channel, on))?;
        lock(&self.snapshot).digitals.insert(channel, on);
        info!("GPIO{} set to {}", channel, u8::from(on));
        Ok(())
    }

    /// Drive every PWM channel to 0 and the digital output off.
    pub fn all_off(&self, pwm: &[ChannelId], digital: ChannelId) -> Result<(), O::Error> {
        self.with_output(|out| out.all_off(pwm, digital))?;
        let mut snapshot = lock(&self.snapshot);
        for &ch in pwm {
            snapshot.duties.insert(ch, 0.0);
        }
        snapshot.digitals.insert(digital, false);
        Ok(())
    }

    /// Replace a channel's calibration table from JSON.
    pub fn update_calibration(
        &self,
        channel: ChannelId,
        payload: &str,
    ) -> Result<usize, CalibrationError> {
        self.with_calibration(|cal| cal.update_table(channel, payload))
    }

    /// A channel's active calibration table as JSON.
    pub fn calibration_json(&self, channel: ChannelId) -> String {
        self.with_calibration(|cal| cal.export_json(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockOutput;

    fn state() -> SharedBridgeState<MockOutput> {
        SharedBridgeState::new(CalibrationManager::default(), MockOutput::new())
    }

    #[test]
    fn clock_starts_near_zero() {
        assert!(state().now_ms() < 100);
    }

    #[test]
    fn percent_goes_through_calibration() {
        let state = state();
        state
            .update_calibration(18, r#"{"0": 0.0, "50": 8.0, "100": 10.0}"#)
            .unwrap();

        // 4V sits halfway up the 0-50 segment
        let duty = state.set_output_percent(18, 40.0).unwrap();
        assert!((duty - 25.0).abs() < 0.01);
        state.with_output(|out| assert_eq!(out.duty(18), Some(duty)));
        assert_eq!(state.snapshot().duties.get(&18), Some(&duty));
    }

    #[test]
    fn raw_duty_clamped() {
        let state = state();
        assert_eq!(state.set_duty(19, 140.0).unwrap(), 100.0);
        assert_eq!(state.set_duty(19, f32::NAN).unwrap(), 0.0);
    }

    #[test]
    fn all_off_updates_snapshot() {
        let state = state();
        state.set_duty(18, 50.0).unwrap();
        state.set_digital(17, true).unwrap();
        state.all_off(&[18, 19], 17).unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.duties.get(&18), Some(&0.0));
        assert_eq!(snapshot.duties.get(&19), Some(&0.0));
        assert_eq!(snapshot.digitals.get(&17), Some(&false));
    }

    #[test]
    fn failed_write_leaves_snapshot() {
        let state = state();
        state.with_output(|out| out.fail = true);
        assert!(state.set_duty(18, 10.0).is_err());
        assert!(state.snapshot().duties.is_empty());
    }

    #[test]
    fn rejected_calibration_keeps_table() {
        let state = state();
        let before = state.calibration_json(18);
        assert!(state.update_calibration(18, r#"{"50": 5.0}"#).is_err());
        assert_eq!(state.calibration_json(18), before);
    }

    #[test]
    fn shared_across_threads() {
        use std::sync::Arc;
        let state = Arc::new(state());
        let worker = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                state
                    .update_calibration(19, r#"{"0": 0.0, "100": 5.0}"#)
                    .unwrap();
            })
        };
        worker.join().unwrap();
        // 5V is now full scale on GPIO19: 40% (4V) needs 80% duty
        let duty = state.set_output_percent(19, 40.0).unwrap();
        assert!((duty - 80.0).abs() < 0.01);
    }
}

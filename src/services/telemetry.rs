//! Publish scheduling for sensor readings.
//!
//! The sensor threads sample far more often than anything is published.
//! This module decides what reaches MQTT:
//!
//! - [`CurrentPublisher`]: median of the last few filtered power readings,
//!   published when it changes or when it has not been sent for a while.
//! - [`ChangeTracker`]: publish-on-change for CO2 values.
//! - [`CurrentTask`]: one sampling step of the current thread.
//! - [`simulated_current_task`]: a task on a synthetic load, only when
//!   simulation is switched on.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::config::CurrentConfig;
use crate::current::CurrentMonitor;
use crate::hal::{SimulatedAdc, SIM_LOAD_AMPS};
use crate::smoothing::SampleWindow;
use crate::traits::{AnalogInput, ChannelId, Delay};

// ============================================================================
// Current Publisher
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct LastPublish {
    watts: i32,
    at_ms: u64,
}

/// Median-window publisher for power readings.
///
/// Every filtered reading goes into a per-channel [`SampleWindow`]. After
/// `samples_per_publish` readings the median of each window is compared
/// against the last value published for that channel; it is published if
/// nothing was published yet, if it differs, or if `force_after_ms` passed.
#[derive(Clone, Debug)]
pub struct CurrentPublisher {
    windows: BTreeMap<ChannelId, SampleWindow>,
    last: BTreeMap<ChannelId, LastPublish>,
    window_size: usize,
    samples_per_publish: usize,
    samples_since_publish: usize,
    force_after_ms: u64,
}

impl CurrentPublisher {
    /// Create a publisher.
    ///
    /// `samples_per_publish` and `window_size` are raised to at least 1.
    pub fn new(window_size: usize, samples_per_publish: usize, force_after_ms: u64) -> Self {
        Self {
            windows: BTreeMap::new(),
            last: BTreeMap::new(),
            window_size: window_size.max(1),
            samples_per_publish: samples_per_publish.max(1),
            samples_since_publish: 0,
            force_after_ms,
        }
    }

    /// Publisher matching a current sensing config.
    pub fn from_config(config: &CurrentConfig) -> Self {
        let per_publish = config.publish_period_ms / config.sample_period_ms.max(1);
        Self::new(
            config.window_size,
            usize::try_from(per_publish).unwrap_or(usize::MAX),
            config.force_publish_ms,
        )
    }

    /// Record one set of filtered readings taken at `now_ms`.
    ///
    /// Returns the `(channel, watts)` values to publish when a publish
    /// point is reached, otherwise an empty list.
    pub fn record(&mut self, readings: &BTreeMap<ChannelId, i32>, now_ms: u64) -> Vec<(ChannelId, i32)> {
        let window_size = self.window_size;
        for (&ch, &watts) in readings {
            self.windows
                .entry(ch)
                .or_insert_with(|| SampleWindow::new(window_size))
                .push(watts as f32);
        }

        self.samples_since_publish += 1;
        if self.samples_since_publish < self.samples_per_publish {
            return Vec::new();
        }
        self.samples_since_publish = 0;
        self.due(now_ms)
    }

    fn due(&mut self, now_ms: u64) -> Vec<(ChannelId, i32)> {
        let mut out = Vec::new();
        for (&ch, window) in &self.windows {
            let Some(median) = window.median() else {
                continue;
            };
            let watts = median as i32;

            let publish = match self.last.get(&ch) {
                None => true,
                Some(last) => {
                    last.watts != watts || now_ms.saturating_sub(last.at_ms) >= self.force_after_ms
                }
            };

            if publish {
                self.last.insert(ch, LastPublish { watts, at_ms: now_ms });
                out.push((ch, watts));
            }
        }
        out
    }

    /// Last published value for a channel.
    pub fn last_published(&self, channel: ChannelId) -> Option<i32> {
        self.last.get(&channel).map(|l| l.watts)
    }
}

// ============================================================================
// Change Tracker
// ============================================================================

/// Remembers the last published value and reports only changes.
#[derive(Clone, Debug, Default)]
pub struct ChangeTracker<T> {
    last: Option<T>,
}

impl<T: PartialEq + Copy> ChangeTracker<T> {
    /// Create a tracker with nothing published.
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Returns `Some(value)` if it differs from the last accepted value.
    pub fn update(&mut self, value: T) -> Option<T> {
        if self.last == Some(value) {
            None
        } else {
            self.last = Some(value);
            Some(value)
        }
    }

    /// Last accepted value.
    pub fn last(&self) -> Option<T> {
        self.last
    }
}

// ============================================================================
// Current Task
// ============================================================================

/// The current sensing thread's work: sample, smooth, window, decide.
pub struct CurrentTask<A, D> {
    monitor: CurrentMonitor<A, D>,
    publisher: CurrentPublisher,
}

impl<A, D> CurrentTask<A, D>
where
    A: AnalogInput,
    D: Delay,
{
    /// Build the task from a config.
    pub fn new(adc: A, delay: D, config: &CurrentConfig) -> Self {
        let monitor = CurrentMonitor::new(
            adc,
            delay,
            &config.channels,
            |ch| config.sensor_settings(ch),
            config.smoother(),
        );
        Self {
            monitor,
            publisher: CurrentPublisher::from_config(config),
        }
    }

    /// The underlying monitor.
    pub fn monitor(&mut self) -> &mut CurrentMonitor<A, D> {
        &mut self.monitor
    }

    /// Calibrate every channel's bias. Call before any load runs.
    pub fn calibrate(&mut self, readings: usize) -> Result<BTreeMap<ChannelId, f32>, A::Error> {
        self.monitor.calibrate_all(readings)
    }

    /// Take one filtered reading of every channel.
    ///
    /// Returns the values to publish, if this step reached a publish point.
    pub fn step(&mut self, now_ms: u64) -> Result<Vec<(ChannelId, i32)>, A::Error> {
        let readings = self.monitor.read_all_power_filtered()?;
        debug!("Power readings: {:?}", readings);
        let due = self.publisher.record(&readings, now_ms);
        for (ch, watts) in &due {
            info!("AD{} power: {}W", ch, watts);
        }
        Ok(due)
    }
}

/// Current task on a synthetic load, for running without an ADC driver.
///
/// Returns `None` unless current sensing is enabled and `simulate` is set,
/// so no made-up power ever reaches MQTT by default. The first configured
/// channel draws [`SIM_LOAD_AMPS`]; the others are idle.
pub fn simulated_current_task<D: Delay>(
    config: &CurrentConfig,
    delay: D,
) -> Option<CurrentTask<SimulatedAdc, D>> {
    if !config.enabled {
        return None;
    }
    if !config.simulate {
        warn!("No ADC driver, current sensing disabled (enable simulation to use a synthetic load)");
        return None;
    }
    let first = *config.channels.first()?;
    warn!(
        "Simulating a {:.1}A load on AD{}; published power is not measured",
        SIM_LOAD_AMPS, first
    );
    let adc = SimulatedAdc::new().with_load(first, SIM_LOAD_AMPS);
    Some(CurrentTask::new(adc, delay, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockAdc, MockDelay};

    fn readings(pairs: &[(ChannelId, i32)]) -> BTreeMap<ChannelId, i32> {
        pairs.iter().copied().collect()
    }

    // =========================================================================
    // CurrentPublisher
    // =========================================================================

    #[test]
    fn publishes_every_nth_sample() {
        let mut publisher = CurrentPublisher::new(5, 5, 60_000);
        for i in 0..4 {
            assert!(publisher.record(&readings(&[(0, 40)]), i * 200).is_empty());
        }
        assert_eq!(publisher.record(&readings(&[(0, 40)]), 800), vec![(0, 40)]);
    }

    #[test]
    fn median_rejects_single_spike() {
        let mut publisher = CurrentPublisher::new(5, 5, 60_000);
        let mut out = Vec::new();
        for (i, w) in [40, 41, 480, 40, 42].iter().enumerate() {
            out = publisher.record(&readings(&[(0, *w)]), i as u64 * 200);
        }
        assert_eq!(out, vec![(0, 41)]);
    }

    #[test]
    fn unchanged_value_waits_for_force_interval() {
        let mut publisher = CurrentPublisher::new(5, 1, 60_000);
        assert_eq!(publisher.record(&readings(&[(0, 40)]), 0), vec![(0, 40)]);
        assert!(publisher.record(&readings(&[(0, 40)]), 1_000).is_empty());
        assert!(publisher.record(&readings(&[(0, 40)]), 59_999).is_empty());
        assert_eq!(
            publisher.record(&readings(&[(0, 40)]), 60_000),
            vec![(0, 40)]
        );
    }

    #[test]
    fn change_publishes_immediately_per_channel() {
        let mut publisher = CurrentPublisher::new(1, 1, 60_000);
        assert_eq!(
            publisher.record(&readings(&[(0, 10), (1, 20)]), 0),
            vec![(0, 10), (1, 20)]
        );
        assert_eq!(
            publisher.record(&readings(&[(0, 10), (1, 25)]), 1_000),
            vec![(1, 25)]
        );
        assert_eq!(publisher.last_published(1), Some(25));
    }

    #[test]
    fn from_config_uses_periods() {
        let mut publisher = CurrentPublisher::from_config(&CurrentConfig::default());
        for i in 0..4 {
            assert!(publisher.record(&readings(&[(0, 5)]), i).is_empty());
        }
        assert_eq!(publisher.record(&readings(&[(0, 5)]), 4).len(), 1);
    }

    // =========================================================================
    // ChangeTracker
    // =========================================================================

    #[test]
    fn change_tracker_reports_changes_only() {
        let mut tracker = ChangeTracker::new();
        assert_eq!(tracker.update(650u16), Some(650));
        assert_eq!(tracker.update(650), None);
        assert_eq!(tracker.update(700), Some(700));
        assert_eq!(tracker.last(), Some(700));
    }

    // =========================================================================
    // CurrentTask
    // =========================================================================

    #[test]
    fn task_publishes_after_window() {
        let mut adc = MockAdc::new();
        adc.set_square(0, 1.65, 0.1);
        adc.set_constant(1, 1.65);
        let config = CurrentConfig::default().with_channels(&[0, 1]).with_gain(1, 1.0);
        let mut task = CurrentTask::new(adc, MockDelay::new(), &config);

        let mut published = Vec::new();
        for i in 0..5 {
            published = task.step(i * 200).unwrap();
        }
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, 0);
        assert!((published[0].1 - 115).abs() <= 1);
        assert_eq!(published[1], (1, 0));
    }

    #[test]
    fn task_read_error_propagates() {
        let mut adc = MockAdc::new();
        adc.fail_channel(0);
        let config = CurrentConfig::default().with_channels(&[0]);
        let mut task = CurrentTask::new(adc, MockDelay::new(), &config);
        assert!(task.step(0).is_err());
    }

    #[test]
    fn no_simulation_without_flag() {
        let config = CurrentConfig::default();
        assert!(simulated_current_task(&config, MockDelay::new()).is_none());

        let disabled = config.clone().with_simulate(true).with_enabled(false);
        assert!(simulated_current_task(&disabled, MockDelay::new()).is_none());

        let no_channels = config.with_simulate(true).with_channels(&[]);
        assert!(simulated_current_task(&no_channels, MockDelay::new()).is_none());
    }

    #[test]
    fn simulated_task_loads_first_channel() {
        let config = CurrentConfig::default().with_simulate(true);
        let mut task = simulated_current_task(&config, MockDelay::new()).unwrap();

        let mut published = Vec::new();
        for i in 0..5 {
            published = task.step(i * 200).unwrap();
        }
        assert_eq!(published.len(), 2);
        // 0.2A * 230V = 46W, read slightly low after trimming the peaks
        assert!(published[0].1 > 30 && published[0].1 <= 46, "{:?}", published);
        assert_eq!(published[1], (1, 0));
    }
}

//! AC current and power measurement from SCT013 current transformers.
//!
//! An SCT013-005 produces 1V AC per 5A through the clamp. A voltage divider
//! centres that signal around a DC bias (about 1.65V) so a single-ended ADC
//! can sample it. One measurement:
//!
//! 1. Sample the channel for at least one mains cycle (200 x 100us = 20ms)
//! 2. Trim the lowest and highest 10% of samples (plug/unplug spikes)
//! 3. Subtract the bias and take the RMS
//! 4. Scale to amps, then to watts at 230V and unity power factor
//! 5. Apply the per-channel gain, then force implausible values to 0
//!
//! [`CurrentMonitor`] runs this for several channels and feeds the results
//! through a [`PowerSmoother`] per channel.
//!
//! # Example
//!
//! ```rust
//! use hrv_bridge::current::{CurrentMonitor, SensorSettings};
//! use hrv_bridge::hal::{MockAdc, MockDelay};
//! use hrv_bridge::smoothing::PowerSmoother;
//!
//! let mut adc = MockAdc::new();
//! // 0.1V RMS around 1.65V bias -> 0.5A -> 115W
//! adc.set_square(0, 1.65, 0.1);
//!
//! let mut monitor = CurrentMonitor::new(
//!     adc,
//!     MockDelay::new(),
//!     &[0],
//!     |_| SensorSettings::default(),
//!     PowerSmoother::default(),
//! );
//! let watts = monitor.read_all_power_filtered().unwrap();
//! assert!((watts[&0] - 115).abs() <= 1);
//! ```

use std::collections::BTreeMap;

use log::{debug, info};

use crate::smoothing::PowerSmoother;
use crate::traits::{AnalogInput, ChannelId, Delay};

/// Amps per volt of sensor output (SCT013-005).
pub const SCT013_RATIO: f32 = 5.0;

/// Samples per measurement.
pub const DEFAULT_SAMPLES: usize = 200;

/// Minimum spacing between samples in microseconds.
pub const DEFAULT_SAMPLE_INTERVAL_US: u32 = 100;

/// Mains voltage used for the watts conversion.
pub const MAINS_VOLTAGE: f32 = 230.0;

/// Readings below this many watts are reported as 0.
pub const NOISE_FLOOR_WATTS: f32 = 3.0;

/// Readings above this many watts mean a floating input and are reported as 0.
pub const MAX_POWER_WATTS: f32 = 500.0;

/// Percent of samples trimmed from each end before the RMS.
pub const OUTLIER_PERCENTILE: u8 = 10;

/// Largest accepted trim percentile; keeps at least two samples.
pub const MAX_OUTLIER_PERCENTILE: u8 = 45;

/// Batches smaller than this are not trimmed.
pub const MIN_SAMPLES_FOR_TRIM: usize = 10;

/// Readings averaged during bias calibration.
pub const BIAS_READINGS: usize = 10;

/// Wait between bias calibration readings in milliseconds.
pub const BIAS_READING_INTERVAL_MS: u32 = 10;

/// Current above which a load counts as running.
pub const CURRENT_FLOWING_AMPS: f32 = 0.1;

// ============================================================================
// Signal processing
// ============================================================================

/// Drop the lowest and highest `percentile` percent of samples.
///
/// Batches with fewer than [`MIN_SAMPLES_FOR_TRIM`] samples are returned as
/// is (unsorted). Otherwise the result is sorted and at least one sample is
/// trimmed from each end. `percentile` is capped at
/// [`MAX_OUTLIER_PERCENTILE`].
pub fn filter_outliers(samples: &[f32], percentile: u8) -> Vec<f32> {
    if samples.len() < MIN_SAMPLES_FOR_TRIM {
        return samples.to_vec();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));

    let percentile = percentile.min(MAX_OUTLIER_PERCENTILE) as usize;
    let trim = (sorted.len() * percentile / 100).max(1);
    sorted[trim..sorted.len() - trim].to_vec()
}

/// RMS of the AC component of `samples`.
///
/// Outliers are trimmed first. With no `bias` the mean of the trimmed
/// samples is used. An empty batch gives exactly 0.0.
pub fn calculate_rms(samples: &[f32], bias: Option<f32>, percentile: u8) -> f32 {
    let filtered = filter_outliers(samples, percentile);
    if filtered.is_empty() {
        return 0.0;
    }

    let n = filtered.len() as f32;
    let bias = bias.unwrap_or_else(|| filtered.iter().sum::<f32>() / n);
    let sum_squares: f32 = filtered.iter().map(|s| (s - bias) * (s - bias)).sum();
    (sum_squares / n).sqrt()
}

// ============================================================================
// Sensor settings
// ============================================================================

/// Tunables of one current sensor channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorSettings {
    /// Amps per volt of sensor output.
    pub ratio: f32,
    /// Samples per measurement.
    pub samples: usize,
    /// Microseconds between samples.
    pub sample_interval_us: u32,
    /// Percent trimmed from each end of the sorted batch.
    pub outlier_percentile: u8,
    /// Mains voltage for the watts conversion.
    pub mains_voltage: f32,
    /// Channel gain correction applied to watts.
    pub gain: f32,
    /// Watts below which the reading is 0.
    pub noise_floor_watts: f32,
    /// Watts above which the sensor is considered disconnected.
    pub max_power_watts: f32,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            ratio: SCT013_RATIO,
            samples: DEFAULT_SAMPLES,
            sample_interval_us: DEFAULT_SAMPLE_INTERVAL_US,
            outlier_percentile: OUTLIER_PERCENTILE,
            mains_voltage: MAINS_VOLTAGE,
            gain: 1.0,
            noise_floor_watts: NOISE_FLOOR_WATTS,
            max_power_watts: MAX_POWER_WATTS,
        }
    }
}

impl SensorSettings {
    /// Set the channel gain correction.
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    /// Set the number of samples per measurement.
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    /// Convert RMS amps to watts, applying gain and both clamps.
    ///
    /// Power factor is taken as 1.0.
    pub fn power_from_current(&self, amps: f32) -> f32 {
        let watts = amps * self.mains_voltage * self.gain;
        if watts < self.noise_floor_watts || watts > self.max_power_watts || watts.is_nan() {
            0.0
        } else {
            watts
        }
    }
}

// ============================================================================
// Current Sensor
// ============================================================================

/// One current transformer on one ADC channel.
///
/// The sensor holds only its settings and bias; the ADC and delay are
/// borrowed per call so several sensors can share one converter.
#[derive(Clone, Debug)]
pub struct CurrentSensor {
    channel: ChannelId,
    settings: SensorSettings,
    bias: Option<f32>,
}

impl CurrentSensor {
    /// Create a sensor with no calibrated bias.
    pub fn new(channel: ChannelId, settings: SensorSettings) -> Self {
        Self {
            channel,
            settings,
            bias: None,
        }
    }

    /// ADC channel.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Settings in use.
    pub fn settings(&self) -> &SensorSettings {
        &self.settings
    }

    /// Calibrated bias voltage, if any.
    pub fn bias(&self) -> Option<f32> {
        self.bias
    }

    /// Set or clear the bias voltage.
    pub fn set_bias(&mut self, bias: Option<f32>) {
        self.bias = bias;
    }

    /// Measure the DC bias by averaging `num_readings` samples taken 10ms
    /// apart. Call with no current flowing, before any load is applied.
    pub fn calibrate_bias<A, D>(
        &mut self,
        adc: &mut A,
        delay: &mut D,
        num_readings: usize,
    ) -> Result<f32, A::Error>
    where
        A: AnalogInput,
        D: Delay,
    {
        let num_readings = num_readings.max(1);
        let mut total = 0.0;
        for _ in 0..num_readings {
            total += adc.read_voltage(self.channel)?;
            delay.delay_ms(BIAS_READING_INTERVAL_MS);
        }
        let bias = total / num_readings as f32;
        self.bias = Some(bias);
        info!("Channel {} bias calibrated: {:.4}V", self.channel, bias);
        Ok(bias)
    }

    /// Take one batch of raw voltage samples.
    pub fn read_raw_samples<A, D>(&self, adc: &mut A, delay: &mut D) -> Result<Vec<f32>, A::Error>
    where
        A: AnalogInput,
        D: Delay,
    {
        let mut samples = Vec::with_capacity(self.settings.samples);
        for _ in 0..self.settings.samples {
            samples.push(adc.read_voltage(self.channel)?);
            delay.delay_us(self.settings.sample_interval_us);
        }
        Ok(samples)
    }

    /// RMS current in amps for a batch of samples.
    pub fn current_from_samples(&self, samples: &[f32]) -> f32 {
        calculate_rms(samples, self.bias, self.settings.outlier_percentile) * self.settings.ratio
    }

    /// Clamped power in watts for a batch of samples.
    pub fn power_from_samples(&self, samples: &[f32]) -> f32 {
        self.settings
            .power_from_current(self.current_from_samples(samples))
    }

    /// Measure RMS current in amps.
    pub fn read_current<A, D>(&self, adc: &mut A, delay: &mut D) -> Result<f32, A::Error>
    where
        A: AnalogInput,
        D: Delay,
    {
        let samples = self.read_raw_samples(adc, delay)?;
        Ok(self.current_from_samples(&samples))
    }

    /// Mean of `num_readings` current measurements.
    pub fn read_current_averaged<A, D>(
        &self,
        adc: &mut A,
        delay: &mut D,
        num_readings: usize,
    ) -> Result<f32, A::Error>
    where
        A: AnalogInput,
        D: Delay,
    {
        let num_readings = num_readings.max(1);
        let mut total = 0.0;
        for _ in 0..num_readings {
            total += self.read_current(adc, delay)?;
        }
        Ok(total / num_readings as f32)
    }

    /// Measure power in watts (noise floor and disconnect clamps applied).
    pub fn read_power<A, D>(&self, adc: &mut A, delay: &mut D) -> Result<f32, A::Error>
    where
        A: AnalogInput,
        D: Delay,
    {
        let samples = self.read_raw_samples(adc, delay)?;
        let watts = self.power_from_samples(&samples);
        debug!("Channel {} power: {:.1}W", self.channel, watts);
        Ok(watts)
    }

    /// Returns true if the measured current exceeds `threshold` amps.
    pub fn is_current_flowing<A, D>(
        &self,
        adc: &mut A,
        delay: &mut D,
        threshold: f32,
    ) -> Result<bool, A::Error>
    where
        A: AnalogInput,
        D: Delay,
    {
        Ok(self.read_current(adc, delay)? > threshold)
    }
}

// ============================================================================
// Current Monitor
// ============================================================================

/// Several current sensors sharing one ADC, with per-channel smoothing.
pub struct CurrentMonitor<A, D> {
    adc: A,
    delay: D,
    sensors: BTreeMap<ChannelId, CurrentSensor>,
    smoothers: BTreeMap<ChannelId, PowerSmoother>,
}

impl<A, D> CurrentMonitor<A, D>
where
    A: AnalogInput,
    D: Delay,
{
    /// Create a monitor for `channels`.
    ///
    /// `settings` supplies each channel's sensor settings; `smoother` is the
    /// template copied for every channel.
    pub fn new(
        adc: A,
        delay: D,
        channels: &[ChannelId],
        settings: impl Fn(ChannelId) -> SensorSettings,
        smoother: PowerSmoother,
    ) -> Self {
        let sensors = channels
            .iter()
            .map(|&ch| (ch, CurrentSensor::new(ch, settings(ch))))
            .collect();
        let smoothers = channels.iter().map(|&ch| (ch, smoother)).collect();
        Self {
            adc,
            delay,
            sensors,
            smoothers,
        }
    }

    /// Monitored channels, ascending.
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.sensors.keys().copied()
    }

    /// Sensor for a channel.
    pub fn sensor(&self, channel: ChannelId) -> Option<&CurrentSensor> {
        self.sensors.get(&channel)
    }

    /// Mutable sensor for a channel.
    pub fn sensor_mut(&mut self, channel: ChannelId) -> Option<&mut CurrentSensor> {
        self.sensors.get_mut(&channel)
    }

    /// Smoother for a channel.
    pub fn smoother(&self, channel: ChannelId) -> Option<&PowerSmoother> {
        self.smoothers.get(&channel)
    }

    /// The underlying ADC.
    pub fn adc_mut(&mut self) -> &mut A {
        &mut self.adc
    }

    /// Calibrate the bias of every sensor. Returns channel -> bias volts.
    pub fn calibrate_all(&mut self, num_readings: usize) -> Result<BTreeMap<ChannelId, f32>, A::Error> {
        let mut biases = BTreeMap::new();
        for (&ch, sensor) in self.sensors.iter_mut() {
            let bias = sensor.calibrate_bias(&mut self.adc, &mut self.delay, num_readings)?;
            biases.insert(ch, bias);
        }
        Ok(biases)
    }

    /// Current in amps for every channel.
    pub fn read_all(&mut self) -> Result<BTreeMap<ChannelId, f32>, A::Error> {
        let mut readings = BTreeMap::new();
        for (&ch, sensor) in &self.sensors {
            readings.insert(ch, sensor.read_current(&mut self.adc, &mut self.delay)?);
        }
        Ok(readings)
    }

    /// Averaged current in amps for every channel.
    pub fn read_all_averaged(
        &mut self,
        num_readings: usize,
    ) -> Result<BTreeMap<ChannelId, f32>, A::Error> {
        let mut readings = BTreeMap::new();
        for (&ch, sensor) in &self.sensors {
            let amps = sensor.read_current_averaged(&mut self.adc, &mut self.delay, num_readings)?;
            readings.insert(ch, amps);
        }
        Ok(readings)
    }

    /// Unsmoothed power in watts for every channel.
    pub fn read_all_power(&mut self) -> Result<BTreeMap<ChannelId, f32>, A::Error> {
        let mut readings = BTreeMap::new();
        for (&ch, sensor) in &self.sensors {
            readings.insert(ch, sensor.read_power(&mut self.adc, &mut self.delay)?);
        }
        Ok(readings)
    }

    /// Smoothed power in whole watts for every channel.
    ///
    /// Each raw reading advances that channel's [`PowerSmoother`]. A read
    /// error aborts the pass; smoothers already advanced keep their state.
    pub fn read_all_power_filtered(&mut self) -> Result<BTreeMap<ChannelId, i32>, A::Error> {
        let mut readings = BTreeMap::new();
        for (&ch, sensor) in &self.sensors {
            let raw = sensor.read_power(&mut self.adc, &mut self.delay)?;
            let smoother = self.smoothers.entry(ch).or_default();
            smoother.update(raw);
            readings.insert(ch, smoother.published());
        }
        Ok(readings)
    }
}

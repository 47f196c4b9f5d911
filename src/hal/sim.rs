//! Simulation devices used when no driver board is attached.
//!
//! [`SimulatedOutput`] and [`SimulatedDac`] accept every write and log it.
//! [`SimulatedAdc`] produces a sine around a fixed bias per channel, so the
//! whole current pipeline can be exercised on a desktop. It is only used
//! when simulation is switched on; otherwise current sensing stays off.

use std::collections::BTreeMap;

use log::info;

use crate::config::OutputConfig;
use crate::traits::{
    AnalogInput, AnalogOutput, ChannelId, Co2Reading, Co2Sensor, VoltageOutput,
};

/// Bias voltage of the simulated current transformer inputs.
pub const SIM_BIAS_VOLTS: f32 = 1.65;

/// Samples per simulated mains cycle.
pub const SIM_CYCLE_SAMPLES: u32 = 200;

/// RMS amps drawn on the first current channel in simulation.
pub const SIM_LOAD_AMPS: f32 = 0.2;

/// Output device that only logs.
#[derive(Debug, Default)]
pub struct SimulatedOutput {
    duties: BTreeMap<ChannelId, f32>,
    digitals: BTreeMap<ChannelId, bool>,
    pins: BTreeMap<ChannelId, u8>,
    frequency_hz: u32,
}

impl SimulatedOutput {
    /// Create a simulated output with every channel off and no pin map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated output wired as described by the output config.
    pub fn from_config(config: &OutputConfig) -> Self {
        let pins = config
            .all_channels()
            .iter()
            .filter_map(|&ch| config.pin_for(ch).map(|pin| (ch, pin)))
            .collect();
        info!(
            "[sim] PWM at {} Hz, pins {:?}",
            config.pwm_frequency_hz, pins
        );
        Self {
            pins,
            frequency_hz: config.pwm_frequency_hz,
            ..Self::default()
        }
    }

    /// Physical pin driving a channel.
    pub fn pin(&self, channel: ChannelId) -> Option<u8> {
        self.pins.get(&channel).copied()
    }

    /// PWM frequency in Hz; 0 if not configured.
    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    fn describe(&self, channel: ChannelId) -> String {
        match self.pin(channel) {
            Some(pin) => format!("GPIO{} (pin {})", channel, pin),
            None => format!("GPIO{}", channel),
        }
    }

    /// Last duty set on a channel.
    pub fn duty(&self, channel: ChannelId) -> Option<f32> {
        self.duties.get(&channel).copied()
    }

    /// Last level set on a digital channel.
    pub fn digital(&self, channel: ChannelId) -> Option<bool> {
        self.digitals.get(&channel).copied()
    }
}

impl AnalogOutput for SimulatedOutput {
    type Error = core::convert::Infallible;

    fn set_duty(&mut self, channel: ChannelId, duty: f32) -> Result<(), Self::Error> {
        let duty = duty.clamp(0.0, 100.0);
        info!(
            "[sim] {} duty {:.1}% at {} Hz",
            self.describe(channel),
            duty,
            self.frequency_hz
        );
        self.duties.insert(channel, duty);
        Ok(())
    }

    fn set_digital(&mut self, channel: ChannelId, on: bool) -> Result<(), Self::Error> {
        info!("[sim] {} {}", self.describe(channel), if on { "ON" } else { "OFF" });
        self.digitals.insert(channel, on);
        Ok(())
    }
}

/// DAC that only logs. Voltages are clamped to 0..=`full_scale` volts.
#[derive(Debug)]
pub struct SimulatedDac {
    full_scale: f32,
    voltages: BTreeMap<ChannelId, f32>,
}

impl SimulatedDac {
    /// Create a DAC whose outputs span 0 to `full_scale` volts.
    pub fn new(full_scale: f32) -> Self {
        Self {
            full_scale: full_scale.max(0.0),
            voltages: BTreeMap::new(),
        }
    }

    /// Last voltage set on a channel.
    pub fn voltage(&self, channel: ChannelId) -> Option<f32> {
        self.voltages.get(&channel).copied()
    }
}

impl VoltageOutput for SimulatedDac {
    type Error = core::convert::Infallible;

    fn set_voltage(&mut self, channel: ChannelId, volts: f32) -> Result<(), Self::Error> {
        let volts = volts.clamp(0.0, self.full_scale);
        info!("[sim] DAC channel {} -> {:.3}V", channel, volts);
        self.voltages.insert(channel, volts);
        Ok(())
    }
}

/// ADC producing a bias-centred sine per channel.
///
/// The amplitude is the peak voltage swing; channels without one read a
/// flat bias (no load).
#[derive(Debug, Default)]
pub struct SimulatedAdc {
    amplitudes: BTreeMap<ChannelId, f32>,
    sample: u32,
}

impl SimulatedAdc {
    /// Create a simulated ADC with no load on any channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a load drawing `amps` RMS through a 5 A/V clamp.
    pub fn with_load(mut self, channel: ChannelId, amps: f32) -> Self {
        let rms_volts = amps / crate::current::SCT013_RATIO;
        self.amplitudes
            .insert(channel, rms_volts * core::f32::consts::SQRT_2);
        self
    }
}

impl AnalogInput for SimulatedAdc {
    type Error = core::convert::Infallible;

    fn read_voltage(&mut self, channel: ChannelId) -> Result<f32, Self::Error> {
        let n = self.sample % SIM_CYCLE_SAMPLES;
        self.sample = self.sample.wrapping_add(1);
        let amplitude = self.amplitudes.get(&channel).copied().unwrap_or(0.0);
        let angle = 2.0 * core::f32::consts::PI * n as f32 / SIM_CYCLE_SAMPLES as f32;
        Ok(SIM_BIAS_VOLTS + amplitude * angle.sin())
    }
}

/// Error returned by [`NoCo2Sensor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoSensor;

impl core::fmt::Display for NoSensor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "no sensor attached")
    }
}

impl std::error::Error for NoSensor {}

/// CO2 sensor stand-in whose reads always fail.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCo2Sensor;

impl Co2Sensor for NoCo2Sensor {
    type Error = NoSensor;

    fn read(&mut self) -> Result<Co2Reading, NoSensor> {
        Err(NoSensor)
    }
}

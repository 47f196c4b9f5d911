//! Hardware abstraction traits for outputs, analog inputs and sensors.
//!
//! The bridge never talks to GPIO, SPI or UART directly. Everything goes
//! through these traits so the calibration and sensing logic can run on a
//! desktop against mocks or the simulation devices.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`AnalogOutput`] | PWM duty cycles and the digital bypass output |
//! | [`VoltageOutput`] | DAC voltage outputs |
//! | [`AnalogInput`] | Raw voltage samples from an ADC channel |
//! | [`Delay`] | Blocking waits between samples |
//! | [`Clock`] | Monotonic milliseconds for publish scheduling |
//! | [`TemperatureBus`] | 1-Wire temperature sensors |
//! | [`Co2Sensor`] | CO2 concentration sensor |
//!
//! # Example
//!
//! ```rust
//! use hrv_bridge::traits::{AnalogInput, AnalogOutput};
//! use hrv_bridge::hal::{MockAdc, MockOutput};
//!
//! let mut output = MockOutput::new();
//! output.set_duty(18, 42.5).unwrap();
//! assert_eq!(output.duty(18), Some(42.5));
//!
//! let mut adc = MockAdc::new();
//! adc.set_constant(0, 1.65);
//! assert_eq!(adc.read_voltage(0).unwrap(), 1.65);
//! ```

/// Identifier of a physical channel (GPIO number for outputs, ADC input
/// index for sensors).
pub type ChannelId = u8;

/// Analog output device: PWM channels plus digital outputs.
///
/// Duty cycles are percentages. Implementations clamp to 0-100 before
/// touching hardware.
pub trait AnalogOutput {
    /// Error type for output operations.
    type Error;

    /// Set the PWM duty cycle (0.0 to 100.0 percent) of a channel.
    fn set_duty(&mut self, channel: ChannelId, duty: f32) -> Result<(), Self::Error>;

    /// Drive a digital output high or low.
    fn set_digital(&mut self, channel: ChannelId, on: bool) -> Result<(), Self::Error>;

    /// Drive every listed PWM channel to 0 and the digital output low.
    ///
    /// Used at start-up and on shutdown.
    fn all_off(&mut self, pwm: &[ChannelId], digital: ChannelId) -> Result<(), Self::Error> {
        self.set_digital(digital, false)?;
        for &channel in pwm {
            self.set_duty(channel, 0.0)?;
        }
        Ok(())
    }
}

/// Voltage output device (DAC).
///
/// Unlike [`AnalogOutput`] the value is a voltage, not a duty cycle.
/// Implementations clamp to their own output range.
pub trait VoltageOutput {
    /// Error type for output operations.
    type Error;

    /// Drive a DAC channel to `volts`.
    fn set_voltage(&mut self, channel: ChannelId, volts: f32) -> Result<(), Self::Error>;
}

/// Analog input device (ADC).
///
/// The sensing code treats this as an opaque source of floats. Read errors
/// are passed straight back to the caller.
pub trait AnalogInput {
    /// Error type for read operations.
    type Error;

    /// Read one voltage sample from the given input channel.
    fn read_voltage(&mut self, channel: ChannelId) -> Result<f32, Self::Error>;
}

/// Blocking delay used between ADC samples.
pub trait Delay {
    /// Block for the given number of microseconds.
    fn delay_us(&mut self, us: u32);

    /// Block for the given number of milliseconds.
    fn delay_ms(&mut self, ms: u32) {
        self.delay_us(ms.saturating_mul(1000));
    }
}

/// Monotonic time source in milliseconds.
///
/// # Example
///
/// ```rust
/// use hrv_bridge::traits::Clock;
/// use hrv_bridge::hal::MockClock;
///
/// let mut clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.advance(1000);
/// assert_eq!(clock.now_ms(), 1000);
/// ```
pub trait Clock {
    /// Returns current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;
}

/// A bus of temperature sensors (DS18B20 on 1-Wire).
pub trait TemperatureBus {
    /// Read every sensor on the bus.
    ///
    /// Returns `(sensor_id, celsius)` pairs. Sensors that fail to read are
    /// left out rather than failing the whole bus.
    fn read_all(&mut self) -> Vec<(String, f32)>;
}

/// One reading from a CO2 sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Co2Reading {
    /// CO2 concentration in ppm.
    pub ppm: u16,
    /// Sensor die temperature in whole degrees Celsius, if reported.
    pub temperature: Option<i16>,
}

/// CO2 concentration sensor.
pub trait Co2Sensor {
    /// Error type for read operations.
    type Error;

    /// Take one reading.
    fn read(&mut self) -> Result<Co2Reading, Self::Error>;
}

//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for all hardware and network traits,
//! so the bridge can be developed and tested on a desktop.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockOutput`] | [`AnalogOutput`] | Records duty and digital writes |
//! | [`MockDac`] | [`VoltageOutput`] | Records DAC voltages |
//! | [`MockAdc`] | [`AnalogInput`] | Scripted per-channel signals |
//! | [`MockDelay`] | [`Delay`] | Accumulates requested delays |
//! | [`MockClock`] | [`Clock`] | Controllable time source |
//! | [`MockThermometers`] | [`TemperatureBus`] | Fixed 1-Wire readings |
//! | [`MockCo2`] | [`Co2Sensor`] | Queued CO2 readings |
//! | [`MockMqtt`] | [`MqttClient`] | Captures pub/sub operations |
//!
//! # Example
//!
//! ```rust
//! use hrv_bridge::calibration::CalibrationManager;
//! use hrv_bridge::hal::MockOutput;
//! use hrv_bridge::traits::AnalogOutput;
//!
//! let manager = CalibrationManager::default();
//! let mut output = MockOutput::new();
//!
//! let duty = manager.pwm_for_percent(18, 60.0);
//! output.set_duty(18, duty).unwrap();
//!
//! assert!((output.duty(18).unwrap() - 60.0).abs() < 0.01);
//! ```
//!
//! [`AnalogOutput`]: crate::traits::AnalogOutput
//! [`VoltageOutput`]: crate::traits::VoltageOutput
//! [`AnalogInput`]: crate::traits::AnalogInput
//! [`Delay`]: crate::traits::Delay
//! [`Clock`]: crate::traits::Clock
//! [`TemperatureBus`]: crate::traits::TemperatureBus
//! [`Co2Sensor`]: crate::traits::Co2Sensor
//! [`MqttClient`]: crate::traits::MqttClient

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::traits::{
    AnalogInput, AnalogOutput, ChannelId, Clock, Co2Reading, Co2Sensor, Delay, MqttClient,
    MqttMessage, TemperatureBus, VoltageOutput,
};

// ============================================================================
// Hardware Mocks
// ============================================================================

/// One write recorded by [`MockOutput`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutputCall {
    /// `set_duty(channel, duty)`
    Duty(ChannelId, f32),
    /// `set_digital(channel, on)`
    Digital(ChannelId, bool),
}

/// Mock output device for testing.
///
/// Keeps the last value written per channel plus the full call log.
///
/// # Example
///
/// ```rust
/// use hrv_bridge::hal::{MockOutput, OutputCall};
/// use hrv_bridge::traits::AnalogOutput;
///
/// let mut output = MockOutput::new();
/// output.set_digital(17, true).unwrap();
/// output.set_duty(18, 25.0).unwrap();
///
/// assert_eq!(output.digital(17), Some(true));
/// assert_eq!(output.calls.last(), Some(&OutputCall::Duty(18, 25.0)));
/// ```
#[derive(Debug, Default)]
pub struct MockOutput {
    duties: BTreeMap<ChannelId, f32>,
    digitals: BTreeMap<ChannelId, bool>,
    /// Every write in order.
    pub calls: Vec<OutputCall>,
    /// When set, every write fails.
    pub fail: bool,
}

impl MockOutput {
    /// Creates a new mock output with nothing written.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last duty written to a channel.
    pub fn duty(&self, channel: ChannelId) -> Option<f32> {
        self.duties.get(&channel).copied()
    }

    /// Last level written to a digital channel.
    pub fn digital(&self, channel: ChannelId) -> Option<bool> {
        self.digitals.get(&channel).copied()
    }
}

impl AnalogOutput for MockOutput {
    type Error = ();

    fn set_duty(&mut self, channel: ChannelId, duty: f32) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.duties.insert(channel, duty);
        self.calls.push(OutputCall::Duty(channel, duty));
        Ok(())
    }

    fn set_digital(&mut self, channel: ChannelId, on: bool) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.digitals.insert(channel, on);
        self.calls.push(OutputCall::Digital(channel, on));
        Ok(())
    }
}

/// Mock DAC for testing. Records every voltage written.
#[derive(Debug, Default)]
pub struct MockDac {
    voltages: BTreeMap<ChannelId, f32>,
    /// Every `(channel, volts)` write in order.
    pub calls: Vec<(ChannelId, f32)>,
    /// When set, every write fails.
    pub fail: bool,
}

impl MockDac {
    /// Creates a new mock DAC with nothing written.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last voltage written to a channel.
    pub fn voltage(&self, channel: ChannelId) -> Option<f32> {
        self.voltages.get(&channel).copied()
    }
}

impl VoltageOutput for MockDac {
    type Error = ();

    fn set_voltage(&mut self, channel: ChannelId, volts: f32) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.voltages.insert(channel, volts);
        self.calls.push((channel, volts));
        Ok(())
    }
}

/// Samples per cycle of [`MockAdc::set_sine`].
pub const MOCK_SINE_PERIOD: usize = 200;

#[derive(Clone, Copy, Debug)]
enum Signal {
    Constant(f32),
    Square { bias: f32, amplitude: f32 },
    Sine { bias: f32, amplitude: f32 },
}

/// Mock ADC for testing.
///
/// Each channel follows a scripted signal. Queued samples are returned
/// first; once the queue is empty the channel's signal takes over.
/// Unconfigured channels read 0V.
///
/// # Example
///
/// ```rust
/// use hrv_bridge::hal::MockAdc;
/// use hrv_bridge::traits::AnalogInput;
///
/// let mut adc = MockAdc::new();
/// adc.set_square(0, 1.65, 0.1);
/// adc.queue_samples(0, &[1.0]);
///
/// assert_eq!(adc.read_voltage(0).unwrap(), 1.0);
/// assert!((adc.read_voltage(0).unwrap() - 1.75).abs() < 1e-6);
/// assert!((adc.read_voltage(0).unwrap() - 1.55).abs() < 1e-6);
/// ```
#[derive(Debug, Default)]
pub struct MockAdc {
    signals: BTreeMap<ChannelId, Signal>,
    phase: BTreeMap<ChannelId, usize>,
    queued: BTreeMap<ChannelId, VecDeque<f32>>,
    failing: BTreeSet<ChannelId>,
    /// Total successful reads across all channels.
    pub reads: usize,
}

impl MockAdc {
    /// Creates a new mock ADC with every channel at 0V.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a channel at a fixed voltage.
    pub fn set_constant(&mut self, channel: ChannelId, volts: f32) {
        self.set_signal(channel, Signal::Constant(volts));
    }

    /// Alternate a channel between `bias + amplitude` and `bias - amplitude`.
    ///
    /// The RMS around `bias` is exactly `amplitude`, and outlier trimming
    /// does not change it.
    pub fn set_square(&mut self, channel: ChannelId, bias: f32, amplitude: f32) {
        self.set_signal(channel, Signal::Square { bias, amplitude });
    }

    /// Sine around `bias` with [`MOCK_SINE_PERIOD`] samples per cycle.
    pub fn set_sine(&mut self, channel: ChannelId, bias: f32, amplitude: f32) {
        self.set_signal(channel, Signal::Sine { bias, amplitude });
    }

    /// Queue samples returned before the channel's signal.
    pub fn queue_samples(&mut self, channel: ChannelId, samples: &[f32]) {
        self.queued
            .entry(channel)
            .or_default()
            .extend(samples.iter().copied());
    }

    /// Make every read of a channel fail.
    pub fn fail_channel(&mut self, channel: ChannelId) {
        self.failing.insert(channel);
    }

    /// Undo [`fail_channel`](Self::fail_channel).
    pub fn restore_channel(&mut self, channel: ChannelId) {
        self.failing.remove(&channel);
    }

    fn set_signal(&mut self, channel: ChannelId, signal: Signal) {
        self.signals.insert(channel, signal);
        self.phase.insert(channel, 0);
    }
}

impl AnalogInput for MockAdc {
    type Error = ();

    fn read_voltage(&mut self, channel: ChannelId) -> Result<f32, ()> {
        if self.failing.contains(&channel) {
            return Err(());
        }
        self.reads += 1;

        if let Some(v) = self.queued.get_mut(&channel).and_then(|q| q.pop_front()) {
            return Ok(v);
        }

        let phase = self.phase.entry(channel).or_insert(0);
        let n = *phase;
        *phase = phase.wrapping_add(1);

        let volts = match self.signals.get(&channel) {
            None => 0.0,
            Some(Signal::Constant(v)) => *v,
            Some(Signal::Square { bias, amplitude }) => {
                if n % 2 == 0 {
                    bias + amplitude
                } else {
                    bias - amplitude
                }
            }
            Some(Signal::Sine { bias, amplitude }) => {
                let angle = 2.0 * core::f32::consts::PI * (n % MOCK_SINE_PERIOD) as f32
                    / MOCK_SINE_PERIOD as f32;
                bias + amplitude * angle.sin()
            }
        };
        Ok(volts)
    }
}

/// Mock delay that returns immediately and records what was asked for.
#[derive(Debug, Default)]
pub struct MockDelay {
    /// Sum of all requested delays in microseconds.
    pub total_us: u64,
    /// Number of delay calls.
    pub calls: usize,
}

impl MockDelay {
    /// Creates a new mock delay.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Delay for MockDelay {
    fn delay_us(&mut self, us: u32) {
        self.total_us += u64::from(us);
        self.calls += 1;
    }
}

/// Mock clock for testing time-dependent behavior.
///
/// # Example
///
/// ```rust
/// use hrv_bridge::hal::MockClock;
/// use hrv_bridge::traits::Clock;
///
/// let mut clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.advance(200);
/// assert_eq!(clock.now_ms(), 200);
/// ```
#[derive(Debug, Default)]
pub struct MockClock {
    current_ms: u64,
}

impl MockClock {
    /// Creates a new mock clock starting at 0ms.
    pub fn new() -> Self {
        Self { current_ms: 0 }
    }

    /// Sets the current time in milliseconds.
    pub fn set(&mut self, ms: u64) {
        self.current_ms = ms;
    }

    /// Advances the clock by the given duration.
    pub fn advance(&mut self, ms: u64) {
        self.current_ms += ms;
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms
    }
}

/// Mock 1-Wire bus returning fixed readings.
#[derive(Debug, Default)]
pub struct MockThermometers {
    /// Readings returned by every `read_all`.
    pub readings: Vec<(String, f32)>,
    /// Number of `read_all` calls.
    pub reads: usize,
}

impl MockThermometers {
    /// Creates a bus with no sensors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sensor reading.
    pub fn with_sensor(mut self, id: &str, celsius: f32) -> Self {
        self.readings.push((id.to_string(), celsius));
        self
    }
}

impl TemperatureBus for MockThermometers {
    fn read_all(&mut self) -> Vec<(String, f32)> {
        self.reads += 1;
        self.readings.clone()
    }
}

/// Mock CO2 sensor returning queued results. Reads fail once the queue
/// is empty.
#[derive(Debug, Default)]
pub struct MockCo2 {
    queue: VecDeque<Result<Co2Reading, ()>>,
}

impl MockCo2 {
    /// Creates a sensor with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reading.
    pub fn push_reading(&mut self, ppm: u16, temperature: Option<i16>) {
        self.queue.push_back(Ok(Co2Reading { ppm, temperature }));
    }

    /// Queue a failed read.
    pub fn push_error(&mut self) {
        self.queue.push_back(Err(()));
    }
}

impl Co2Sensor for MockCo2 {
    type Error = ();

    fn read(&mut self) -> Result<Co2Reading, ()> {
        self.queue.pop_front().unwrap_or(Err(()))
    }
}

// ============================================================================
// Network Mocks
// ============================================================================

/// Mock MQTT client for testing.
///
/// Records all publish/subscribe operations and allows injecting
/// incoming messages for testing message handling.
///
/// # Example
///
/// ```rust
/// use hrv_bridge::hal::MockMqtt;
///
/// let mut mqtt = MockMqtt::new();
///
/// // Queue incoming message
/// mqtt.queue_message("homehab/hrv/pwm/gpio18", b"75".to_vec());
///
/// // Check subscriptions
/// mqtt.subscriptions.push("homehab/hrv/gpio17".into());
/// assert!(mqtt.is_subscribed("homehab/hrv/gpio17"));
///
/// // Check published messages
/// mqtt.published.push(("homehab/hrv/co2".into(), b"650".to_vec(), true));
/// assert_eq!(mqtt.published_to("homehab/hrv/co2").len(), 1);
/// assert_eq!(mqtt.last_payload("homehab/hrv/co2").as_deref(), Some("650"));
/// ```
#[derive(Debug, Default)]
pub struct MockMqtt {
    /// Messages that have been published (topic, payload, retain).
    pub published: Vec<(String, Vec<u8>, bool)>,
    /// Topics that have been subscribed to.
    pub subscriptions: Vec<String>,
    /// Queue of incoming messages to be returned by `try_recv()`.
    pub incoming: VecDeque<MqttMessage>,
    /// Whether the client is connected.
    pub connected: bool,
    /// When set, publish fails.
    pub fail_publish: bool,
}

impl MockMqtt {
    /// Creates a new mock MQTT client in connected state.
    pub fn new() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    /// Queue an incoming message
    pub fn queue_message(&mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.incoming.push_back(MqttMessage::new(topic, payload));
    }

    /// Check if a topic was subscribed to
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|t| t == topic)
    }

    /// Get published messages for a topic
    pub fn published_to(&self, topic: &str) -> Vec<&(String, Vec<u8>, bool)> {
        self.published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .collect()
    }

    /// Payload of the most recent publish to a topic, as text
    pub fn last_payload(&self, topic: &str) -> Option<String> {
        self.published
            .iter()
            .rev()
            .find(|(t, _, _)| t == topic)
            .map(|(_, p, _)| String::from_utf8_lossy(p).into_owned())
    }
}

impl MqttClient for MockMqtt {
    type Error = ();

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), ()> {
        if self.fail_publish {
            return Err(());
        }
        self.published.push((topic.into(), payload.to_vec(), retain));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ()> {
        self.subscriptions.push(topic.into());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        self.incoming.pop_front()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_records_calls() {
        let mut output = MockOutput::new();
        output.all_off(&[18, 19], 17).unwrap();
        assert_eq!(output.duty(18), Some(0.0));
        assert_eq!(output.duty(19), Some(0.0));
        assert_eq!(output.digital(17), Some(false));
        assert_eq!(output.calls.len(), 3);
    }

    #[test]
    fn output_failure() {
        let mut output = MockOutput::new();
        output.fail = true;
        assert!(output.set_duty(18, 1.0).is_err());
        assert_eq!(output.duty(18), None);
    }

    #[test]
    fn dac_records_and_fails() {
        let mut dac = MockDac::new();
        dac.set_voltage(0, 2.5).unwrap();
        assert_eq!(dac.voltage(0), Some(2.5));
        dac.fail = true;
        assert!(dac.set_voltage(0, 1.0).is_err());
        assert_eq!(dac.calls, vec![(0, 2.5)]);
    }

    #[test]
    fn adc_sine_cycle() {
        let mut adc = MockAdc::new();
        adc.set_sine(2, 1.65, 0.5);
        let samples: Vec<f32> = (0..MOCK_SINE_PERIOD)
            .map(|_| adc.read_voltage(2).unwrap())
            .collect();
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        assert!((mean - 1.65).abs() < 1e-3);
        assert!((samples[50] - 2.15).abs() < 1e-3);
    }

    #[test]
    fn adc_unconfigured_and_failing() {
        let mut adc = MockAdc::new();
        assert_eq!(adc.read_voltage(3).unwrap(), 0.0);
        adc.fail_channel(3);
        assert!(adc.read_voltage(3).is_err());
        adc.restore_channel(3);
        assert!(adc.read_voltage(3).is_ok());
        assert_eq!(adc.reads, 2);
    }

    #[test]
    fn delay_accumulates() {
        let mut delay = MockDelay::new();
        delay.delay_us(100);
        delay.delay_ms(10);
        assert_eq!(delay.total_us, 10_100);
        assert_eq!(delay.calls, 2);
    }

    #[test]
    fn co2_queue() {
        let mut co2 = MockCo2::new();
        co2.push_reading(650, Some(21));
        co2.push_error();
        assert_eq!(co2.read().unwrap().ppm, 650);
        assert!(co2.read().is_err());
        assert!(co2.read().is_err());
    }

    #[test]
    fn mqtt_roundtrip() {
        let mut mqtt = MockMqtt::new();
        mqtt.queue_message("a", "1");
        mqtt.queue_message("b", "2");
        assert_eq!(mqtt.try_recv().map(|m| m.topic), Some("a".to_string()));
        assert_eq!(mqtt.try_recv().map(|m| m.topic), Some("b".to_string()));
        assert!(mqtt.try_recv().is_none());

        mqtt.fail_publish = true;
        assert!(mqtt.publish("x", b"1", false).is_err());
    }
}

//! Bridge configuration.
//!
//! Uses `heapless` strings and vectors so every config struct has a fixed
//! size, and derives serde so a deployment can keep its settings in a JSON
//! file instead of passing a long command line.
//!
//! # Example
//!
//! ```rust
//! use hrv_bridge::config::{Config, CurrentConfig, MqttConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.mqtt.topic("co2").as_str(), "homehab/hrv/co2");
//!
//! // Or customize
//! let config = Config::default()
//!     .with_mqtt(MqttConfig::default().with_host("192.168.1.100"))
//!     .with_current(CurrentConfig::default().with_channels(&[0, 1, 2]));
//! assert_eq!(config.current.channels.len(), 3);
//! ```

use heapless::String as HString;
use heapless::Vec as HVec;
use serde::{Deserialize, Serialize};

use crate::current::{self, SensorSettings};
use crate::smoothing;
use crate::traits::ChannelId;

/// Maximum length for short config strings (hostnames, client IDs)
pub const MAX_SHORT_STRING: usize = 64;

/// Maximum length for longer config strings (topics, paths)
pub const MAX_LONG_STRING: usize = 128;

/// Maximum number of ADC channels monitored
pub const MAX_CURRENT_CHANNELS: usize = 8;

/// Maximum number of PWM output channels
pub const MAX_PWM_CHANNELS: usize = 4;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Type alias for longer config strings
pub type LongString = HString<MAX_LONG_STRING>;

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

fn truncated<const N: usize>(s: &str) -> HString<N> {
    let mut hs = HString::new();
    let valid_end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= N)
        .last()
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

/// Create a ShortString from a &str, truncating at a char boundary if too long
pub fn short_string(s: &str) -> ShortString {
    truncated(s)
}

/// Create a LongString from a &str, truncating at a char boundary if too long
pub fn long_string(s: &str) -> LongString {
    truncated(s)
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete bridge configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// MQTT client configuration
    pub mqtt: MqttConfig,
    /// PWM and digital output configuration
    pub outputs: OutputConfig,
    /// Current sensing configuration
    pub current: CurrentConfig,
    /// Temperature and CO2 sensor configuration
    pub sensors: SensorConfig,
}

impl Config {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set MQTT configuration
    pub fn with_mqtt(mut self, mqtt: MqttConfig) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// Set output configuration
    pub fn with_outputs(mut self, outputs: OutputConfig) -> Self {
        self.outputs = outputs;
        self
    }

    /// Set current sensing configuration
    pub fn with_current(mut self, current: CurrentConfig) -> Self {
        self.current = current;
        self
    }

    /// Set sensor configuration
    pub fn with_sensors(mut self, sensors: SensorConfig) -> Self {
        self.sensors = sensors;
        self
    }
}

// ============================================================================
// MQTT Config
// ============================================================================

/// MQTT client configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname or IP
    pub host: ShortString,
    /// Broker port
    pub port: u16,
    /// Client ID (should be unique per bridge)
    pub client_id: ShortString,
    /// Topic prefix for all pub/sub (e.g., "homehab/hrv" -> "homehab/hrv/co2")
    pub topic_prefix: ShortString,
    /// Username for authentication (empty = no auth)
    pub username: ShortString,
    /// Password for authentication
    pub password: ShortString,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: short_string("localhost"),
            port: 1883,
            client_id: short_string("hrv-bridge"),
            topic_prefix: short_string("homehab/hrv"),
            username: ShortString::new(),
            password: ShortString::new(),
            keep_alive_secs: 60,
        }
    }
}

impl MqttConfig {
    /// Set the broker host
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = short_string(host);
        self
    }

    /// Set the broker port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the client ID
    pub fn with_client_id(mut self, id: &str) -> Self {
        self.client_id = short_string(id);
        self
    }

    /// Set the topic prefix. A trailing '/' is dropped.
    pub fn with_topic_prefix(mut self, prefix: &str) -> Self {
        self.topic_prefix = short_string(prefix.trim_end_matches('/'));
        self
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = short_string(username);
        self.password = short_string(password);
        self
    }

    /// Set the keep-alive interval
    pub fn with_keep_alive_secs(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    /// Build a topic string with the configured prefix
    pub fn topic(&self, suffix: &str) -> LongString {
        let mut topic = LongString::new();
        let _ = topic.push_str(self.topic_prefix.as_str());
        let _ = topic.push('/');
        let _ = topic.push_str(suffix);
        topic
    }

    /// Check if authentication is configured
    pub fn has_auth(&self) -> bool {
        !self.username.is_empty()
    }
}

// ============================================================================
// Output Config
// ============================================================================

/// Maps a logical GPIO number to the physical header pin driving it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMapping {
    /// GPIO number used in topics
    pub channel: ChannelId,
    /// Physical pin on the driver board
    pub pin: u8,
}

/// PWM and digital output configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Calibrated 0-10V PWM outputs
    pub pwm_channels: HVec<ChannelId, MAX_PWM_CHANNELS>,
    /// Digital bypass valve output
    pub bypass_channel: ChannelId,
    /// Physical pins of the outputs above
    pub pins: HVec<PinMapping, MAX_PWM_CHANNELS>,
    /// PWM frequency in Hz
    pub pwm_frequency_hz: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let mut pwm_channels = HVec::new();
        let _ = pwm_channels.extend_from_slice(&[18, 19]);
        let mut pins = HVec::new();
        let _ = pins.extend_from_slice(&[
            PinMapping { channel: 18, pin: 12 },
            PinMapping { channel: 19, pin: 13 },
            PinMapping { channel: 17, pin: 5 },
        ]);
        Self {
            pwm_channels,
            bypass_channel: 17,
            pins,
            pwm_frequency_hz: 2000,
        }
    }
}

impl OutputConfig {
    /// Set the PWM frequency
    pub fn with_pwm_frequency_hz(mut self, hz: u32) -> Self {
        self.pwm_frequency_hz = hz;
        self
    }

    /// Set the bypass output channel
    pub fn with_bypass_channel(mut self, channel: ChannelId) -> Self {
        self.bypass_channel = channel;
        self
    }

    /// Physical pin for a channel, if mapped
    pub fn pin_for(&self, channel: ChannelId) -> Option<u8> {
        self.pins
            .iter()
            .find(|m| m.channel == channel)
            .map(|m| m.pin)
    }

    /// Every output channel: PWM channels then the bypass
    pub fn all_channels(&self) -> HVec<ChannelId, { MAX_PWM_CHANNELS + 1 }> {
        let mut all = HVec::new();
        for &ch in &self.pwm_channels {
            let _ = all.push(ch);
        }
        let _ = all.push(self.bypass_channel);
        all
    }
}

// ============================================================================
// Current Config
// ============================================================================

/// Gain correction for one ADC channel
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelGain {
    /// ADC channel
    pub channel: ChannelId,
    /// Multiplier applied to watts
    pub gain: f32,
}

/// Current sensing configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentConfig {
    /// Whether current sensing runs at all
    pub enabled: bool,
    /// Feed the current pipeline from a synthetic load instead of an ADC
    pub simulate: bool,
    /// ADC channels with a clamp attached
    pub channels: HVec<ChannelId, MAX_CURRENT_CHANNELS>,
    /// Amps per volt of sensor output
    pub sensor_ratio: f32,
    /// Samples per measurement
    pub samples: usize,
    /// Microseconds between samples
    pub sample_interval_us: u32,
    /// Percent trimmed from each end of a sample batch
    pub outlier_percentile: u8,
    /// Mains voltage for the watts conversion
    pub mains_voltage: f32,
    /// Watts below which a reading is 0
    pub noise_floor_watts: f32,
    /// Watts above which a reading is 0 (sensor unplugged)
    pub max_power_watts: f32,
    /// Per-channel gain corrections; unlisted channels use 1.0
    pub gains: HVec<ChannelGain, MAX_CURRENT_CHANNELS>,
    /// EMA weight of the newest reading
    pub ema_alpha: f32,
    /// Watts change that bypasses smoothing
    pub spike_threshold_watts: f32,
    /// Readings averaged for bias calibration at start-up
    pub bias_readings: usize,
    /// Milliseconds between filtered power samples
    pub sample_period_ms: u64,
    /// Milliseconds between publish decisions
    pub publish_period_ms: u64,
    /// Republish an unchanged value after this many milliseconds
    pub force_publish_ms: u64,
    /// Filtered samples whose median is published
    pub window_size: usize,
}

impl Default for CurrentConfig {
    fn default() -> Self {
        let mut channels = HVec::new();
        let _ = channels.extend_from_slice(&[0, 1]);
        let mut gains = HVec::new();
        let _ = gains.push(ChannelGain {
            channel: 1,
            gain: 0.85,
        });
        Self {
            enabled: true,
            simulate: false,
            channels,
            sensor_ratio: current::SCT013_RATIO,
            samples: current::DEFAULT_SAMPLES,
            sample_interval_us: current::DEFAULT_SAMPLE_INTERVAL_US,
            outlier_percentile: current::OUTLIER_PERCENTILE,
            mains_voltage: current::MAINS_VOLTAGE,
            noise_floor_watts: current::NOISE_FLOOR_WATTS,
            max_power_watts: current::MAX_POWER_WATTS,
            gains,
            ema_alpha: smoothing::EMA_ALPHA,
            spike_threshold_watts: smoothing::SPIKE_THRESHOLD_WATTS,
            bias_readings: current::BIAS_READINGS,
            sample_period_ms: 200,
            publish_period_ms: 1000,
            force_publish_ms: 60_000,
            window_size: 5,
        }
    }
}

impl CurrentConfig {
    /// Enable or disable current sensing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Use a synthetic load when no ADC driver is present
    pub fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Set the monitored channels. Extra channels beyond capacity are ignored.
    pub fn with_channels(mut self, channels: &[ChannelId]) -> Self {
        self.channels.clear();
        for &ch in channels.iter().take(MAX_CURRENT_CHANNELS) {
            let _ = self.channels.push(ch);
        }
        self
    }

    /// Set the gain for one channel
    pub fn with_gain(mut self, channel: ChannelId, gain: f32) -> Self {
        if let Some(entry) = self.gains.iter_mut().find(|g| g.channel == channel) {
            entry.gain = gain;
        } else {
            let _ = self.gains.push(ChannelGain { channel, gain });
        }
        self
    }

    /// Set the outlier trim percentile (capped so samples always remain)
    pub fn with_outlier_percentile(mut self, percentile: u8) -> Self {
        self.outlier_percentile = percentile.min(current::MAX_OUTLIER_PERCENTILE);
        self
    }

    /// Set the EMA alpha (clamped to 0.0-1.0)
    pub fn with_ema_alpha(mut self, alpha: f32) -> Self {
        self.ema_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    /// Set the publish period
    pub fn with_publish_period_ms(mut self, ms: u64) -> Self {
        self.publish_period_ms = ms;
        self
    }

    /// Gain for a channel
    pub fn gain_for(&self, channel: ChannelId) -> f32 {
        self.gains
            .iter()
            .find(|g| g.channel == channel)
            .map(|g| g.gain)
            .unwrap_or(1.0)
    }

    /// Sensor settings for one channel
    pub fn sensor_settings(&self, channel: ChannelId) -> SensorSettings {
        SensorSettings {
            ratio: self.sensor_ratio,
            samples: self.samples,
            sample_interval_us: self.sample_interval_us,
            outlier_percentile: self.outlier_percentile,
            mains_voltage: self.mains_voltage,
            gain: self.gain_for(channel),
            noise_floor_watts: self.noise_floor_watts,
            max_power_watts: self.max_power_watts,
        }
    }

    /// Smoother template for every channel
    pub fn smoother(&self) -> smoothing::PowerSmoother {
        smoothing::PowerSmoother::new(self.ema_alpha, self.spike_threshold_watts)
    }
}

// ============================================================================
// Sensor Config
// ============================================================================

/// Temperature and CO2 sensor configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Whether 1-Wire temperatures are read
    pub temperature_enabled: bool,
    /// Seconds between temperature reads
    pub temperature_interval_secs: u32,
    /// 1-Wire sysfs device directory
    pub w1_devices_path: LongString,
    /// Whether the CO2 sensor is read
    pub co2_enabled: bool,
    /// Seconds between CO2 reads
    pub co2_interval_secs: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            temperature_enabled: true,
            temperature_interval_secs: 30,
            w1_devices_path: long_string("/sys/bus/w1/devices"),
            co2_enabled: true,
            co2_interval_secs: 30,
        }
    }
}

impl SensorConfig {
    /// Set the temperature read interval
    pub fn with_temperature_interval_secs(mut self, secs: u32) -> Self {
        self.temperature_interval_secs = secs.max(1);
        self
    }

    /// Set the CO2 read interval
    pub fn with_co2_interval_secs(mut self, secs: u32) -> Self {
        self.co2_interval_secs = secs.max(1);
        self
    }

    /// Enable or disable the CO2 sensor
    pub fn with_co2_enabled(mut self, enabled: bool) -> Self {
        self.co2_enabled = enabled;
        self
    }

    /// Enable or disable temperature reads
    pub fn with_temperature_enabled(mut self, enabled: bool) -> Self {
        self.temperature_enabled = enabled;
        self
    }

    /// Set the 1-Wire device directory
    pub fn with_w1_devices_path(mut self, path: &str) -> Self {
        self.w1_devices_path = long_string(path);
        self
    }
}

// ============================================================================
// DAC Config
// ============================================================================

/// Configuration of the DAC power bridge.
///
/// Separate from [`Config`]: the DAC bridge is its own process with its own
/// MQTT identity.
///
/// ```rust
/// use hrv_bridge::config::DacConfig;
///
/// let dac = DacConfig::default();
/// assert_eq!(dac.mqtt.topic("power/set").as_str(), "homehab/dac/power/set");
/// assert_eq!(dac.voltage_for(50.0), 2.5);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DacConfig {
    /// MQTT client configuration
    pub mqtt: MqttConfig,
    /// DAC channel driven (0 = channel A)
    pub channel: ChannelId,
    /// Output voltage at 100%
    pub full_scale_volts: f32,
}

impl Default for DacConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default()
                .with_client_id("dac-bridge")
                .with_topic_prefix("homehab/dac"),
            channel: 0,
            full_scale_volts: 5.0,
        }
    }
}

impl DacConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set MQTT configuration
    pub fn with_mqtt(mut self, mqtt: MqttConfig) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// Set the DAC channel
    pub fn with_channel(mut self, channel: ChannelId) -> Self {
        self.channel = channel;
        self
    }

    /// Set the voltage produced at 100%
    pub fn with_full_scale_volts(mut self, volts: f32) -> Self {
        self.full_scale_volts = volts.max(0.0);
        self
    }

    /// Output voltage for a percentage, clamped to 0-100 first.
    pub fn voltage_for(&self, percent: f32) -> f32 {
        percent.clamp(0.0, 100.0) / 100.0 * self.full_scale_volts
    }
}

// ============================================================================
// Tests
// ============================================================================

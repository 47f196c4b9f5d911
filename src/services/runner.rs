//! MQTT service runner for the bridge.
//!
//! Works with any implementation of the `MqttClient` trait: the rumqttc
//! adapter in production, `MockMqtt` in tests.
//!
//! **Subscribe Topics** (prefix `homehab/hrv`):
//! - `pwm/gpio{N}` - calibrated output percent
//! - `pwm/gpio{N}/duty` - raw duty cycle
//! - `gpio17` - bypass valve `ON`/`OFF`
//! - `calibration/gpio{N}/set` - calibration table JSON
//!
//! **Publish Topics** (all retained):
//! - `pwm/gpio{N}/state` - applied duty, one decimal
//! - `calibration/gpio{N}` - active calibration table
//! - `current/ad{n}` - power in whole watts
//! - `w1/{sensor_id}` - temperature in degrees Celsius
//! - `co2`, `co2_temp` - CO2 ppm and sensor temperature, on change
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hrv_bridge::calibration::CalibrationManager;
//! use hrv_bridge::config::Config;
//! use hrv_bridge::hal::{MockMqtt, MockOutput};
//! use hrv_bridge::services::{BridgeServiceRunner, SharedBridgeState};
//!
//! let state = Arc::new(SharedBridgeState::new(CalibrationManager::default(), MockOutput::new()));
//! let mut runner = BridgeServiceRunner::new(state, MockMqtt::new(), &Config::default());
//! runner.start().unwrap();
//!
//! runner.client_mut().queue_message("homehab/hrv/pwm/gpio18", "30");
//! runner.poll().unwrap();
//!
//! let state = runner.client().last_payload("homehab/hrv/pwm/gpio18/state");
//! assert_eq!(state.as_deref(), Some("30.0"));
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::{Config, MqttConfig, OutputConfig};
use crate::messages::{parse_bridge_command, BridgeCommand};
use crate::traits::{AnalogOutput, ChannelId, Co2Reading, MqttClient, MqttMessage};

use super::telemetry::ChangeTracker;
use super::SharedBridgeState;

// ============================================================================
// Readings
// ============================================================================

/// A batch of sensor values sent from a sensor thread to the MQTT loop.
#[derive(Clone, Debug, PartialEq)]
pub enum Reading {
    /// `(adc_channel, watts)` pairs due for publishing
    Power(Vec<(ChannelId, i32)>),
    /// `(sensor_id, celsius)` pairs from the 1-Wire bus
    Temperatures(Vec<(String, f32)>),
    /// One CO2 sensor reading
    Co2(Co2Reading),
}

// ============================================================================
// Bridge Service Runner
// ============================================================================

/// MQTT front end of the bridge.
///
/// Wraps any `MqttClient` implementation and provides:
/// - Control topic subscription and command dispatch
/// - Output state and calibration publishing
/// - Sensor reading publishing
pub struct BridgeServiceRunner<O, C>
where
    O: AnalogOutput,
    C: MqttClient,
{
    state: Arc<SharedBridgeState<O>>,
    client: C,
    mqtt: MqttConfig,
    outputs: OutputConfig,
    co2: ChangeTracker<u16>,
    co2_temp: ChangeTracker<i16>,
}

impl<O, C> BridgeServiceRunner<O, C>
where
    O: AnalogOutput,
    O::Error: Debug,
    C: MqttClient,
{
    /// Create a new runner.
    pub fn new(state: Arc<SharedBridgeState<O>>, client: C, config: &Config) -> Self {
        Self {
            state,
            client,
            mqtt: config.mqtt.clone(),
            outputs: config.outputs.clone(),
            co2: ChangeTracker::new(),
            co2_temp: ChangeTracker::new(),
        }
    }

    /// Get a reference to the MQTT client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Get a mutable reference to the MQTT client.
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// The shared state this runner drives.
    pub fn state(&self) -> &Arc<SharedBridgeState<O>> {
        &self.state
    }

    /// Zero the outputs, subscribe and announce the calibration tables.
    pub fn start(&mut self) -> Result<(), C::Error> {
        self.zero_outputs();
        self.subscribe_control_topics()?;
        self.publish_calibrations()
    }

    /// Zero the outputs before exit.
    pub fn shutdown(&mut self) {
        info!("Shutting down - setting outputs to 0");
        self.zero_outputs();
    }

    fn zero_outputs(&self) {
        if let Err(e) = self
            .state
            .all_off(&self.outputs.pwm_channels, self.outputs.bypass_channel)
        {
            error!("Failed to reset outputs: {:?}", e);
        }
    }

    /// Subscribe to all command topics.
    pub fn subscribe_control_topics(&mut self) -> Result<(), C::Error> {
        let mut topics = vec![format!("gpio{}", self.outputs.bypass_channel)];
        for ch in &self.outputs.pwm_channels {
            topics.push(format!("pwm/gpio{}", ch));
            topics.push(format!("pwm/gpio{}/duty", ch));
            topics.push(format!("calibration/gpio{}/set", ch));
        }

        for suffix in &topics {
            let topic = self.mqtt.topic(suffix);
            self.client.subscribe(&topic)?;
            debug!("Subscribed to {}", topic);
        }
        info!(
            "Subscribed to {} topics under {}",
            topics.len(),
            self.mqtt.topic_prefix
        );
        Ok(())
    }

    /// Process all pending messages. Returns how many commands were applied.
    pub fn poll(&mut self) -> Result<usize, C::Error> {
        let mut applied = 0;
        while let Some(msg) = self.client.try_recv() {
            if self.handle_message(&msg)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Apply one message. Returns `true` if it changed an output or table.
    ///
    /// Bad topics and payloads are logged and ignored; only publish errors
    /// are returned.
    pub fn handle_message(&mut self, msg: &MqttMessage) -> Result<bool, C::Error> {
        let Some(suffix) = msg
            .topic
            .strip_prefix(self.mqtt.topic_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            warn!("Unknown topic: {}", msg.topic);
            return Ok(false);
        };

        let command = match parse_bridge_command(suffix, &msg.payload) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Ignoring {}: {}", msg.topic, e);
                return Ok(false);
            }
        };

        if !self.accepts(&command) {
            warn!("GPIO{} is not configured for {:?}", command.channel(), command);
            return Ok(false);
        }

        match command {
            BridgeCommand::SetOutput { channel, percent } => {
                match self.state.set_output_percent(channel, percent) {
                    Ok(duty) => self.publish_output_state(channel, duty).map(|_| true),
                    Err(e) => {
                        error!("Failed to set GPIO{}: {:?}", channel, e);
                        Ok(false)
                    }
                }
            }
            BridgeCommand::SetDuty { channel, duty } => match self.state.set_duty(channel, duty) {
                Ok(duty) => {
                    info!("GPIO{} raw duty {:.1}%", channel, duty);
                    self.publish_output_state(channel, duty).map(|_| true)
                }
                Err(e) => {
                    error!("Failed to set GPIO{}: {:?}", channel, e);
                    Ok(false)
                }
            },
            BridgeCommand::SetDigital { channel, on } => {
                match self.state.set_digital(channel, on) {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        error!("Failed to set GPIO{}: {:?}", channel, e);
                        Ok(false)
                    }
                }
            }
            BridgeCommand::UpdateCalibration { channel, payload } => {
                if self.state.update_calibration(channel, &payload).is_ok() {
                    self.publish_calibration(channel).map(|_| true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    fn accepts(&self, command: &BridgeCommand) -> bool {
        match command {
            BridgeCommand::SetDigital { channel, .. } => *channel == self.outputs.bypass_channel,
            other => self.outputs.pwm_channels.contains(&other.channel()),
        }
    }

    fn publish_output_state(&mut self, channel: ChannelId, duty: f32) -> Result<(), C::Error> {
        let topic = self.mqtt.topic(&format!("pwm/gpio{}/state", channel));
        self.client
            .publish(&topic, format!("{:.1}", duty).as_bytes(), true)
    }

    /// Publish one channel's active calibration table.
    pub fn publish_calibration(&mut self, channel: ChannelId) -> Result<(), C::Error> {
        let topic = self.mqtt.topic(&format!("calibration/gpio{}", channel));
        let json = self.state.calibration_json(channel);
        self.client.publish(&topic, json.as_bytes(), true)
    }

    /// Publish every PWM channel's calibration table.
    pub fn publish_calibrations(&mut self) -> Result<(), C::Error> {
        let channels = self.outputs.pwm_channels.clone();
        for ch in channels {
            self.publish_calibration(ch)?;
        }
        Ok(())
    }

    /// Publish a reading from a sensor thread.
    pub fn publish_reading(&mut self, reading: &Reading) -> Result<(), C::Error> {
        match reading {
            Reading::Power(values) => self.publish_power(values),
            Reading::Temperatures(values) => self.publish_temperatures(values),
            Reading::Co2(value) => self.publish_co2(*value),
        }
    }

    /// Publish power values as whole watts.
    pub fn publish_power(&mut self, values: &[(ChannelId, i32)]) -> Result<(), C::Error> {
        for (ch, watts) in values {
            let topic = self.mqtt.topic(&format!("current/ad{}", ch));
            self.client
                .publish(&topic, watts.to_string().as_bytes(), true)?;
        }
        Ok(())
    }

    /// Publish 1-Wire temperatures.
    pub fn publish_temperatures(&mut self, values: &[(String, f32)]) -> Result<(), C::Error> {
        for (id, celsius) in values {
            let topic = self.mqtt.topic(&format!("w1/{}", id));
            self.client
                .publish(&topic, format!("{:.1}", celsius).as_bytes(), true)?;
            debug!("Published {}: {:.1}°C", id, celsius);
        }
        Ok(())
    }

    /// Publish CO2 ppm and sensor temperature, each only when it changed.
    pub fn publish_co2(&mut self, reading: Co2Reading) -> Result<(), C::Error> {
        if let Some(ppm) = self.co2.update(reading.ppm) {
            let topic = self.mqtt.topic("co2");
            self.client.publish(&topic, ppm.to_string().as_bytes(), true)?;
            info!("Published CO2: {} ppm", ppm);
        }
        if let Some(temp) = reading.temperature.and_then(|t| self.co2_temp.update(t)) {
            let topic = self.mqtt.topic("co2_temp");
            self.client
                .publish(&topic, temp.to_string().as_bytes(), true)?;
            info!("Published CO2 temp: {}°C", temp);
        }
        Ok(())
    }
}

//! MQTT service runner for the DAC power bridge.
//!
//! A second, smaller bridge that maps a percentage onto one DAC voltage
//! output (0-5V on channel A by default).
//!
//! **Subscribe Topics** (prefix `homehab/dac`):
//! - `power/set` - output percent, `.` or `,` decimal
//!
//! **Publish Topics** (all retained):
//! - `power/state` - applied percent, one decimal
//! - `voltage/state` - applied voltage, three decimals
//!
//! # Example
//!
//! ```rust
//! use hrv_bridge::config::DacConfig;
//! use hrv_bridge::hal::{MockDac, MockMqtt};
//! use hrv_bridge::services::DacServiceRunner;
//!
//! let mut runner = DacServiceRunner::new(MockDac::new(), MockMqtt::new(), &DacConfig::default());
//! runner.start().unwrap();
//!
//! runner.client_mut().queue_message("homehab/dac/power/set", "40");
//! runner.poll().unwrap();
//!
//! let volts = runner.client().last_payload("homehab/dac/voltage/state");
//! assert_eq!(volts.as_deref(), Some("2.000"));
//! ```

use std::fmt::Debug;

use log::{error, info, warn};

use crate::config::DacConfig;
use crate::messages::{parse_dac_command, DacCommand};
use crate::traits::{ChannelId, MqttClient, MqttMessage, VoltageOutput};

/// MQTT front end of the DAC bridge.
///
/// Owns the DAC directly; nothing else writes to it.
pub struct DacServiceRunner<V, C>
where
    V: VoltageOutput,
    C: MqttClient,
{
    output: V,
    client: C,
    config: DacConfig,
    percent: f32,
    voltage: f32,
}

impl<V, C> DacServiceRunner<V, C>
where
    V: VoltageOutput,
    V::Error: Debug,
    C: MqttClient,
{
    /// Create a new runner. Nothing is written until [`start`](Self::start).
    pub fn new(output: V, client: C, config: &DacConfig) -> Self {
        Self {
            output,
            client,
            config: config.clone(),
            percent: 0.0,
            voltage: 0.0,
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

    /// The DAC this runner drives.
    pub fn output(&self) -> &V {
        &self.output
    }

    /// Last applied percent.
    pub fn current_percent(&self) -> f32 {
        self.percent
    }

    /// Last applied voltage.
    pub fn current_voltage(&self) -> f32 {
        self.voltage
    }

    /// DAC channel driven.
    pub fn channel(&self) -> ChannelId {
        self.config.channel
    }

    /// Drive the output to 0V, subscribe and announce the state.
    pub fn start(&mut self) -> Result<(), C::Error> {
        self.write(0.0);
        let topic = self.config.mqtt.topic("power/set");
        self.client.subscribe(&topic)?;
        info!("Subscribed to {}", topic);
        self.publish_state()
    }

    /// Drive the output to 0V before exit.
    pub fn shutdown(&mut self) {
        info!("Shutting down - setting output to 0V");
        self.write(0.0);
    }

    /// Process all pending messages. Returns how many were applied.
    pub fn poll(&mut self) -> Result<usize, C::Error> {
        let mut applied = 0;
        while let Some(msg) = self.client.try_recv() {
            if self.handle_message(&msg)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Apply one message. Bad topics and payloads are logged and ignored.
    pub fn handle_message(&mut self, msg: &MqttMessage) -> Result<bool, C::Error> {
        let Some(suffix) = msg
            .topic
            .strip_prefix(self.config.mqtt.topic_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            warn!("Unknown topic: {}", msg.topic);
            return Ok(false);
        };

        match parse_dac_command(suffix, &msg.payload) {
            Ok(DacCommand::SetPower { percent }) => self.set_power(percent),
            Err(e) => {
                warn!("Ignoring {}: {}", msg.topic, e);
                Ok(false)
            }
        }
    }

    /// Set the output to a percent of full scale and publish the new state.
    ///
    /// Returns `false` if the DAC rejected the write; the previous state
    /// is kept and nothing is published.
    pub fn set_power(&mut self, percent: f32) -> Result<bool, C::Error> {
        if !self.write(percent) {
            return Ok(false);
        }
        info!("Power set: {:.1}% -> {:.3}V", self.percent, self.voltage);
        self.publish_state().map(|_| true)
    }

    fn write(&mut self, percent: f32) -> bool {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        let volts = self.config.voltage_for(percent);
        match self.output.set_voltage(self.config.channel, volts) {
            Ok(()) => {
                self.percent = percent;
                self.voltage = volts;
                true
            }
            Err(e) => {
                error!("Failed to set DAC channel {}: {:?}", self.config.channel, e);
                false
            }
        }
    }

    /// Publish the applied percent and voltage.
    pub fn publish_state(&mut self) -> Result<(), C::Error> {
        let topic = self.config.mqtt.topic("power/state");
        self.client
            .publish(&topic, format!("{:.1}", self.percent).as_bytes(), true)?;
        let topic = self.config.mqtt.topic("voltage/state");
        self.client
            .publish(&topic, format!("{:.3}", self.voltage).as_bytes(), true)
    }
}

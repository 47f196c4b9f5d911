//! Network abstraction for the MQTT link to OpenHAB.
//!
//! The bridge only needs a pub/sub channel. [`MqttClient`] keeps that
//! contract small and synchronous so the service runner can be driven from
//! a plain loop and tested with [`MockMqtt`](crate::hal::MockMqtt).
//!
//! ```text
//! homehab/hrv/pwm/gpio18              - desired output percent (subscribe)
//! homehab/hrv/calibration/gpio18/set  - calibration table JSON (subscribe)
//! homehab/hrv/current/ad0             - power in watts (publish)
//! ```

/// MQTT client trait for pub/sub messaging.
///
/// # Implementation Notes
///
/// - `publish` and `subscribe` may block until the request is queued
/// - `try_recv` must never block
/// - Reconnection is the implementation's concern
pub trait MqttClient {
    /// Error type for MQTT operations.
    type Error;

    /// Publish a message to a topic.
    ///
    /// `retain` asks the broker to keep the message for new subscribers.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error>;

    /// Subscribe to a topic.
    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Try to receive the next message (non-blocking).
    fn try_recv(&mut self) -> Option<MqttMessage>;

    /// Check if connected to broker.
    fn is_connected(&self) -> bool;
}

/// An MQTT message received from a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload as raw bytes.
    pub payload: Vec<u8>,
}

impl MqttMessage {
    /// Create a new MQTT message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Returns the payload as a UTF-8 string, if valid.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }
}

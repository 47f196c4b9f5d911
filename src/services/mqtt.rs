//! `MqttClient` implementation over `rumqttc`.
//!
//! The rumqttc event loop runs as a tokio task. Incoming publishes are
//! forwarded to an unbounded channel that [`RumqttClient::try_recv`] drains,
//! so the bridge runner can stay synchronous.
//!
//! ```ignore
//! let (client, _eventloop) = RumqttClient::connect(&config.mqtt);
//! let mut runner = BridgeServiceRunner::new(state, client, &config);
//! runner.start()?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::MqttConfig;
use crate::traits::{MqttClient, MqttMessage};

/// Requests buffered between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 32;

/// Wait before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

// ============================================================================
// Errors
// ============================================================================

/// MQTT-related errors
#[derive(Debug)]
pub enum MqttError {
    /// Failed to subscribe to topic
    Subscribe(String),
    /// Failed to publish message
    Publish(String),
}

impl std::fmt::Display for MqttError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribe(e) => write!(f, "MQTT subscribe error: {}", e),
            Self::Publish(e) => write!(f, "MQTT publish error: {}", e),
        }
    }
}

impl std::error::Error for MqttError {}

// ============================================================================
// Client
// ============================================================================

/// Synchronous `MqttClient` over a rumqttc `AsyncClient`.
pub struct RumqttClient {
    client: AsyncClient,
    incoming: mpsc::UnboundedReceiver<MqttMessage>,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

/// Build rumqttc options from the bridge config.
///
/// rumqttc rejects empty client ids, so an empty one falls back to
/// `hrv-bridge`.
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let client_id = match config.client_id.trim() {
        "" => "hrv-bridge",
        id => id,
    };
    let mut options = MqttOptions::new(client_id, config.host.as_str(), config.port);
    options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs.max(5))));
    if config.has_auth() {
        options.set_credentials(config.username.as_str(), config.password.as_str());
    }
    options
}

impl RumqttClient {
    /// Create the client and spawn its event loop on the current tokio
    /// runtime. Connection happens in the background and is retried forever.
    pub fn connect(config: &MqttConfig) -> (Self, JoinHandle<()>) {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);
        let (tx, incoming) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let subscriptions = Arc::new(Mutex::new(Vec::new()));

        info!("Connecting to MQTT broker at {}:{}", config.host, config.port);
        let handle = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            tx,
            Arc::clone(&connected),
            Arc::clone(&subscriptions),
        ));

        (
            Self {
                client,
                incoming,
                connected,
                subscriptions,
            },
            handle,
        )
    }

    /// Ask the broker to close the connection.
    pub fn disconnect(&self) {
        if let Err(e) = self.client.try_disconnect() {
            warn!("MQTT disconnect failed: {}", e);
        }
    }
}

impl MqttClient for RumqttClient {
    type Error = MqttError;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), MqttError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        self.client
            .try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| MqttError::Subscribe(e.to_string()))?;
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(topic.to_string());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        self.incoming.try_recv().ok()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    tx: mpsc::UnboundedSender<MqttMessage>,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
) {
    let mut sessions = 0u32;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::Relaxed);
                sessions += 1;
                info!("Connected to MQTT broker");

                // Topics subscribed before the first ConnAck are still queued
                if sessions > 1 {
                    let topics = subscriptions
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clone();
                    for topic in topics {
                        if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                            error!("Resubscribe to {} failed: {}", topic, e);
                        }
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!("MQTT message on {}", publish.topic);
                let msg = MqttMessage::new(publish.topic, publish.payload.to_vec());
                if tx.send(msg).is_err() {
                    // Client handle dropped
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::Relaxed) {
                    warn!("Unexpected disconnect ({}), will reconnect...", e);
                } else {
                    error!("MQTT error: {}", e);
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

//! DAC power bridge.
//!
//! Maps a percentage from `{prefix}/power/set` onto a 0-5V DAC output and
//! reports the applied percent and voltage back.
//!
//! # Usage
//!
//! ```bash
//! dac_bridge --mqtt-host 192.168.1.10 -t homehab/dac -v
//! ```
//!
//! No DAC driver is wired in yet; the output is simulated and only logged.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hrv_bridge::config::DacConfig;
use hrv_bridge::hal::SimulatedDac;
use hrv_bridge::services::{DacServiceRunner, RumqttClient};
use log::{error, info, warn};

/// How often the runner drains incoming commands.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "dac_bridge")]
#[command(about = "MQTT bridge for the HRV power output DAC")]
struct Args {
    /// MQTT broker host
    #[arg(short = 'H', long, default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port
    #[arg(short = 'p', long, default_value_t = 1883)]
    mqtt_port: u16,

    /// MQTT topic prefix
    #[arg(short = 't', long, default_value = "homehab/dac")]
    topic_prefix: String,

    /// MQTT client id
    #[arg(short = 'c', long, default_value = "dac-bridge")]
    client_id: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> DacConfig {
        let defaults = DacConfig::default();
        let mqtt = defaults
            .mqtt
            .clone()
            .with_host(&self.mqtt_host)
            .with_port(self.mqtt_port)
            .with_topic_prefix(&self.topic_prefix)
            .with_client_id(&self.client_id);
        defaults.with_mqtt(mqtt)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = args.config();
    info!("DAC bridge starting");
    info!(
        "MQTT broker {}:{}, prefix {}",
        config.mqtt.host, config.mqtt.port, config.mqtt.topic_prefix
    );
    warn!("Running in simulation mode (no DAC hardware)");

    let (client, eventloop) = RumqttClient::connect(&config.mqtt);
    let dac = SimulatedDac::new(config.full_scale_volts);
    let mut runner = DacServiceRunner::new(dac, client, &config);
    runner.start().context("Failed to subscribe to power topic")?;

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C");
                break;
            }
            _ = poll.tick() => {
                if let Err(e) = runner.poll() {
                    error!("Failed to handle MQTT message: {}", e);
                }
            }
        }
    }

    runner.shutdown();
    runner.client().disconnect();
    eventloop.abort();

    info!("Shutdown complete");
    Ok(())
}

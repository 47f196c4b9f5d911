//! HRV MQTT bridge.
//!
//! Connects to the broker, applies output commands from OpenHAB and
//! publishes power, temperature and CO2 readings. Each sensor class runs in
//! its own thread and hands readings to the main loop, which owns the MQTT
//! runner.
//!
//! # Usage
//!
//! ```bash
//! hrv_bridge --mqtt-host 192.168.1.10 --current-channels 0,1 -v
//! hrv_bridge --config /etc/hrv-bridge.json
//! hrv_bridge --simulate   # synthetic current load, no ADC board
//! ```
//!
//! There is no ADC driver yet: without `--simulate` current sensing stays
//! off and no power is published.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use hrv_bridge::calibration::CalibrationManager;
use hrv_bridge::config::Config;
use hrv_bridge::config::CurrentConfig;
use hrv_bridge::hal::{NoCo2Sensor, SimulatedAdc, SimulatedOutput, StdDelay, SystemClock, W1Bus};
use hrv_bridge::services::{
    simulated_current_task, BridgeServiceRunner, CurrentTask, Reading, RumqttClient,
    SharedBridgeState,
};
use hrv_bridge::traits::{ChannelId, Clock, Co2Sensor, TemperatureBus};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

/// How often the MQTT runner drains incoming commands.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sleep granularity of the sensor threads while waiting for the next read.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Readings buffered between sensor threads and the MQTT loop.
const READING_QUEUE: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "hrv_bridge")]
#[command(about = "MQTT bridge for HRV fans, bypass valve and sensors")]
struct Args {
    /// JSON config file; command line options override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// MQTT broker host
    #[arg(short = 'H', long)]
    mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(short = 'p', long)]
    mqtt_port: Option<u16>,

    /// MQTT topic prefix
    #[arg(short = 't', long)]
    topic_prefix: Option<String>,

    /// MQTT client id
    #[arg(short = 'c', long)]
    client_id: Option<String>,

    /// PWM frequency in Hz
    #[arg(long)]
    pwm_freq: Option<u32>,

    /// Seconds between temperature reads
    #[arg(long)]
    temp_interval: Option<u32>,

    /// ADC channels with a current clamp, e.g. "0,1"
    #[arg(long, value_delimiter = ',')]
    current_channels: Option<Vec<ChannelId>>,

    /// Disable current sensing
    #[arg(long)]
    no_current: bool,

    /// Feed current sensing from a synthetic load (no ADC board)
    #[arg(long)]
    simulate: bool,

    /// Seconds between CO2 reads
    #[arg(long)]
    co2_interval: Option<u32>,

    /// Disable the CO2 sensor
    #[arg(long)]
    no_co2: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Config::from_json(&json)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => Config::default(),
    };

    if let Some(host) = &args.mqtt_host {
        config.mqtt = config.mqtt.with_host(host);
    }
    if let Some(port) = args.mqtt_port {
        config.mqtt = config.mqtt.with_port(port);
    }
    if let Some(prefix) = &args.topic_prefix {
        config.mqtt = config.mqtt.with_topic_prefix(prefix);
    }
    if let Some(id) = &args.client_id {
        config.mqtt = config.mqtt.with_client_id(id);
    }
    if let Some(hz) = args.pwm_freq {
        config.outputs = config.outputs.with_pwm_frequency_hz(hz);
    }
    if let Some(secs) = args.temp_interval {
        config.sensors = config.sensors.with_temperature_interval_secs(secs);
    }
    if let Some(channels) = &args.current_channels {
        if channels.is_empty() {
            bail!("--current-channels needs at least one channel");
        }
        config.current = config.current.with_channels(channels);
    }
    if args.no_current {
        config.current = config.current.with_enabled(false);
    }
    if args.simulate {
        config.current = config.current.with_simulate(true);
    }
    if let Some(secs) = args.co2_interval {
        config.sensors = config.sensors.with_co2_interval_secs(secs);
    }
    if args.no_co2 {
        config.sensors = config.sensors.with_co2_enabled(false);
    }
    Ok(config)
}

/// Sleep for `total`, waking early once `running` is cleared.
///
/// Returns `false` if the bridge is stopping.
fn sleep_while_running(running: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        let step = remaining.min(STOP_CHECK_INTERVAL);
        thread::sleep(step);
        remaining -= step;
    }
    running.load(Ordering::Relaxed)
}

// ============================================================================
// Sensor threads
// ============================================================================

fn spawn_current_thread(
    mut task: CurrentTask<SimulatedAdc, StdDelay>,
    current: &CurrentConfig,
    running: Arc<AtomicBool>,
    tx: mpsc::Sender<Reading>,
) -> anyhow::Result<JoinHandle<()>> {
    let period = Duration::from_millis(current.sample_period_ms.max(1));
    let bias_readings = current.bias_readings;

    thread::Builder::new()
        .name("current".into())
        .spawn(move || {
            let clock = SystemClock::new();

            info!("Calibrating current sensors - make sure no load is running");
            match task.calibrate(bias_readings) {
                Ok(biases) => {
                    for (ch, bias) in biases {
                        info!("AD{} bias: {:.4}V", ch, bias);
                    }
                }
                Err(e) => match e {},
            }

            while sleep_while_running(&running, period) {
                match task.step(clock.now_ms()) {
                    Ok(due) if due.is_empty() => {}
                    Ok(due) => {
                        if tx.blocking_send(Reading::Power(due)).is_err() {
                            break;
                        }
                    }
                    Err(e) => match e {},
                }
            }
            debug!("Current thread stopped");
        })
        .context("Failed to spawn current thread")
}

fn spawn_temperature_thread(
    mut bus: W1Bus,
    interval: Duration,
    running: Arc<AtomicBool>,
    tx: mpsc::Sender<Reading>,
) -> anyhow::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("temperature".into())
        .spawn(move || {
            loop {
                let readings = bus.read_all();
                if readings.is_empty() {
                    warn!("No temperature sensor could be read");
                } else if tx.blocking_send(Reading::Temperatures(readings)).is_err() {
                    break;
                }
                if !sleep_while_running(&running, interval) {
                    break;
                }
            }
            debug!("Temperature thread stopped");
        })
        .context("Failed to spawn temperature thread")
}

fn spawn_co2_thread<S>(
    mut sensor: S,
    interval: Duration,
    running: Arc<AtomicBool>,
    tx: mpsc::Sender<Reading>,
) -> anyhow::Result<JoinHandle<()>>
where
    S: Co2Sensor + Send + 'static,
    S::Error: std::fmt::Display,
{
    thread::Builder::new()
        .name("co2".into())
        .spawn(move || {
            loop {
                match sensor.read() {
                    Ok(reading) => {
                        if tx.blocking_send(Reading::Co2(reading)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("CO2 sensor unavailable ({}), CO2 monitoring disabled", e);
                        break;
                    }
                }
                if !sleep_while_running(&running, interval) {
                    break;
                }
            }
            debug!("CO2 thread stopped");
        })
        .context("Failed to spawn CO2 thread")
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = load_config(&args)?;

    info!("HRV bridge starting");
    info!(
        "MQTT broker {}:{}, prefix {}",
        config.mqtt.host, config.mqtt.port, config.mqtt.topic_prefix
    );
    info!(
        "PWM outputs {:?} at {} Hz, bypass GPIO{}",
        config.outputs.pwm_channels, config.outputs.pwm_frequency_hz, config.outputs.bypass_channel
    );

    let calibration = CalibrationManager::with_linear_defaults(&config.outputs.pwm_channels);
    let output = SimulatedOutput::from_config(&config.outputs);
    let state = Arc::new(SharedBridgeState::new(calibration, output));

    let (client, eventloop) = RumqttClient::connect(&config.mqtt);
    let mut runner = BridgeServiceRunner::new(Arc::clone(&state), client, &config);
    runner.start().context("Failed to subscribe to control topics")?;

    let running = Arc::new(AtomicBool::new(true));
    let (tx, mut rx) = mpsc::channel(READING_QUEUE);
    let mut workers = Vec::new();

    if !config.current.enabled {
        info!("Current sensing disabled");
    } else if let Some(task) = simulated_current_task(&config.current, StdDelay) {
        info!("Current sensing on AD{:?}", config.current.channels);
        workers.push(spawn_current_thread(
            task,
            &config.current,
            Arc::clone(&running),
            tx.clone(),
        )?);
    }

    if config.sensors.temperature_enabled {
        let bus = W1Bus::new(config.sensors.w1_devices_path.as_str());
        let count = bus.sensor_ids().count();
        if count == 0 {
            warn!("No 1-Wire temperature sensors found");
        } else {
            info!("Found {} temperature sensor(s)", count);
            let interval = Duration::from_secs(u64::from(config.sensors.temperature_interval_secs));
            workers.push(spawn_temperature_thread(bus, interval, Arc::clone(&running), tx.clone())?);
        }
    }

    if config.sensors.co2_enabled {
        let interval = Duration::from_secs(u64::from(config.sensors.co2_interval_secs));
        workers.push(spawn_co2_thread(NoCo2Sensor, interval, Arc::clone(&running), tx.clone())?);
    }
    drop(tx);

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C");
                break;
            }
            Some(reading) = rx.recv() => {
                if let Err(e) = runner.publish_reading(&reading) {
                    error!("Failed to publish reading: {}", e);
                }
            }
            _ = poll.tick() => {
                if let Err(e) = runner.poll() {
                    error!("Failed to handle MQTT message: {}", e);
                }
            }
        }
    }

    running.store(false, Ordering::Relaxed);
    runner.shutdown();
    runner.client().disconnect();

    // Unblock any sender waiting on a full queue
    rx.close();
    for worker in workers {
        if worker.join().is_err() {
            error!("Sensor thread panicked");
        }
    }
    eventloop.abort();

    info!("HRV bridge stopped");
    Ok(())
}

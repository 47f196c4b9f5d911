//! DS18B20 temperature sensors through the Linux 1-Wire sysfs interface.
//!
//! The kernel `w1-gpio` and `w1-therm` drivers expose every DS18B20 as a
//! directory `28-<serial>` containing a `temperature` file in milli-degrees
//! Celsius.

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::traits::TemperatureBus;

/// Default sysfs directory of 1-Wire devices.
pub const W1_DEVICES_PATH: &str = "/sys/bus/w1/devices";

/// Family code prefix of DS18B20 devices.
const DS18B20_PREFIX: &str = "28-";

/// 1-Wire bus scanned once at creation (and on [`rescan`](W1Bus::rescan)).
#[derive(Debug)]
pub struct W1Bus {
    root: PathBuf,
    sensors: Vec<(String, PathBuf)>,
}

impl W1Bus {
    /// Scan `root` for DS18B20 devices.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut bus = Self {
            root: root.into(),
            sensors: Vec::new(),
        };
        bus.rescan();
        bus
    }

    /// Sensor ids found by the last scan.
    pub fn sensor_ids(&self) -> impl Iterator<Item = &str> {
        self.sensors.iter().map(|(id, _)| id.as_str())
    }

    /// Scan for sensors again (after adding or removing one).
    pub fn rescan(&mut self) {
        self.sensors.clear();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("1-Wire bus not available at {}: {}", self.root.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let id = entry.file_name().to_string_lossy().into_owned();
            if !id.starts_with(DS18B20_PREFIX) {
                continue;
            }
            let path = entry.path().join("temperature");
            if path.is_file() {
                info!("1-Wire sensor found: {}", id);
                self.sensors.push((id, path));
            }
        }
        self.sensors.sort();

        if self.sensors.is_empty() {
            warn!("No 1-Wire temperature sensors found");
        } else {
            info!("Found {} 1-Wire sensor(s)", self.sensors.len());
        }
    }
}

/// Parse a sysfs `temperature` file: milli-degrees to degrees, one decimal.
pub fn parse_millidegrees(text: &str) -> Option<f32> {
    let raw: i32 = text.trim().parse().ok()?;
    Some((raw as f32 / 100.0).round() / 10.0)
}

fn read_sensor(id: &str, path: &Path) -> Option<f32> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let celsius = parse_millidegrees(&text);
            if celsius.is_none() {
                error!("Failed to read sensor {}: bad value {:?}", id, text.trim());
            }
            celsius
        }
        Err(e) => {
            error!("Failed to read sensor {}: {}", id, e);
            None
        }
    }
}

impl TemperatureBus for W1Bus {
    fn read_all(&mut self) -> Vec<(String, f32)> {
        self.sensors
            .iter()
            .filter_map(|(id, path)| read_sensor(id, path).map(|c| (id.clone(), c)))
            .collect()
    }
}

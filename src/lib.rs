//! # hrv-bridge
//!
//! MQTT bridge between OpenHAB and the hardware of a heat-recovery
//! ventilation unit: calibrated 0-10V PWM fan outputs, a bypass valve, AC
//! power sensing on the fan supplies, and temperature and CO2 sensors.
//!
//! ## Features
//!
//! - **Calibrated outputs**: measured duty-to-voltage tables, inverted by
//!   interpolation, replaceable at runtime over MQTT
//! - **Power sensing**: RMS current from SCT013 clamps with outlier
//!   trimming, bias removal and plausibility clamps
//! - **Smoothing**: spike-resetting EMA plus a median publish window
//! - **DAC bridge**: percent to 0-5V on a DAC channel
//! - **Hardware abstraction**: everything runs on a desktop against mocks
//!   or the simulation devices
//!
//! ## Architecture
//!
//! - `calibration` - Calibration tables and the calibration manager
//! - `current` - Current sensors and the multi-channel monitor
//! - `smoothing` - EMA and median window
//! - `messages` - MQTT command parsing
//! - `traits` - Hardware and network abstractions
//! - `hal` - Mock, simulation, host and 1-Wire implementations
//! - `services` - Shared state, publish scheduling and the MQTT runners
//!
//! Two binaries ship with the `cli` feature: `hrv_bridge` for the HRV unit
//! and `dac_bridge`, which maps a percentage onto a DAC voltage output.
//!
//! ## Example
//!
//! ```rust
//! use hrv_bridge::calibration::CalibrationManager;
//! use hrv_bridge::current::calculate_rms;
//!
//! let mut manager = CalibrationManager::default();
//! manager
//!     .update_table(18, r#"{"0": 0.0, "50": 5.99, "100": 10.19}"#)
//!     .unwrap();
//! let duty = manager.pwm_for_percent(18, 50.0);
//! assert!(duty < 50.0);
//!
//! assert_eq!(calculate_rms(&[], None, 10), 0.0);
//! ```

#![warn(missing_docs)]

/// Calibration tables and inverse interpolation.
pub mod calibration;
/// Bridge configuration.
pub mod config;
/// AC current and power measurement.
pub mod current;
/// Hardware abstraction layer implementations.
pub mod hal;
/// MQTT command parsing.
pub mod messages;
/// Shared state, publish scheduling and MQTT.
pub mod services;
/// Power reading smoothing.
pub mod smoothing;
/// Core traits for hardware and network abstraction.
pub mod traits;

// Re-exports for convenience
pub use calibration::{CalibrationError, CalibrationManager, CalibrationTable, TableSource};
pub use config::{Config, CurrentConfig, DacConfig, MqttConfig, OutputConfig, SensorConfig};
pub use current::{CurrentMonitor, CurrentSensor, SensorSettings};
pub use messages::{BridgeCommand, CommandError, DacCommand};
pub use smoothing::{EmaState, PowerSmoother, SampleWindow};
pub use traits::{
    // Hardware
    AnalogInput,
    AnalogOutput,
    ChannelId,
    Clock,
    Co2Reading,
    Co2Sensor,
    Delay,
    TemperatureBus,
    VoltageOutput,
    // Network
    MqttClient,
    MqttMessage,
};

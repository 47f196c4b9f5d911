//! Bridge services: shared state, publish scheduling and MQTT.
//!
//! All services share one `SharedBridgeState<O>` wrapped in `Arc`:
//!
//! ```ignore
//! use std::sync::Arc;
//! use hrv_bridge::services::{BridgeServiceRunner, SharedBridgeState};
//!
//! let state = Arc::new(SharedBridgeState::new(calibration, output));
//! let mut runner = BridgeServiceRunner::new(Arc::clone(&state), client, &config);
//! runner.start()?;
//! ```
//!
//! `DacServiceRunner` is the separate DAC power bridge; it owns its output
//! and shares nothing with the HRV bridge.
//!
//! The `mqtt` feature adds the rumqttc-backed client.

pub mod dac;
pub mod runner;
pub mod shared;
pub mod telemetry;

#[cfg(feature = "mqtt")]
pub mod mqtt;

// Re-exports
pub use dac::*;
pub use runner::*;
pub use shared::*;
pub use telemetry::*;

#[cfg(feature = "mqtt")]
pub use mqtt::*;

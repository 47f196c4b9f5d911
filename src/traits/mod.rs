//! Trait definitions for hardware and network abstraction.
//!
//! These traits let the bridge:
//! - Run against real devices, the simulation devices or test mocks
//! - Swap the MQTT transport without touching message handling
//!
//! # Submodules
//!
//! - `hardware`: PWM/digital output, ADC input, delays, clock, sensors
//! - `network`: MQTT client trait

pub mod hardware;
pub mod network;

pub use hardware::*;
pub use network::*;

//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `mock`: Test doubles for every trait
//! - `sim`: Logging outputs, DAC and synthetic ADC for running without a driver board
//! - `host`: `std` delay and clock
//! - `w1`: DS18B20 sensors via the Linux 1-Wire sysfs interface

pub mod host;
pub mod mock;
pub mod sim;
pub mod w1;

pub use host::*;
pub use mock::*;
pub use sim::*;
pub use w1::*;

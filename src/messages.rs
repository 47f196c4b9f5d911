//! Incoming MQTT commands.
//!
//! Topics are matched on their suffix after the configured prefix:
//!
//! | Suffix | Payload | Command |
//! |--------|---------|---------|
//! | `pwm/gpio{N}` | percent, `.` or `,` decimal | [`BridgeCommand::SetOutput`] |
//! | `pwm/gpio{N}/duty` | raw duty cycle | [`BridgeCommand::SetDuty`] |
//! | `gpio{N}` | `ON`/`1`/`TRUE`, anything else is off | [`BridgeCommand::SetDigital`] |
//! | `calibration/gpio{N}/set` | JSON object `{"duty": volts}` | [`BridgeCommand::UpdateCalibration`] |
//!
//! The DAC bridge listens on a single topic:
//!
//! | Suffix | Payload | Command |
//! |--------|---------|---------|
//! | `power/set` | percent, `.` or `,` decimal | [`DacCommand::SetPower`] |
//!
//! # Example
//!
//! ```
//! use hrv_bridge::messages::{parse_bridge_command, BridgeCommand};
//!
//! let cmd = parse_bridge_command("pwm/gpio18", b"42,5").unwrap();
//! assert_eq!(cmd, BridgeCommand::SetOutput { channel: 18, percent: 42.5 });
//! ```

use core::fmt;

use crate::calibration::clamp_percent;
use crate::traits::ChannelId;

// ============================================================================
// Commands
// ============================================================================

/// A command decoded from an MQTT message.
#[derive(Clone, Debug, PartialEq)]
pub enum BridgeCommand {
    /// Drive a PWM output to a calibrated percent of full scale (0-100).
    SetOutput {
        /// GPIO number
        channel: ChannelId,
        /// Desired output, clamped to 0-100
        percent: f32,
    },
    /// Drive a PWM output to a raw duty cycle, skipping calibration.
    SetDuty {
        /// GPIO number
        channel: ChannelId,
        /// Duty cycle, clamped to 0-100
        duty: f32,
    },
    /// Switch a digital output.
    SetDigital {
        /// GPIO number
        channel: ChannelId,
        /// Requested level
        on: bool,
    },
    /// Replace a channel's calibration table.
    UpdateCalibration {
        /// GPIO number
        channel: ChannelId,
        /// Serialized table, validated by the calibration manager
        payload: String,
    },
}

impl BridgeCommand {
    /// Channel the command targets.
    pub fn channel(&self) -> ChannelId {
        match self {
            Self::SetOutput { channel, .. }
            | Self::SetDuty { channel, .. }
            | Self::SetDigital { channel, .. }
            | Self::UpdateCalibration { channel, .. } => *channel,
        }
    }
}

/// A command for the DAC power bridge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DacCommand {
    /// Set the output to a percent of full scale, clamped to 0-100.
    SetPower {
        /// Requested output
        percent: f32,
    },
}

/// Why a message did not decode into a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// The topic suffix matches no command.
    UnknownTopic(String),
    /// The payload is not UTF-8.
    NotUtf8,
    /// The payload is not a number.
    InvalidNumber(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTopic(t) => write!(f, "unknown topic: {}", t),
            Self::NotUtf8 => write!(f, "payload is not UTF-8"),
            Self::InvalidNumber(p) => write!(f, "invalid number: {:?}", p),
        }
    }
}

impl std::error::Error for CommandError {}

// ============================================================================
// Parsing
// ============================================================================

/// Decode a message given its topic suffix (prefix already removed).
pub fn parse_bridge_command(suffix: &str, payload: &[u8]) -> Result<BridgeCommand, CommandError> {
    let text = core::str::from_utf8(payload).map_err(|_| CommandError::NotUtf8)?;
    let unknown = || CommandError::UnknownTopic(suffix.to_string());
    let parts: heapless::Vec<&str, 4> = suffix
        .split('/')
        .take(4)
        .collect();

    match parts.as_slice() {
        ["pwm", gpio] => Ok(BridgeCommand::SetOutput {
            channel: parse_gpio(gpio).ok_or_else(unknown)?,
            percent: parse_percent(text)?,
        }),
        ["pwm", gpio, "duty"] => Ok(BridgeCommand::SetDuty {
            channel: parse_gpio(gpio).ok_or_else(unknown)?,
            duty: parse_percent(text)?,
        }),
        [gpio] => Ok(BridgeCommand::SetDigital {
            channel: parse_gpio(gpio).ok_or_else(unknown)?,
            on: parse_switch(text),
        }),
        ["calibration", gpio, "set"] => Ok(BridgeCommand::UpdateCalibration {
            channel: parse_gpio(gpio).ok_or_else(unknown)?,
            payload: text.to_string(),
        }),
        _ => Err(unknown()),
    }
}

/// Decode a DAC bridge message given its topic suffix.
pub fn parse_dac_command(suffix: &str, payload: &[u8]) -> Result<DacCommand, CommandError> {
    let text = core::str::from_utf8(payload).map_err(|_| CommandError::NotUtf8)?;
    match suffix {
        "power/set" => Ok(DacCommand::SetPower {
            percent: parse_percent(text)?,
        }),
        _ => Err(CommandError::UnknownTopic(suffix.to_string())),
    }
}

/// Parse a `gpio{N}` topic segment.
pub fn parse_gpio(segment: &str) -> Option<ChannelId> {
    let digits = segment.strip_prefix("gpio")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parse a percentage, accepting a comma as decimal separator.
///
/// The result is clamped to 0-100. NaN and non-numeric text are rejected.
pub fn parse_percent(text: &str) -> Result<f32, CommandError> {
    let normalized = text.trim().replace(',', ".");
    let value: f32 = normalized
        .parse()
        .map_err(|_| CommandError::InvalidNumber(text.to_string()))?;
    if value.is_nan() {
        return Err(CommandError::InvalidNumber(text.to_string()));
    }
    Ok(clamp_percent(value))
}

/// Parse a switch payload. `ON`, `1` and `TRUE` (any case) are on.
pub fn parse_switch(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_uppercase().as_str(),
        "ON" | "1" | "TRUE"
    )
}

//! PWM calibration tables and inverse interpolation.
//!
//! The 0-10V outputs that drive the HRV fans are produced by filtering a PWM
//! signal, and the resulting voltage is not linear in the duty cycle. Each
//! output channel therefore carries a measured [`CalibrationTable`] mapping
//! duty cycle (percent) to output voltage. [`CalibrationManager`] inverts
//! that table: given a desired output percent it returns the duty cycle that
//! produces the matching voltage.
//!
//! Tables start from a built-in default and can be replaced at runtime from
//! a JSON object such as `{"0": 0.0, "50": 5.99, "100": 10.19}`.
//!
//! # Example
//!
//! ```rust
//! use hrv_bridge::calibration::CalibrationManager;
//!
//! let mut manager = CalibrationManager::default();
//!
//! // Default tables are linear: 40% -> 40% duty
//! assert!((manager.pwm_for_percent(18, 40.0) - 40.0).abs() < 0.001);
//!
//! // Install a measured table for GPIO 18
//! manager
//!     .update_table(18, r#"{"0": 0.0, "50": 5.99, "100": 10.19}"#)
//!     .unwrap();
//!
//! // 50% (5V) now needs less than 50% duty
//! let duty = manager.pwm_for_percent(18, 50.0);
//! assert!(duty > 0.0 && duty < 50.0);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use log::{error, info};
use serde::Serialize;
use serde_json::Value;

use crate::traits::ChannelId;

/// Voltage that corresponds to 100% requested output.
pub const FULL_SCALE_VOLTS: f32 = 10.0;

/// Highest voltage accepted in a calibration table.
pub const MAX_TABLE_VOLTS: f32 = 12.0;

/// Highest duty cycle accepted in a calibration table.
pub const MAX_DUTY: u8 = 100;

/// Neighbouring points closer than this in voltage are treated as flat.
pub const FLAT_SPAN_VOLTS: f32 = 0.001;

/// Output channels of the HRV board (GPIO numbers).
pub const DEFAULT_CHANNELS: [ChannelId; 2] = [18, 19];

// ============================================================================
// Calibration Table
// ============================================================================

/// Measured mapping from duty cycle (percent) to output voltage.
///
/// Points are kept ordered by duty. Monotonic voltage is expected from the
/// physics but not required; lookups tolerate flat or non-monotonic tables.
/// Serializes as a JSON object keyed by duty, in ascending duty order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CalibrationTable {
    points: BTreeMap<u8, f32>,
}

impl CalibrationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity table `{0% -> 0V, 100% -> 10V}`.
    pub fn linear() -> Self {
        Self::from_points([(0, 0.0), (MAX_DUTY, FULL_SCALE_VOLTS)])
    }

    /// Builds a table from `(duty, volts)` pairs, dropping out-of-range pairs.
    pub fn from_points(points: impl IntoIterator<Item = (u8, f32)>) -> Self {
        let mut table = Self::new();
        for (duty, volts) in points {
            table.insert(duty, volts);
        }
        table
    }

    /// Parse a table from a JSON object of `"duty": volts` entries.
    ///
    /// Keys must parse as integers and values as numbers (numeric strings are
    /// accepted). A key or value that cannot be coerced fails the whole
    /// payload. Entries that parse but fall outside 0-100% / 0-12V are
    /// dropped silently.
    ///
    /// The point count is not checked here; see
    /// [`CalibrationManager::update_table`].
    pub fn from_json(payload: &str) -> Result<Self, CalibrationError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| CalibrationError::Parse(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| CalibrationError::Parse("expected a JSON object".into()))?;

        let mut table = Self::new();
        for (key, raw) in object {
            let duty: i64 = key
                .trim()
                .parse()
                .map_err(|_| CalibrationError::InvalidEntry { key: key.clone() })?;
            let volts = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| CalibrationError::InvalidEntry { key: key.clone() })?;

            if let Ok(duty) = u8::try_from(duty) {
                table.insert(duty, volts as f32);
            }
        }
        Ok(table)
    }

    /// Insert a point, replacing any point at the same duty.
    ///
    /// Returns `false` (and leaves the table untouched) if the point is
    /// outside the accepted range.
    pub fn insert(&mut self, duty: u8, volts: f32) -> bool {
        if duty > MAX_DUTY || !(0.0..=MAX_TABLE_VOLTS).contains(&volts) {
            return false;
        }
        self.points.insert(duty, volts);
        true
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the table has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// A table needs at least two points to interpolate.
    pub fn is_usable(&self) -> bool {
        self.points.len() >= 2
    }

    /// Points in ascending duty order.
    pub fn points(&self) -> impl Iterator<Item = (u8, f32)> + '_ {
        self.points.iter().map(|(&duty, &volts)| (duty, volts))
    }

    /// Serialize as a JSON object sorted by duty.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    /// Find the duty cycle that produces `target` volts.
    ///
    /// The target is clamped into the table's voltage range. The scan walks
    /// points in ascending duty order, remembering the last point at or below
    /// the target and stopping at the first point at or above it, so when
    /// several points share a voltage the lowest-duty one wins as the upper
    /// neighbour. If the two neighbours are less than [`FLAT_SPAN_VOLTS`]
    /// apart the lower duty is returned as is.
    ///
    /// Tables with fewer than two points behave like [`linear`](Self::linear).
    pub fn pwm_for_voltage(&self, target: f32) -> f32 {
        if !self.is_usable() {
            return target * (MAX_DUTY as f32 / FULL_SCALE_VOLTS);
        }

        let (min_v, max_v) = self
            .points
            .values()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let target = target.max(min_v).min(max_v);

        let mut points = self.points();
        let Some(first) = points.next() else {
            return target * (MAX_DUTY as f32 / FULL_SCALE_VOLTS);
        };
        let (mut lower, mut upper) = (first, first);

        for point in core::iter::once(first).chain(points) {
            if point.1 <= target {
                lower = point;
            }
            if point.1 >= target {
                upper = point;
                break;
            }
        }

        let (lower_duty, lower_v) = (lower.0 as f32, lower.1);
        let (upper_duty, upper_v) = (upper.0 as f32, upper.1);

        if (upper_v - lower_v).abs() < FLAT_SPAN_VOLTS {
            return lower_duty;
        }

        let ratio = (target - lower_v) / (upper_v - lower_v);
        lower_duty + ratio * (upper_duty - lower_duty)
    }
}

/// Clamp a requested output percent into 0-100. NaN maps to 0.
pub fn clamp_percent(percent: f32) -> f32 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why a calibration update was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CalibrationError {
    /// The channel has no calibration slot.
    UnknownChannel(ChannelId),
    /// The payload is not a JSON object.
    Parse(String),
    /// A key or value could not be converted to a number.
    InvalidEntry {
        /// Offending key as sent.
        key: String,
    },
    /// Fewer than two points survived validation.
    InsufficientPoints {
        /// Number of valid points found.
        found: usize,
    },
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::UnknownChannel(ch) => write!(f, "unknown channel {}", ch),
            CalibrationError::Parse(msg) => write!(f, "invalid JSON: {}", msg),
            CalibrationError::InvalidEntry { key } => write!(f, "invalid entry {:?}", key),
            CalibrationError::InsufficientPoints { found } => {
                write!(f, "need at least 2 valid points, got {}", found)
            }
        }
    }
}

impl std::error::Error for CalibrationError {}

// ============================================================================
// Calibration Manager
// ============================================================================

/// Where a channel's active table came from.
///
/// Informational only; lookups treat both the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableSource {
    /// Built-in table installed at construction.
    Default,
    /// Table received from the configuration topic.
    External,
}

#[derive(Clone, Debug)]
struct ChannelCalibration {
    table: CalibrationTable,
    source: TableSource,
}

/// Per-channel calibration tables with inverse lookup.
///
/// The set of channels is fixed at construction; updates for any other
/// channel are rejected.
#[derive(Clone, Debug)]
pub struct CalibrationManager {
    channels: BTreeMap<ChannelId, ChannelCalibration>,
    fallback: CalibrationTable,
}

impl Default for CalibrationManager {
    fn default() -> Self {
        Self::with_linear_defaults(&DEFAULT_CHANNELS)
    }
}

impl CalibrationManager {
    /// Create a manager with the given default table per channel.
    pub fn new(defaults: impl IntoIterator<Item = (ChannelId, CalibrationTable)>) -> Self {
        let channels = defaults
            .into_iter()
            .map(|(channel, table)| {
                (
                    channel,
                    ChannelCalibration {
                        table,
                        source: TableSource::Default,
                    },
                )
            })
            .collect();
        Self {
            channels,
            fallback: CalibrationTable::linear(),
        }
    }

    /// Create a manager whose channels all start with the linear table.
    pub fn with_linear_defaults(channels: &[ChannelId]) -> Self {
        Self::new(
            channels
                .iter()
                .map(|&channel| (channel, CalibrationTable::linear())),
        )
    }

    /// Channels with a calibration slot, ascending.
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.keys().copied()
    }

    /// Returns true if the channel has a calibration slot.
    pub fn is_supported(&self, channel: ChannelId) -> bool {
        self.channels.contains_key(&channel)
    }

    /// Active table for a channel.
    pub fn table(&self, channel: ChannelId) -> Option<&CalibrationTable> {
        self.channels.get(&channel).map(|c| &c.table)
    }

    /// Whether the active table is the built-in default or an external one.
    pub fn table_source(&self, channel: ChannelId) -> Option<TableSource> {
        self.channels.get(&channel).map(|c| c.source)
    }

    /// Duty cycle that produces `percent` of full-scale output on `channel`.
    ///
    /// `percent` is clamped to 0-100 first. Unknown channels and tables with
    /// fewer than two points use the linear table, so this never fails. The
    /// result is not rounded.
    pub fn pwm_for_percent(&self, channel: ChannelId, percent: f32) -> f32 {
        let target = clamp_percent(percent) / 100.0 * FULL_SCALE_VOLTS;
        match self.channels.get(&channel) {
            Some(c) if c.table.is_usable() => c.table.pwm_for_voltage(target),
            _ => self.fallback.pwm_for_voltage(target),
        }
    }

    /// Duty cycle for `percent` on the linear table, ignoring any channel's
    /// calibration. Used for test mode, where the output must follow the
    /// request one to one.
    pub fn pwm_for_percent_linear(&self, percent: f32) -> f32 {
        let target = clamp_percent(percent) / 100.0 * FULL_SCALE_VOLTS;
        self.fallback.pwm_for_voltage(target)
    }

    /// Replace a channel's table from a JSON payload.
    ///
    /// On failure the previous table stays active and the reason is logged.
    /// Returns the number of points installed.
    pub fn update_table(
        &mut self,
        channel: ChannelId,
        payload: &str,
    ) -> Result<usize, CalibrationError> {
        let result = if self.is_supported(channel) {
            CalibrationTable::from_json(payload).and_then(|table| self.set_table(channel, table))
        } else {
            Err(CalibrationError::UnknownChannel(channel))
        };

        match &result {
            Ok(points) => info!("GPIO{} calibration: {} points", channel, points),
            Err(e) => error!("Invalid calibration for GPIO{}: {}", channel, e),
        }
        result
    }

    /// Replace a channel's table with an already parsed one.
    pub fn set_table(
        &mut self,
        channel: ChannelId,
        table: CalibrationTable,
    ) -> Result<usize, CalibrationError> {
        let slot = self
            .channels
            .get_mut(&channel)
            .ok_or(CalibrationError::UnknownChannel(channel))?;
        if !table.is_usable() {
            return Err(CalibrationError::InsufficientPoints { found: table.len() });
        }
        let points = table.len();
        *slot = ChannelCalibration {
            table,
            source: TableSource::External,
        };
        Ok(points)
    }

    /// Copy of a channel's active table; empty for unknown channels.
    pub fn export_table(&self, channel: ChannelId) -> CalibrationTable {
        self.table(channel).cloned().unwrap_or_default()
    }

    /// A channel's active table as JSON; `{}` for unknown channels.
    pub fn export_json(&self, channel: ChannelId) -> String {
        self.export_table(channel).to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEASURED: &str = r#"{"0": 0.0, "50": 5.99, "100": 10.19}"#;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    // =========================================================================
    // CalibrationTable
    // =========================================================================

    #[test]
    fn linear_table_points() {
        let table = CalibrationTable::linear();
        let points: Vec<_> = table.points().collect();
        assert_eq!(points, vec![(0, 0.0), (100, 10.0)]);
    }

    #[test]
    fn insert_rejects_out_of_range() {
        let mut table = CalibrationTable::new();
        assert!(!table.insert(101, 5.0));
        assert!(!table.insert(50, -0.1));
        assert!(!table.insert(50, 12.5));
        assert!(!table.insert(50, f32::NAN));
        assert!(table.insert(50, 12.0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn from_json_drops_out_of_range_entries() {
        let table =
            CalibrationTable::from_json(r#"{"0": 0, "50": 5.5, "150": 9.0, "-5": 1.0, "80": 15}"#)
                .unwrap();
        let points: Vec<_> = table.points().collect();
        assert_eq!(points, vec![(0, 0.0), (50, 5.5)]);
    }

    #[test]
    fn from_json_accepts_numeric_strings() {
        let table = CalibrationTable::from_json(r#"{" 10 ": "1.5", "90": 9}"#).unwrap();
        let points: Vec<_> = table.points().collect();
        assert_eq!(points, vec![(10, 1.5), (90, 9.0)]);
    }

    #[test]
    fn from_json_rejects_non_integer_key() {
        let err = CalibrationTable::from_json(r#"{"abc": 1.0, "50": 5.0}"#).unwrap_err();
        assert_eq!(err, CalibrationError::InvalidEntry { key: "abc".into() });
    }

    #[test]
    fn from_json_rejects_non_numeric_value() {
        let err = CalibrationTable::from_json(r#"{"0": 0.0, "50": "high"}"#).unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidEntry { .. }));

        let err = CalibrationTable::from_json(r#"{"0": 0.0, "50": null}"#).unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidEntry { .. }));
    }

    #[test]
    fn from_json_rejects_boolean_value() {
        let err = CalibrationTable::from_json(r#"{"0": 0.0, "100": true}"#).unwrap_err();
        assert_eq!(err, CalibrationError::InvalidEntry { key: "100".into() });
    }

    #[test]
    fn from_json_rejects_non_object() {
        assert!(matches!(
            CalibrationTable::from_json("[1, 2]"),
            Err(CalibrationError::Parse(_))
        ));
        assert!(matches!(
            CalibrationTable::from_json("not json"),
            Err(CalibrationError::Parse(_))
        ));
        assert!(matches!(
            CalibrationTable::from_json(""),
            Err(CalibrationError::Parse(_))
        ));
    }

    #[test]
    fn to_json_sorted_by_duty() {
        let table = CalibrationTable::from_points([(100, 10.19), (0, 0.0), (50, 5.99)]);
        assert_eq!(table.to_json(), r#"{"0":0.0,"50":5.99,"100":10.19}"#);
    }

    #[test]
    fn empty_table_to_json() {
        assert_eq!(CalibrationTable::new().to_json(), "{}");
    }

    // =========================================================================
    // Inverse interpolation
    // =========================================================================

    #[test]
    fn interpolates_in_lower_segment() {
        let table = CalibrationTable::from_json(MEASURED).unwrap();
        let duty = table.pwm_for_voltage(5.0);
        assert!(approx(duty, 5.0 / 5.99 * 50.0));
        assert!(duty > 0.0 && duty < 50.0);
    }

    #[test]
    fn interpolates_in_upper_segment() {
        let table = CalibrationTable::from_json(MEASURED).unwrap();
        let duty = table.pwm_for_voltage(8.0);
        let expected = 50.0 + (8.0 - 5.99) / (10.19 - 5.99) * 50.0;
        assert!(approx(duty, expected));
    }

    #[test]
    fn exact_point_returns_its_duty() {
        let table = CalibrationTable::from_json(MEASURED).unwrap();
        assert!(approx(table.pwm_for_voltage(5.99), 50.0));
        assert!(approx(table.pwm_for_voltage(0.0), 0.0));
        assert!(approx(table.pwm_for_voltage(10.19), 100.0));
    }

    #[test]
    fn target_clamped_to_table_range() {
        let table = CalibrationTable::from_points([(20, 2.0), (80, 8.0)]);
        assert_eq!(table.pwm_for_voltage(0.5), 20.0);
        assert_eq!(table.pwm_for_voltage(9.5), 80.0);
    }

    #[test]
    fn flat_segment_returns_lower_duty() {
        // Output saturates above 80% duty
        let table = CalibrationTable::from_points([(0, 0.0), (80, 10.0), (100, 10.0)]);
        assert_eq!(table.pwm_for_voltage(10.0), 80.0);
    }

    #[test]
    fn duplicate_voltage_first_upper_wins() {
        let table = CalibrationTable::from_points([(0, 0.0), (40, 5.0), (60, 5.0), (100, 10.0)]);
        // Scan stops at duty 40, the first point at or above 5V
        assert_eq!(table.pwm_for_voltage(5.0), 40.0);
    }

    #[test]
    fn non_monotonic_table_does_not_panic() {
        let table = CalibrationTable::from_points([(0, 5.0), (50, 2.0), (100, 8.0)]);
        for tenth in 0..=120 {
            let duty = table.pwm_for_voltage(tenth as f32 / 10.0);
            assert!(duty.is_finite());
            assert!((0.0..=100.0).contains(&duty));
        }
    }

    #[test]
    fn single_point_table_is_linear() {
        let table = CalibrationTable::from_points([(50, 5.0)]);
        assert!(approx(table.pwm_for_voltage(3.0), 30.0));
    }

    #[test]
    fn clamp_percent_handles_nan() {
        assert_eq!(clamp_percent(f32::NAN), 0.0);
        assert_eq!(clamp_percent(150.0), 100.0);
        assert_eq!(clamp_percent(-10.0), 0.0);
        assert_eq!(clamp_percent(42.0), 42.0);
    }

    // =========================================================================
    // CalibrationManager
    // =========================================================================

    #[test]
    fn default_manager_is_identity() {
        let manager = CalibrationManager::default();
        for p in 0..=100 {
            let p = p as f32;
            assert!(approx(manager.pwm_for_percent(18, p), p), "percent {}", p);
            assert!(approx(manager.pwm_for_percent(19, p), p), "percent {}", p);
        }
    }

    #[test]
    fn default_channels_and_source() {
        let manager = CalibrationManager::default();
        assert_eq!(manager.channels().collect::<Vec<_>>(), vec![18, 19]);
        assert_eq!(manager.table_source(18), Some(TableSource::Default));
        assert_eq!(manager.table_source(7), None);
    }

    #[test]
    fn percent_clamped_before_lookup() {
        let mut manager = CalibrationManager::default();
        manager.update_table(18, MEASURED).unwrap();
        assert_eq!(
            manager.pwm_for_percent(18, 150.0),
            manager.pwm_for_percent(18, 100.0)
        );
        assert_eq!(
            manager.pwm_for_percent(18, -10.0),
            manager.pwm_for_percent(18, 0.0)
        );
    }

    #[test]
    fn unknown_channel_uses_linear() {
        let manager = CalibrationManager::default();
        assert!(approx(manager.pwm_for_percent(5, 37.0), 37.0));
    }

    #[test]
    fn linear_lookup_ignores_calibration() {
        let mut manager = CalibrationManager::default();
        manager.update_table(18, MEASURED).unwrap();
        assert!(manager.pwm_for_percent(18, 50.0) < 45.0);
        assert!(approx(manager.pwm_for_percent_linear(50.0), 50.0));
        assert_eq!(manager.pwm_for_percent_linear(120.0), 100.0);
        assert_eq!(manager.pwm_for_percent_linear(f32::NAN), 0.0);
    }

    #[test]
    fn update_replaces_table_and_marks_external() {
        let mut manager = CalibrationManager::default();
        assert_eq!(manager.update_table(18, MEASURED), Ok(3));
        assert_eq!(manager.table_source(18), Some(TableSource::External));
        assert_eq!(manager.table_source(19), Some(TableSource::Default));
        assert!(approx(
            manager.pwm_for_percent(18, 50.0),
            5.0 / 5.99 * 50.0
        ));
    }

    #[test]
    fn update_rejects_empty_object() {
        let mut manager = CalibrationManager::default();
        manager.update_table(18, MEASURED).unwrap();
        let before = manager.export_table(18);

        assert_eq!(
            manager.update_table(18, "{}"),
            Err(CalibrationError::InsufficientPoints { found: 0 })
        );
        assert_eq!(manager.export_table(18), before);
    }

    #[test]
    fn update_rejects_single_point() {
        let mut manager = CalibrationManager::default();
        assert_eq!(
            manager.update_table(19, r#"{"50": 5.0}"#),
            Err(CalibrationError::InsufficientPoints { found: 1 })
        );
        assert_eq!(manager.table_source(19), Some(TableSource::Default));
        assert!(approx(manager.pwm_for_percent(19, 25.0), 25.0));
    }

    #[test]
    fn update_rejects_when_validation_leaves_one_point() {
        let mut manager = CalibrationManager::default();
        assert_eq!(
            manager.update_table(18, r#"{"0": 0.0, "200": 5.0, "50": 20.0}"#),
            Err(CalibrationError::InsufficientPoints { found: 1 })
        );
    }

    #[test]
    fn update_rejects_unknown_channel() {
        let mut manager = CalibrationManager::default();
        assert_eq!(
            manager.update_table(17, MEASURED),
            Err(CalibrationError::UnknownChannel(17))
        );
    }

    #[test]
    fn update_rejects_malformed_json() {
        let mut manager = CalibrationManager::default();
        assert!(matches!(
            manager.update_table(18, "{\"0\": 0.0,"),
            Err(CalibrationError::Parse(_))
        ));
        assert_eq!(manager.table_source(18), Some(TableSource::Default));
    }

    #[test]
    fn export_round_trip() {
        let mut manager = CalibrationManager::default();
        manager
            .update_table(19, r#"{"100": 10.19, "0": 0.0, "50": 5.99}"#)
            .unwrap();
        let points: Vec<_> = manager.export_table(19).points().collect();
        assert_eq!(points, vec![(0, 0.0), (50, 5.99), (100, 10.19)]);
        assert_eq!(manager.export_json(19), r#"{"0":0.0,"50":5.99,"100":10.19}"#);
    }

    #[test]
    fn export_unknown_channel_is_empty() {
        let manager = CalibrationManager::default();
        assert!(manager.export_table(3).is_empty());
        assert_eq!(manager.export_json(3), "{}");
    }

    #[test]
    fn constructed_with_short_default_falls_back() {
        let manager = CalibrationManager::new([(18, CalibrationTable::new())]);
        assert!(approx(manager.pwm_for_percent(18, 64.0), 64.0));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            CalibrationError::UnknownChannel(4).to_string(),
            "unknown channel 4"
        );
        assert_eq!(
            CalibrationError::InsufficientPoints { found: 1 }.to_string(),
            "need at least 2 valid points, got 1"
        );
    }
}

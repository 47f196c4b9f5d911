//! Property tests for calibration lookup, RMS and smoothing.

use hrv_bridge::calibration::{CalibrationManager, CalibrationTable};
use hrv_bridge::current::{calculate_rms, filter_outliers, MIN_SAMPLES_FOR_TRIM};
use hrv_bridge::smoothing::{EmaState, PowerSmoother, SampleWindow};
use proptest::prelude::*;

fn table_points() -> impl Strategy<Value = Vec<(u8, f32)>> {
    proptest::collection::vec((0u8..=100, 0.0f32..=12.0), 2..12)
}

// ── Calibration ──────────────────────────────────────────────

proptest! {
    /// The default linear table maps every percent to itself.
    #[test]
    fn identity_calibration(percent in 0.0f32..=100.0) {
        let manager = CalibrationManager::default();
        let duty = manager.pwm_for_percent(18, percent);
        prop_assert!((duty - percent).abs() < 1e-3, "{} -> {}", percent, duty);
    }

    /// Requests outside 0-100 behave like the nearest bound.
    #[test]
    fn out_of_range_clamps(over in 100.0f32..1e6, under in -1e6f32..0.0) {
        let mut manager = CalibrationManager::default();
        manager
            .update_table(19, r#"{"0": 0.0, "30": 4.1, "70": 8.2, "100": 10.4}"#)
            .unwrap();
        prop_assert_eq!(manager.pwm_for_percent(19, over), manager.pwm_for_percent(19, 100.0));
        prop_assert_eq!(manager.pwm_for_percent(19, under), manager.pwm_for_percent(19, 0.0));
    }

    /// Whatever the table shape, the duty lies within the table's duty range.
    #[test]
    fn duty_bounded_by_table(points in table_points(), percent in -20.0f32..120.0) {
        let table = CalibrationTable::from_points(points);
        prop_assume!(table.is_usable());

        let lo = table.points().map(|(d, _)| d).min().unwrap_or(0) as f32;
        let hi = table.points().map(|(d, _)| d).max().unwrap_or(100) as f32;

        let mut manager = CalibrationManager::default();
        manager.set_table(18, table).unwrap();
        let duty = manager.pwm_for_percent(18, percent);

        prop_assert!(duty.is_finite());
        prop_assert!(duty >= lo - 1e-3 && duty <= hi + 1e-3, "{} not in {}..={}", duty, lo, hi);
    }

    /// Exported tables parse back to the same points.
    #[test]
    fn export_reparses(points in table_points()) {
        let table = CalibrationTable::from_points(points);
        let reparsed = CalibrationTable::from_json(&table.to_json()).unwrap();
        prop_assert_eq!(reparsed, table);
    }
}

// ── Signal processing ────────────────────────────────────────

proptest! {
    #[test]
    fn rms_is_non_negative(
        samples in proptest::collection::vec(-5.0f32..5.0, 0..300),
        bias in proptest::option::of(0.0f32..3.3),
    ) {
        let rms = calculate_rms(&samples, bias, 10);
        prop_assert!(rms >= 0.0 && rms.is_finite());
    }

    #[test]
    fn trimming_keeps_the_middle(
        samples in proptest::collection::vec(0.0f32..3.3, 0..300),
        percentile in 0u8..=100,
    ) {
        let kept = filter_outliers(&samples, percentile);
        if samples.len() < MIN_SAMPLES_FOR_TRIM {
            prop_assert_eq!(kept.len(), samples.len());
        } else {
            prop_assert!(kept.len() >= 2 && kept.len() <= samples.len() - 2);
            prop_assert!(kept.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}

// ── Smoothing ────────────────────────────────────────────────

proptest! {
    /// The smoother never goes negative and a zero reading always zeroes it.
    #[test]
    fn smoother_never_negative(
        readings in proptest::collection::vec(
            prop_oneof![Just(0.0f32), 0.0f32..500.0, -50.0f32..0.0],
            1..100,
        ),
    ) {
        let mut ema = PowerSmoother::default();
        for raw in readings {
            let value = ema.update(raw);
            prop_assert!(value >= 0.0);
            if raw <= 0.0 {
                prop_assert_eq!(ema.state(), EmaState::Zero);
                prop_assert_eq!(ema.published(), 0);
            }
        }
    }

    /// A smoothed value stays between the previous value and the new reading.
    #[test]
    fn smoother_moves_toward_reading(start in 1.0f32..400.0, raw in 1.0f32..400.0) {
        let mut ema = PowerSmoother::default();
        ema.update(start);
        let value = ema.update(raw);
        let (lo, hi) = if start < raw { (start, raw) } else { (raw, start) };
        prop_assert!(value >= lo - 1e-3 && value <= hi + 1e-3);
    }

    #[test]
    fn window_median_is_a_member(values in proptest::collection::vec(0.0f32..500.0, 1..20)) {
        let mut window = SampleWindow::new(5);
        for v in &values {
            window.push(*v);
        }
        prop_assert!(window.len() <= 5);
        let median = window.median().unwrap();
        prop_assert!(window.iter().any(|v| v == median));
    }
}

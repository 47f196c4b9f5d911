//! Integration tests for calibration tables and the calibration manager

use hrv_bridge::calibration::{CalibrationError, CalibrationManager, CalibrationTable, TableSource};

const MEASURED: &str = r#"{"0": 0.0, "50": 5.99, "100": 10.19}"#;

fn manager_with(payload: &str) -> CalibrationManager {
    let mut manager = CalibrationManager::default();
    manager.update_table(18, payload).unwrap();
    manager
}

// ============================================================================
// Lookup
// ============================================================================

#[test]
fn default_table_is_identity() {
    let manager = CalibrationManager::default();
    for p in [0.0, 0.5, 12.5, 33.3, 50.0, 99.9, 100.0] {
        assert!((manager.pwm_for_percent(18, p) - p).abs() < 1e-4, "p = {}", p);
        assert!((manager.pwm_for_percent(19, p) - p).abs() < 1e-4, "p = {}", p);
    }
}

#[test]
fn unknown_channel_uses_linear() {
    let manager = manager_with(MEASURED);
    assert!((manager.pwm_for_percent(42, 37.0) - 37.0).abs() < 1e-4);
}

#[test]
fn interpolates_in_lower_segment() {
    let manager = manager_with(MEASURED);
    let duty = manager.pwm_for_percent(18, 50.0);

    // 5.0V lies between the 0% and 50% points
    assert!(duty > 0.0 && duty < 50.0);
    assert!((duty - 5.0 / 5.99 * 50.0).abs() < 0.01);
}

#[test]
fn interpolates_in_upper_segment() {
    let manager = manager_with(MEASURED);
    let duty = manager.pwm_for_percent(18, 80.0);
    let expected = 50.0 + (8.0 - 5.99) / (10.19 - 5.99) * 50.0;
    assert!((duty - expected).abs() < 0.01);
}

#[test]
fn exact_point_returns_its_duty() {
    let manager = manager_with(MEASURED);
    assert!((manager.pwm_for_percent(18, 59.9) - 50.0).abs() < 0.01);
    assert!(manager.pwm_for_percent(18, 0.0).abs() < 1e-6);
}

#[test]
fn target_above_table_clamps_to_top() {
    // Table tops out at 8V: anything above is the 100% duty point
    let manager = manager_with(r#"{"0": 0.0, "100": 8.0}"#);
    assert_eq!(manager.pwm_for_percent(18, 90.0), 100.0);
    assert_eq!(manager.pwm_for_percent(18, 100.0), 100.0);
}

#[test]
fn target_below_table_clamps_to_bottom() {
    // Output does not start until 10% duty, at 1V
    let manager = manager_with(r#"{"10": 1.0, "100": 10.0}"#);
    assert_eq!(manager.pwm_for_percent(18, 5.0), 10.0);
}

#[test]
fn out_of_range_percent_is_clamped() {
    let manager = manager_with(MEASURED);
    assert_eq!(
        manager.pwm_for_percent(18, 150.0),
        manager.pwm_for_percent(18, 100.0)
    );
    assert_eq!(
        manager.pwm_for_percent(18, -10.0),
        manager.pwm_for_percent(18, 0.0)
    );
    assert_eq!(manager.pwm_for_percent(18, f32::NAN), 0.0);
}

#[test]
fn linear_lookup_skips_measured_table() {
    let manager = manager_with(MEASURED);
    for p in [0.0, 25.0, 50.0, 80.0, 100.0] {
        assert!((manager.pwm_for_percent_linear(p) - p).abs() < 1e-4, "p = {}", p);
    }
    assert!((manager.pwm_for_percent(18, 80.0) - manager.pwm_for_percent_linear(80.0)).abs() > 1.0);
}

#[test]
fn duplicate_voltage_takes_first_point() {
    let manager = manager_with(r#"{"0": 0.0, "40": 5.0, "60": 5.0, "100": 10.0}"#);
    assert_eq!(manager.pwm_for_percent(18, 50.0), 40.0);
}

#[test]
fn flat_table_returns_lower_duty() {
    let manager = manager_with(r#"{"20": 3.0, "80": 3.0}"#);
    assert_eq!(manager.pwm_for_percent(18, 0.0), 20.0);
    assert_eq!(manager.pwm_for_percent(18, 100.0), 20.0);
}

#[test]
fn non_monotonic_table_does_not_panic() {
    let manager = manager_with(r#"{"0": 0.0, "30": 6.0, "60": 4.0, "100": 10.0}"#);

    // First point at or above 5V is the 30% entry
    assert!((manager.pwm_for_percent(18, 50.0) - 25.0).abs() < 0.01);
    for p in 0..=100 {
        let duty = manager.pwm_for_percent(18, p as f32);
        assert!((0.0..=100.0).contains(&duty), "p = {} -> {}", p, duty);
    }
}

// ============================================================================
// Updates
// ============================================================================

#[test]
fn rejected_updates_keep_previous_table() {
    let mut manager = manager_with(MEASURED);
    let before = manager.export_table(18);

    let bad = [
        "{}",
        r#"{"50": 5.0}"#,
        "not json",
        "[1, 2]",
        r#"{"abc": 5.0, "100": 10.0}"#,
        r#"{"0": 0.0, "100": true}"#,
        r#"{"0": 0.0, "150": 5.0, "60": 13.0}"#,
    ];
    for payload in bad {
        assert!(manager.update_table(18, payload).is_err(), "{}", payload);
        assert_eq!(manager.export_table(18), before, "{}", payload);
    }
    assert_eq!(manager.table_source(18), Some(TableSource::External));
}

#[test]
fn boolean_values_rejected() {
    // JSON booleans are not coerced to 0/1 volts
    let mut manager = CalibrationManager::default();
    for payload in [r#"{"0": 0.0, "100": true}"#, r#"{"0": false, "100": 10.0}"#] {
        assert!(matches!(
            manager.update_table(18, payload),
            Err(CalibrationError::InvalidEntry { .. })
        ));
    }
    assert_eq!(
        manager.update_table(18, r#"{"0": 0.0, "100": true}"#),
        Err(CalibrationError::InvalidEntry { key: "100".into() })
    );
    assert_eq!(manager.table_source(18), Some(TableSource::Default));
}

#[test]
fn update_errors_name_the_problem() {
    let mut manager = CalibrationManager::default();
    assert_eq!(
        manager.update_table(7, MEASURED),
        Err(CalibrationError::UnknownChannel(7))
    );
    assert_eq!(
        manager.update_table(18, r#"{"50": 5.0}"#),
        Err(CalibrationError::InsufficientPoints { found: 1 })
    );
    assert!(matches!(
        manager.update_table(18, r#"{"x": 1.0}"#),
        Err(CalibrationError::InvalidEntry { .. })
    ));
    assert!(matches!(
        manager.update_table(18, "{"),
        Err(CalibrationError::Parse(_))
    ));
}

#[test]
fn invalid_entries_are_dropped() {
    let mut manager = CalibrationManager::default();
    let installed = manager
        .update_table(18, r#"{"0": 0.0, "-5": 1.0, "50": 5.0, "150": 7.0, "70": 12.5, "100": "10.0"}"#)
        .unwrap();
    assert_eq!(installed, 3);
    let points: Vec<_> = manager.export_table(18).points().collect();
    assert_eq!(points, vec![(0, 0.0), (50, 5.0), (100, 10.0)]);
}

#[test]
fn update_sets_external_source() {
    let mut manager = CalibrationManager::default();
    assert_eq!(manager.table_source(18), Some(TableSource::Default));
    manager.update_table(18, MEASURED).unwrap();
    assert_eq!(manager.table_source(18), Some(TableSource::External));
    assert_eq!(manager.table_source(19), Some(TableSource::Default));
    assert_eq!(manager.table_source(20), None);
}

#[test]
fn channels_are_independent() {
    let manager = manager_with(MEASURED);
    assert!((manager.pwm_for_percent(19, 50.0) - 50.0).abs() < 1e-4);
    assert!(manager.pwm_for_percent(18, 50.0) < 45.0);
}

// ============================================================================
// Export
// ============================================================================

#[test]
fn export_round_trips_sorted() {
    let mut manager = CalibrationManager::default();
    manager
        .update_table(18, r#"{"100": 10.19, "0": 0.0, "50": 5.99}"#)
        .unwrap();
    assert_eq!(manager.export_json(18), r#"{"0":0.0,"50":5.99,"100":10.19}"#);

    let reparsed = CalibrationTable::from_json(&manager.export_json(18)).unwrap();
    assert_eq!(reparsed, manager.export_table(18));
}

#[test]
fn export_unknown_channel_is_empty() {
    let manager = CalibrationManager::default();
    assert!(manager.export_table(3).is_empty());
    assert_eq!(manager.export_json(3), "{}");
}

#[test]
fn custom_defaults() {
    let table = CalibrationTable::from_points([(0, 0.0), (100, 5.0)]);
    let manager = CalibrationManager::new([(4, table)]);
    assert!(manager.is_supported(4));
    assert!(!manager.is_supported(18));
    // Half of full scale is beyond this table's reach
    assert_eq!(manager.pwm_for_percent(4, 50.0), 100.0);
    assert!((manager.pwm_for_percent(4, 25.0) - 50.0).abs() < 1e-4);
}

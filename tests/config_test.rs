//! Settings resolution: TOML files and the recognised env keys.

use std::io::Write;

use muninn::OptimizationSettings;

#[test]
fn load_from_explicit_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
cache_ttl_seconds = 120
memory_pressure_threshold_pct = 60.0
monitoring_interval_floor_seconds = 15
monitoring_interval_ceiling_seconds = 240
"#
    )
    .unwrap();

    let settings = OptimizationSettings::load(Some(file.path())).unwrap();
    assert_eq!(settings.cache_ttl_seconds, 120);
    assert_eq!(settings.memory_pressure_threshold_pct, 60.0);
    assert_eq!(settings.monitoring_interval_floor_seconds, 15);
    assert_eq!(settings.monitoring_interval_ceiling_seconds, 240);
    // Unspecified fields keep their defaults
    assert!(settings.enable_caching);
    assert_eq!(settings.deep_cleanup_tick_multiplier, 4);
}

#[test]
fn malformed_toml_is_a_configuration_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "cache_ttl_seconds = \"not a number\"").unwrap();

    let err = OptimizationSettings::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("failed to parse"));
}

#[test]
fn file_values_failing_validation_are_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "monitoring_interval_floor_seconds = 600\nmonitoring_interval_ceiling_seconds = 30"
    )
    .unwrap();

    assert!(OptimizationSettings::load(Some(file.path())).is_err());
}

#[test]
fn env_overrides_recognised_keys() {
    // Env mutation is process-global; keep every env assertion in this
    // one test to avoid racing parallel tests.
    unsafe {
        std::env::set_var("CACHE_TTL_SECONDS", "45");
        std::env::set_var("ENABLE_CACHING", "false");
        std::env::set_var("MEMORY_PRESSURE_THRESHOLD_PCT", "85.5");
        std::env::set_var("DEEP_CLEANUP_TICK_MULTIPLIER", "7");
    }

    let mut settings = OptimizationSettings::default();
    settings.apply_env_overrides().unwrap();

    assert_eq!(settings.cache_ttl_seconds, 45);
    assert!(!settings.enable_caching);
    assert_eq!(settings.memory_pressure_threshold_pct, 85.5);
    assert_eq!(settings.deep_cleanup_tick_multiplier, 7);
    // Keys that were not set stay at their defaults
    assert_eq!(settings.monitoring_interval_floor_seconds, 30);

    // An unparseable value is an error, not a silent default
    unsafe {
        std::env::set_var("MONITORING_INTERVAL_FLOOR_SECONDS", "soon");
    }
    let mut settings = OptimizationSettings::default();
    assert!(settings.apply_env_overrides().is_err());

    unsafe {
        std::env::remove_var("CACHE_TTL_SECONDS");
        std::env::remove_var("ENABLE_CACHING");
        std::env::remove_var("MEMORY_PRESSURE_THRESHOLD_PCT");
        std::env::remove_var("DEEP_CLEANUP_TICK_MULTIPLIER");
        std::env::remove_var("MONITORING_INTERVAL_FLOOR_SECONDS");
    }
}

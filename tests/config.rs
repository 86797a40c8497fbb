use std::sync::Mutex;

use tempfile::NamedTempFile;

use zonewatch::config::ZoneWatchConfig;
use zonewatch::{ObjectFilter, Zone};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ZONEWATCH_CONFIG",
        "ZONEWATCH_SENSITIVITY",
        "ZONEWATCH_MOVEMENT_THRESHOLD",
        "ZONEWATCH_PERSON_ONLY",
        "ZONEWATCH_MODEL_PATH",
        "ZONEWATCH_ZONE",
        "ZONEWATCH_TICK_HZ",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(contents: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ZoneWatchConfig::load().expect("load config");
    assert_eq!(cfg.sensitivity, 30);
    assert_eq!(cfg.movement_threshold, 50);
    assert_eq!(cfg.sampling.interval_secs, 0.5);
    assert_eq!(cfg.sampling.dedup_window_secs, 0.5);
    assert_eq!(cfg.sampling.live_tick_hz, 60);
    assert!(cfg.zone.is_none());
    assert!(!cfg.zone_required);
    assert!(cfg.display.is_none());
    assert!(!cfg.detector.person_only);

    let settings = cfg.session_settings().expect("settings");
    assert_eq!(settings.object_filter, ObjectFilter::All);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "thresholds": { "sensitivity": 20, "movement": 100 },
            "sampling": { "interval_secs": 1.0, "live_tick_hz": 30 },
            "detector": { "model_path": "/models/ssd.onnx", "min_score": 0.6 },
            "zone": { "x": 10, "y": 20, "width": 100, "height": 50, "required": true },
            "display": { "width": 640, "height": 360 }
        }"#,
        ".json",
    );

    std::env::set_var("ZONEWATCH_CONFIG", file.path());
    std::env::set_var("ZONEWATCH_SENSITIVITY", "25");
    std::env::set_var("ZONEWATCH_PERSON_ONLY", "yes");
    std::env::set_var("ZONEWATCH_ZONE", "0, 0, 64, 64");

    let cfg = ZoneWatchConfig::load().expect("load config");

    assert_eq!(cfg.sensitivity, 25);
    assert_eq!(cfg.movement_threshold, 100);
    assert_eq!(cfg.sampling.interval_secs, 1.0);
    assert_eq!(cfg.sampling.live_tick_hz, 30);
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("/models/ssd.onnx"))
    );
    assert_eq!(cfg.detector.min_score, 0.6);
    assert!(cfg.detector.person_only);
    assert_eq!(cfg.zone, Some(Zone::new(0, 0, 64, 64).unwrap()));
    assert!(cfg.zone_required);
    let display = cfg.display.expect("display");
    assert_eq!((display.width, display.height), (640.0, 360.0));

    let settings = cfg.session_settings().expect("settings");
    assert_eq!(settings.thresholds.sensitivity(), 25);
    assert_eq!(settings.object_filter, ObjectFilter::person_only());

    clear_env();
}

#[test]
fn toml_files_are_accepted() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
            [thresholds]
            movement = 150

            [zone]
            x = 5
            y = 5
            width = 20
            height = 30
        "#,
        ".toml",
    );
    std::env::set_var("ZONEWATCH_CONFIG", file.path());

    let cfg = ZoneWatchConfig::load().expect("load config");
    assert_eq!(cfg.movement_threshold, 150);
    assert_eq!(cfg.zone, Some(Zone::new(5, 5, 20, 30).unwrap()));

    clear_env();
}

#[test]
fn rejects_out_of_range_thresholds() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ZONEWATCH_SENSITIVITY", "60");
    assert!(ZoneWatchConfig::load().is_err());

    std::env::set_var("ZONEWATCH_SENSITIVITY", "30");
    std::env::set_var("ZONEWATCH_MOVEMENT_THRESHOLD", "52");
    assert!(ZoneWatchConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_bad_sampling_and_zones() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "sampling": { "interval_secs": 0 } }"#, ".json");
    std::env::set_var("ZONEWATCH_CONFIG", file.path());
    assert!(ZoneWatchConfig::load().is_err());

    let file = write_config(r#"{ "sampling": { "dedup_window_secs": 0.2 } }"#, ".json");
    std::env::set_var("ZONEWATCH_CONFIG", file.path());
    assert!(ZoneWatchConfig::load().is_err());

    let file = write_config(r#"{ "sampling": { "dedup_window_secs": 1.5 } }"#, ".json");
    std::env::set_var("ZONEWATCH_CONFIG", file.path());
    let cfg = ZoneWatchConfig::load().expect("wider dedup window is allowed");
    assert_eq!(cfg.sampling.dedup_window_secs, 1.5);

    let file = write_config(r#"{ "zone": { "width": 10 } }"#, ".json");
    std::env::set_var("ZONEWATCH_CONFIG", file.path());
    assert!(ZoneWatchConfig::load().is_err());
    std::env::remove_var("ZONEWATCH_CONFIG");

    std::env::set_var("ZONEWATCH_ZONE", "1,2,0,4");
    assert!(ZoneWatchConfig::load().is_err());

    std::env::set_var("ZONEWATCH_ZONE", "1,2,3");
    assert!(ZoneWatchConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_unknown_sections_and_bad_booleans() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "retention": { "seconds": 10 } }"#, ".json");
    std::env::set_var("ZONEWATCH_CONFIG", file.path());
    assert!(ZoneWatchConfig::load().is_err());
    std::env::remove_var("ZONEWATCH_CONFIG");

    std::env::set_var("ZONEWATCH_PERSON_ONLY", "maybe");
    assert!(ZoneWatchConfig::load().is_err());

    clear_env();
}

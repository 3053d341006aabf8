//! Device trust: fingerprinting, per-user tiers, suspicion checks.

use chrono::{Duration, TimeZone, Utc};
use risk_core::{
    device_fingerprint::{fingerprint, DeviceCharacteristics, DeviceSighting},
    engine::RiskEngine,
    error::RiskError,
    trust_score::TrustAction,
    types::{RiskLevel, Timestamp},
};

fn base_time() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()
}

fn browser(variant: usize) -> DeviceCharacteristics {
    DeviceCharacteristics {
        user_agent:         format!("Mozilla/5.0 (Linux; Android 14; Pixel {variant})"),
        screen_resolution:  "1080x2400".into(),
        timezone:           "Asia/Kolkata".into(),
        language:           "en-IN".into(),
        platform:           "Linux armv8l".into(),
        cookies_enabled:    true,
        do_not_track:       false,
        touch_support:      true,
        canvas_fingerprint: Some("c4nv45".into()),
        webgl_fingerprint:  None,
        plugins:            vec!["pdf-viewer".into(), "widevine".into()],
    }
}

fn sighting(characteristics: DeviceCharacteristics, ip: &str, at: Timestamp) -> DeviceSighting {
    DeviceSighting {
        characteristics,
        ip_address: Some(ip.to_string()),
        seen_at:    at,
    }
}

fn engine_with_user(user_id: &str) -> RiskEngine {
    let engine = RiskEngine::build_test().unwrap();
    engine.ledger().open_account(user_id, false).unwrap();
    engine
}

#[test]
fn fingerprint_is_idempotent_and_discriminating() {
    let engine = RiskEngine::build_test().unwrap();
    let devices = engine.devices();

    let a = devices.fingerprint(&browser(7));
    assert_eq!(a, devices.fingerprint(&browser(7)));
    assert_eq!(a, fingerprint(&browser(7)));
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, devices.fingerprint(&browser(8)));
}

#[test]
fn first_device_costs_a_little_and_returning_earns_it_back() {
    let engine = engine_with_user("one");
    let devices = engine.devices();
    let s = sighting(browser(1), "49.36.10.2", base_time());
    let fp = fingerprint(&s.characteristics);

    let first = devices.register_or_touch("one", &fp, &s).unwrap();
    assert!(first.is_new_device);
    assert_eq!(first.risk_level, RiskLevel::Low);
    assert_eq!(first.score_change.unwrap().delta, -5);

    let history = engine.ledger().history("one", 1).unwrap();
    assert_eq!(history[0].action, TrustAction::SuspiciousActivity);
    assert_eq!(history[0].metadata["tier"], "new_device");

    let later = sighting(browser(1), "49.36.10.9", base_time() + Duration::days(1));
    let again = devices.register_or_touch("one", &fp, &later).unwrap();
    assert!(!again.is_new_device);
    assert_eq!(again.score_change.unwrap().delta, 1);
    assert_eq!(engine.ledger().score("one").unwrap(), 46);

    let listed = devices.devices("one").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].last_seen, later.seen_at);
    assert_eq!(listed[0].last_ip.as_deref(), Some("49.36.10.9"));
    assert_eq!(listed[0].characteristics, browser(1));
}

#[test]
fn device_count_raises_the_tier() {
    let engine = engine_with_user("many");
    let devices = engine.devices();

    let mut levels = Vec::new();
    for variant in 0..6 {
        let s = sighting(browser(variant), "49.36.10.2", base_time());
        let fp = fingerprint(&s.characteristics);
        levels.push(devices.register_or_touch("many", &fp, &s).unwrap().risk_level);
    }

    assert_eq!(
        levels,
        vec![
            RiskLevel::Low,
            RiskLevel::Low,
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::Medium,
            RiskLevel::High,
        ]
    );
    assert_eq!(engine.ledger().score("many").unwrap(), 0);

    let newest = engine.ledger().history("many", 1).unwrap();
    assert_eq!(newest[0].metadata["tier"], "high_risk_device");

    let s = sighting(browser(0), "49.36.10.2", base_time());
    let report = devices
        .check_suspicion("many", &fingerprint(&s.characteristics), &s)
        .unwrap();
    assert_eq!(report.risk_level, RiskLevel::High);
    assert!(report.reasons.iter().any(|r| r.contains("Too many devices")));
}

#[test]
fn unknown_device_is_high_risk() {
    let engine = engine_with_user("who");
    let s = sighting(browser(3), "49.36.10.2", base_time());
    let report = engine
        .devices()
        .check_suspicion("who", &fingerprint(&s.characteristics), &s)
        .unwrap();

    assert!(report.is_suspicious);
    assert_eq!(report.risk_level, RiskLevel::High);

    let logged = engine
        .activity("who", "device_", base_time() - Duration::days(1), 10)
        .unwrap();
    assert_eq!(logged[0].action_tag, "device_suspicious");
}

#[test]
fn known_device_changes_are_medium() {
    let engine = engine_with_user("moves");
    let devices = engine.devices();
    let home = sighting(browser(2), "49.36.10.2", base_time());
    let fp = fingerprint(&home.characteristics);
    devices.register_or_touch("moves", &fp, &home).unwrap();

    let same = devices.check_suspicion("moves", &fp, &home).unwrap();
    assert!(!same.is_suspicious);
    assert_eq!(same.risk_level, RiskLevel::Low);

    let roaming = sighting(browser(2), "103.21.4.4", base_time() + Duration::hours(1));
    let report = devices.check_suspicion("moves", &fp, &roaming).unwrap();
    assert_eq!(report.risk_level, RiskLevel::Medium);
    assert!(report.reasons.iter().any(|r| r.contains("IP change")));

    let mut abroad = sighting(browser(2), "49.36.10.2", base_time() + Duration::hours(2));
    abroad.characteristics.timezone = "Europe/London".into();
    let report = devices.check_suspicion("moves", &fp, &abroad).unwrap();
    assert_eq!(report.risk_level, RiskLevel::Medium);
    assert!(report.reasons.iter().any(|r| r.contains("Timezone changed")));

    let dormant = sighting(browser(2), "49.36.10.2", base_time() + Duration::days(91));
    let report = devices.check_suspicion("moves", &fp, &dormant).unwrap();
    assert_eq!(report.risk_level, RiskLevel::Medium);
    assert!(report.reasons.iter().any(|r| r.contains("unused for 91 days")));
}

#[test]
fn forgetting_a_device_makes_it_new_again() {
    let engine = engine_with_user("forget");
    let devices = engine.devices();
    let s = sighting(browser(4), "49.36.10.2", base_time());
    let fp = fingerprint(&s.characteristics);
    devices.register_or_touch("forget", &fp, &s).unwrap();

    assert!(devices.forget_device("forget", &fp).unwrap());
    assert!(!devices.forget_device("forget", &fp).unwrap());
    assert!(devices.devices("forget").unwrap().is_empty());
    assert!(devices.register_or_touch("forget", &fp, &s).unwrap().is_new_device);
}

#[test]
fn unknown_user_cannot_register() {
    let engine = RiskEngine::build_test().unwrap();
    let s = sighting(browser(1), "49.36.10.2", base_time());
    let err = engine
        .devices()
        .register_or_touch("nobody", &fingerprint(&s.characteristics), &s)
        .unwrap_err();
    assert!(matches!(err, RiskError::NotFound { .. }), "got {err}");
}

//! Store failures: location fails open, payments fall back to manual review,
//! trust penalties that cannot be written never abort an evaluation.

use chrono::{Duration, TimeZone, Utc};
use risk_core::{
    config::RiskConfig,
    device_fingerprint::DeviceRecord,
    engine::RiskEngine,
    error::{RiskError, RiskResult},
    event::ActivityLogEntry,
    location_validator::{LocationOutcome, LocationSample, LocationSettings},
    payment_fraud::{PaymentAssessment, PaymentAttempt, PaymentMethod, PaymentRecord, RecommendedAction},
    store::{
        DeviceStore, LocationStore, PaymentStore, SqliteStore, TrustAdjustment, UserStore,
    },
    trust_score::{ScoreChange, TrustAction, TrustScoreEvent, UserRecord},
    types::{RiskLevel, Timestamp},
};
use std::cell::Cell;

/// Delegates to SQLite, failing the seams switched on by the test.
struct FlakyStore {
    inner:                 SqliteStore,
    fail_location_history: Cell<bool>,
    fail_payment_history:  Cell<bool>,
    fail_trust_writes:     Cell<bool>,
}

impl FlakyStore {
    fn new() -> Self {
        let inner = SqliteStore::in_memory().unwrap();
        inner.migrate().unwrap();
        Self {
            inner,
            fail_location_history: Cell::new(false),
            fail_payment_history:  Cell::new(false),
            fail_trust_writes:     Cell::new(false),
        }
    }
}

fn outage(what: &str) -> RiskError {
    RiskError::Store(format!("{what} unavailable"))
}

impl UserStore for FlakyStore {
    fn insert_user(&self, user: &UserRecord) -> RiskResult<()> {
        self.inner.insert_user(user)
    }
    fn get_user(&self, user_id: &str) -> RiskResult<Option<UserRecord>> {
        self.inner.get_user(user_id)
    }
    fn adjust_trust_score(&self, user_id: &str, adjustment: TrustAdjustment) -> RiskResult<Option<ScoreChange>> {
        if self.fail_trust_writes.get() {
            return Err(outage("trust score"));
        }
        self.inner.adjust_trust_score(user_id, adjustment)
    }
    fn set_frozen(&self, user_id: &str, frozen: bool) -> RiskResult<()> {
        self.inner.set_frozen(user_id, frozen)
    }
    fn update_user_location(&self, user_id: &str, lat: f64, lng: f64, at: Timestamp) -> RiskResult<()> {
        self.inner.update_user_location(user_id, lat, lng, at)
    }
    fn insert_trust_event(&self, event: &TrustScoreEvent) -> RiskResult<()> {
        self.inner.insert_trust_event(event)
    }
    fn trust_events(&self, user_id: &str, limit: usize) -> RiskResult<Vec<TrustScoreEvent>> {
        self.inner.trust_events(user_id, limit)
    }
    fn append_activity(&self, entry: &ActivityLogEntry) -> RiskResult<()> {
        self.inner.append_activity(entry)
    }
    fn recent_activity(
        &self,
        user_id: &str,
        tag_prefix: &str,
        since: Timestamp,
        limit: usize,
    ) -> RiskResult<Vec<ActivityLogEntry>> {
        self.inner.recent_activity(user_id, tag_prefix, since, limit)
    }
}

impl LocationStore for FlakyStore {
    fn location_settings(&self, user_id: &str) -> RiskResult<LocationSettings> {
        self.inner.location_settings(user_id)
    }
    fn save_location_settings(&self, settings: &LocationSettings) -> RiskResult<()> {
        self.inner.save_location_settings(settings)
    }
    fn insert_location_sample(&self, sample: &LocationSample, risk_level: RiskLevel) -> RiskResult<()> {
        self.inner.insert_location_sample(sample, risk_level)
    }
    fn recent_location_samples(
        &self,
        user_id: &str,
        since: Timestamp,
        until: Timestamp,
        limit: usize,
    ) -> RiskResult<Vec<LocationSample>> {
        if self.fail_location_history.get() {
            return Err(outage("location history"));
        }
        self.inner.recent_location_samples(user_id, since, until, limit)
    }
}

impl PaymentStore for FlakyStore {
    fn insert_payment(&self, record: &PaymentRecord) -> RiskResult<()> {
        self.inner.insert_payment(record)
    }
    fn recent_payments(&self, user_id: &str, since: Timestamp, limit: usize) -> RiskResult<Vec<PaymentRecord>> {
        if self.fail_payment_history.get() {
            return Err(outage("payment history"));
        }
        self.inner.recent_payments(user_id, since, limit)
    }
    fn insert_payment_attempt(
        &self,
        attempt_id: &str,
        attempt: &PaymentAttempt,
        assessment: &PaymentAssessment,
    ) -> RiskResult<()> {
        self.inner.insert_payment_attempt(attempt_id, attempt, assessment)
    }
    fn count_payment_attempts(&self, user_id: &str, since: Timestamp) -> RiskResult<i64> {
        self.inner.count_payment_attempts(user_id, since)
    }
    fn count_ip_payment_attempts(&self, ip_address: &str, since: Timestamp) -> RiskResult<i64> {
        self.inner.count_ip_payment_attempts(ip_address, since)
    }
    fn distinct_payment_ips(&self, user_id: &str, since: Timestamp) -> RiskResult<Vec<String>> {
        self.inner.distinct_payment_ips(user_id, since)
    }
}

impl DeviceStore for FlakyStore {
    fn get_device(&self, user_id: &str, fingerprint: &str) -> RiskResult<Option<DeviceRecord>> {
        self.inner.get_device(user_id, fingerprint)
    }
    fn count_devices(&self, user_id: &str) -> RiskResult<i64> {
        self.inner.count_devices(user_id)
    }
    fn insert_device(&self, device: &DeviceRecord) -> RiskResult<()> {
        self.inner.insert_device(device)
    }
    fn touch_device(&self, user_id: &str, fingerprint: &str, seen_at: Timestamp, ip_address: Option<&str>) -> RiskResult<()> {
        self.inner.touch_device(user_id, fingerprint, seen_at, ip_address)
    }
    fn list_devices(&self, user_id: &str) -> RiskResult<Vec<DeviceRecord>> {
        self.inner.list_devices(user_id)
    }
    fn remove_device(&self, user_id: &str, fingerprint: &str) -> RiskResult<bool> {
        self.inner.remove_device(user_id, fingerprint)
    }
}

fn flaky_engine(user_id: &str) -> RiskEngine<FlakyStore> {
    let engine = RiskEngine::new(FlakyStore::new(), RiskConfig::default());
    engine.ledger().open_account(user_id, false).unwrap();
    engine
}

fn at(minutes: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn sample(user_id: &str, lat: f64, lng: f64, ts: Timestamp) -> LocationSample {
    LocationSample {
        user_id:            user_id.to_string(),
        latitude:           lat,
        longitude:          lng,
        accuracy_m:         Some(10.0),
        timestamp:          ts,
        is_foreground:      true,
        mock_location_flag: None,
    }
}

#[test]
fn location_history_outage_fails_open() {
    let engine = flaky_engine("loc");
    engine.locations().submit(&sample("loc", 28.6139, 77.2090, at(0))).unwrap();
    engine.store.fail_location_history.set(true);

    let outcome = engine
        .locations()
        .submit(&sample("loc", 19.0760, 72.8777, at(2)))
        .unwrap();
    let (assessment, committed) = match outcome {
        LocationOutcome::Evaluated { assessment, committed } => (assessment, committed),
        other => panic!("expected an evaluation, got {other:?}"),
    };
    assert_eq!(assessment.risk_level, RiskLevel::Low);
    assert!(assessment.is_valid);
    assert!(assessment.reasons[0].starts_with("Location validation error"));
    assert!(committed);

    let logged = engine.activity("loc", "location_validation", at(-60), 10).unwrap();
    assert_eq!(logged.len(), 1);
}

#[test]
fn payment_history_outage_falls_back_to_review() {
    let engine = flaky_engine("pay");
    engine.store.fail_payment_history.set(true);

    let assessment = engine
        .payments()
        .evaluate(&PaymentAttempt {
            user_id:            "pay".into(),
            amount:             49.0,
            payment_method:     PaymentMethod::Card,
            ip_address:         "203.0.113.7".into(),
            device_fingerprint: None,
            timestamp:          at(0),
        })
        .unwrap();

    assert_eq!(assessment.risk_level, RiskLevel::Medium);
    assert_eq!(assessment.recommended_action, RecommendedAction::ManualReview);
    assert_eq!(assessment.confidence, 50);
    assert!(!assessment.is_fraudulent);
}

#[test]
fn failed_penalty_does_not_abort_location() {
    let engine = flaky_engine("pen");
    engine.locations().submit(&sample("pen", 28.6139, 77.2090, at(0))).unwrap();
    engine.store.fail_trust_writes.set(true);

    let outcome = engine
        .locations()
        .submit(&sample("pen", 19.0760, 72.8777, at(2)))
        .unwrap();
    match outcome {
        LocationOutcome::Evaluated { assessment, .. } => assert_eq!(assessment.risk_level, RiskLevel::High),
        other => panic!("expected an evaluation, got {other:?}"),
    }
    assert_eq!(engine.ledger().score("pen").unwrap(), 50);
}

#[test]
fn ledger_propagates_store_errors() {
    let engine = flaky_engine("raw");
    engine.store.fail_trust_writes.set(true);
    let err = engine
        .ledger()
        .apply_action("raw", TrustAction::HelpCompleted, "helped", None)
        .unwrap_err();
    assert!(matches!(err, RiskError::Store(_)), "got {err}");
    assert_eq!(engine.ledger().history("raw", 10).unwrap().len(), 1, "only the AccountCreated event");
}
